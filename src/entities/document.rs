//! Task document entity: the single persisted unit of state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{PriorityEngineConfig, Subtask, Task, TaskStatus};

/// Document header metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Unknown fields preserved for lossless round-trips
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for DocumentMeta {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            updated: now,
            description: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Reference to a task or a subtask parsed from a caller-supplied id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemId {
    Task(u64),
    /// Parent task id plus the full dotted subtask id
    Subtask(u64, String),
}

impl ItemId {
    /// Parse either an integer task id or a dotted `parent.ordinal` id
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(id) = s.parse::<u64>() {
            return Some(Self::Task(id));
        }
        let (parent, ordinal) = s.split_once('.')?;
        let parent: u64 = parent.parse().ok()?;
        ordinal.parse::<u32>().ok()?;
        Some(Self::Subtask(parent, s.to_string()))
    }
}

/// Result of a task/subtask lookup
#[derive(Debug, Clone, Serialize)]
pub struct FoundItem {
    /// Owning task (the task itself for plain task ids)
    pub task: Task,

    /// Present when the id addressed a subtask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask: Option<Subtask>,
}

/// Canonical in-memory representation of the whole persisted document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDocument {
    #[serde(default)]
    pub meta: DocumentMeta,

    /// Monotonic id counter; ids are never reused after deletion
    #[serde(default = "default_next_id", rename = "nextId")]
    pub next_id: u64,

    #[serde(default)]
    pub config: PriorityEngineConfig,

    #[serde(default)]
    pub tasks: Vec<Task>,

    /// Unknown fields preserved for lossless round-trips
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_next_id() -> u64 {
    1
}

impl Default for TaskDocument {
    fn default() -> Self {
        Self {
            meta: DocumentMeta::default(),
            next_id: default_next_id(),
            config: PriorityEngineConfig::default(),
            tasks: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl TaskDocument {
    /// Create an empty document with a fresh id counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current counter value and advance it. The counter is
    /// re-synced past the highest existing id so documents edited by
    /// external tools cannot hand out a duplicate.
    pub fn take_next_id(&mut self) -> u64 {
        let floor = self.tasks.iter().map(|t| t.id).max().map_or(1, |m| m + 1);
        let id = self.next_id.max(floor);
        self.next_id = id + 1;
        id
    }

    /// Get task by id
    pub fn get_task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get mutable task by id
    pub fn get_task_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Position of a task in the document
    pub fn task_index(&self, id: u64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Resolve an integer task id or dotted subtask id into owned copies
    /// of the task (and subtask, when addressed)
    pub fn find(&self, id: &str) -> Option<FoundItem> {
        match ItemId::parse(id)? {
            ItemId::Task(task_id) => self.get_task(task_id).map(|task| FoundItem {
                task: task.clone(),
                subtask: None,
            }),
            ItemId::Subtask(parent_id, subtask_id) => {
                let task = self.get_task(parent_id)?;
                let subtask = task.get_subtask(&subtask_id)?;
                Some(FoundItem {
                    task: task.clone(),
                    subtask: Some(subtask.clone()),
                })
            }
        }
    }

    /// Ids of all tasks with status `done`
    pub fn done_ids(&self) -> HashSet<u64> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id)
            .collect()
    }

    /// Remove a task, scrubbing its id from every other task's
    /// dependency set. No other ids are renumbered.
    pub fn remove_task(&mut self, id: u64) -> Option<Task> {
        let idx = self.task_index(id)?;
        let removed = self.tasks.remove(idx);
        for task in &mut self.tasks {
            if task.depends_on.contains(&id) {
                task.depends_on.retain(|&d| d != id);
                task.touch();
            }
        }
        self.touch();
        Some(removed)
    }

    /// Refresh the document-level updated timestamp
    pub fn touch(&mut self) {
        self.meta.updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_parsing() {
        assert_eq!(ItemId::parse("12"), Some(ItemId::Task(12)));
        assert_eq!(
            ItemId::parse("12.3"),
            Some(ItemId::Subtask(12, "12.3".to_string()))
        );
        assert_eq!(ItemId::parse("abc"), None);
        assert_eq!(ItemId::parse("12.x"), None);
    }

    #[test]
    fn test_take_next_id_monotonic() {
        let mut doc = TaskDocument::new();
        assert_eq!(doc.take_next_id(), 1);
        assert_eq!(doc.take_next_id(), 2);
    }

    #[test]
    fn test_take_next_id_resyncs_past_existing() {
        let mut doc = TaskDocument::new();
        doc.tasks.push(Task::new(7, "External", ""));
        assert_eq!(doc.take_next_id(), 8);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut doc = TaskDocument::new();
        let id = doc.take_next_id();
        doc.tasks.push(Task::new(id, "One", ""));
        doc.remove_task(id);
        assert_eq!(doc.take_next_id(), 2);
    }

    #[test]
    fn test_remove_task_scrubs_dependencies() {
        let mut doc = TaskDocument::new();
        doc.tasks.push(Task::new(1, "One", ""));
        let mut two = Task::new(2, "Two", "");
        two.depends_on = vec![1];
        doc.tasks.push(two);

        doc.remove_task(1);
        assert!(doc.get_task(2).unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_find_subtask() {
        let mut doc = TaskDocument::new();
        let mut task = Task::new(1, "One", "");
        task.add_subtask(Subtask::new(1, 1, "Sub"));
        doc.tasks.push(task);

        let found = doc.find("1.1").unwrap();
        assert_eq!(found.task.id, 1);
        assert_eq!(found.subtask.unwrap().id, "1.1");
        assert!(doc.find("1.2").is_none());
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = serde_json::json!({
            "nextId": 3,
            "tasks": [],
            "futureField": {"nested": true}
        });
        let doc: TaskDocument = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["futureField"]["nested"], true);
    }
}
