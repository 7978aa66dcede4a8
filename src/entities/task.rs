//! Task entity and related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{LogEntry, Subtask};
use crate::errors::EngineError;

/// Lowest assignable priority
pub const MIN_PRIORITY: u16 = 1;
/// Highest assignable priority
pub const MAX_PRIORITY: u16 = 1000;
/// Priority given to tasks created without an explicit or tag-derived one
pub const DEFAULT_PRIORITY: u16 = 500;

/// Clamp an arbitrary computed value into the valid priority range
pub fn clamp_priority(value: i64) -> u16 {
    value.clamp(i64::from(MIN_PRIORITY), i64::from(MAX_PRIORITY)) as u16
}

/// Task status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Testing,
    Done,
    Blocked,
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "inprogress"),
            Self::Testing => write!(f, "testing"),
            Self::Done => write!(f, "done"),
            Self::Blocked => write!(f, "blocked"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" | "pending" => Ok(Self::Todo),
            "inprogress" | "in-progress" | "in_progress" => Ok(Self::InProgress),
            "testing" => Ok(Self::Testing),
            "done" | "completed" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            "error" | "failed" => Ok(Self::Error),
            _ => Err(EngineError::InvalidStatus {
                status: s.to_string(),
            }),
        }
    }
}

/// Core task structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned monotonically and never reused
    pub id: u64,

    /// Brief, descriptive title
    pub title: String,

    /// Concise description of what the task involves
    #[serde(default)]
    pub description: String,

    /// Fine-grained priority in [1, 1000]
    #[serde(default = "default_priority")]
    pub priority: u16,

    /// Pipeline input priority; manual edits reset it so repeated
    /// recalculations never stack boosts onto their own output
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "basePriority"
    )]
    pub base_priority: Option<u16>,

    /// Current task status
    #[serde(default)]
    pub status: TaskStatus,

    /// IDs of prerequisite tasks; may reference tasks not yet created
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<u64>,

    /// Paths of files this task touches
    #[serde(default, rename = "relatedFiles")]
    pub related_files: Vec<String>,

    /// Verification steps
    #[serde(default)]
    pub tests: Vec<String>,

    /// Free-form tags, also used for template priority suggestion
    #[serde(default)]
    pub tags: Vec<String>,

    /// Subtasks, owned exclusively by this task
    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    /// Append-only activity log
    #[serde(default, rename = "activityLog")]
    pub activity_log: Vec<LogEntry>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,

    // Effort attributes (0-10) used by effort weighting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<u8>,

    /// Unknown fields preserved for lossless round-trips
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_priority() -> u16 {
    DEFAULT_PRIORITY
}

impl Task {
    /// Create a new task with minimal required fields
    pub fn new(id: u64, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: description.into(),
            priority: DEFAULT_PRIORITY,
            base_priority: Some(DEFAULT_PRIORITY),
            status: TaskStatus::default(),
            depends_on: Vec::new(),
            related_files: Vec::new(),
            tests: Vec::new(),
            tags: Vec::new(),
            subtasks: Vec::new(),
            activity_log: Vec::new(),
            created_at: now,
            updated_at: now,
            complexity: None,
            impact: None,
            urgency: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Priority the recalculation pipeline starts from
    pub fn effective_base(&self) -> u16 {
        self.base_priority.unwrap_or(self.priority)
    }

    /// Append an engine-generated activity log entry
    pub fn log(&mut self, message: impl Into<String>) {
        self.activity_log.push(LogEntry::log(message));
    }

    /// Refresh the updated timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Dependency ids not contained in the given done set
    pub fn unmet_deps(&self, done: &HashSet<u64>) -> Vec<u64> {
        self.depends_on
            .iter()
            .copied()
            .filter(|dep| !done.contains(dep))
            .collect()
    }

    /// Check if all subtasks are complete
    pub fn all_subtasks_done(&self) -> bool {
        self.subtasks.iter().all(|s| s.status == TaskStatus::Done)
    }

    /// Subtask ids that are not yet done
    pub fn open_subtasks(&self) -> Vec<String> {
        self.subtasks
            .iter()
            .filter(|s| s.status != TaskStatus::Done)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Get subtask by dotted id
    pub fn get_subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == subtask_id)
    }

    /// Get mutable subtask by dotted id
    pub fn get_subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == subtask_id)
    }

    /// Next subtask ordinal, sequential and never reused within a parent.
    /// Derived from the highest ordinal ever assigned, so removals leave gaps.
    pub fn next_subtask_ordinal(&self) -> u32 {
        self.subtasks
            .iter()
            .filter_map(|s| s.ordinal())
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Add a subtask and refresh the parent timestamp
    pub fn add_subtask(&mut self, subtask: Subtask) {
        self.subtasks.push(subtask);
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new() {
        let task = Task::new(1, "Test Task", "A test task description");
        assert_eq!(task.id, 1);
        assert_eq!(task.title, "Test Task");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert_eq!(task.effective_base(), DEFAULT_PRIORITY);
    }

    #[test]
    fn test_task_status_parsing() {
        assert_eq!("todo".parse::<TaskStatus>().unwrap(), TaskStatus::Todo);
        assert_eq!(
            "inprogress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert_eq!("done".parse::<TaskStatus>().unwrap(), TaskStatus::Done);
        assert!("invalid".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"inprogress\"");
    }

    #[test]
    fn test_unmet_deps() {
        let mut task = Task::new(3, "Test", "Test");
        task.depends_on = vec![1, 2];

        let done: HashSet<u64> = [1].into_iter().collect();
        assert_eq!(task.unmet_deps(&done), vec![2]);
    }

    #[test]
    fn test_subtask_ordinals_never_reused() {
        let mut task = Task::new(1, "Test", "Test");
        task.add_subtask(Subtask::new(1, 1, "First"));
        task.add_subtask(Subtask::new(1, 2, "Second"));
        task.subtasks.remove(0);

        assert_eq!(task.next_subtask_ordinal(), 3);
    }

    #[test]
    fn test_clamp_priority() {
        assert_eq!(clamp_priority(0), 1);
        assert_eq!(clamp_priority(500), 500);
        assert_eq!(clamp_priority(4200), 1000);
    }
}
