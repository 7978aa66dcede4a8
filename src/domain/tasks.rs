//! Task and subtask CRUD over a loaded document.
//!
//! These are value-returning transforms over an owned document: the
//! caller loads, mutates through these functions, and saves. Nothing
//! here touches storage.

use serde::Deserialize;

use crate::entities::{
    clamp_priority, ItemId, Subtask, Task, TaskDocument, DEFAULT_PRIORITY,
};
use crate::errors::{EngineError, EngineResult};

/// Parameters for creating a task
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Explicit priority; falls back to a tag-derived suggestion, then
    /// to the mid-range default
    #[serde(default)]
    pub priority: Option<u16>,

    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<u64>,

    #[serde(default, rename = "relatedFiles")]
    pub related_files: Vec<String>,

    #[serde(default)]
    pub tests: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub complexity: Option<u8>,

    #[serde(default)]
    pub impact: Option<u8>,

    #[serde(default)]
    pub urgency: Option<u8>,
}

/// Parameters for updating a task; unset fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Manual priority edit; bypasses the pipeline until the next
    /// explicit recalculation
    #[serde(default)]
    pub priority: Option<u16>,

    #[serde(default, rename = "dependsOn")]
    pub depends_on: Option<Vec<u64>>,

    #[serde(default, rename = "relatedFiles")]
    pub related_files: Option<Vec<String>>,

    #[serde(default)]
    pub tests: Option<Vec<String>>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub complexity: Option<u8>,

    #[serde(default)]
    pub impact: Option<u8>,

    #[serde(default)]
    pub urgency: Option<u8>,
}

/// Parameters for creating a subtask
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSubtask {
    pub title: String,

    #[serde(default, rename = "relatedFiles")]
    pub related_files: Vec<String>,

    #[serde(default)]
    pub tests: Vec<String>,
}

/// Parameters for updating a subtask
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubtaskUpdate {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, rename = "relatedFiles")]
    pub related_files: Option<Vec<String>>,

    #[serde(default)]
    pub tests: Option<Vec<String>>,
}

/// Suggested default priority for well-known tags
fn suggested_priority(tags: &[String]) -> Option<u16> {
    // first matching tag wins, scanned in caller order
    for tag in tags {
        let suggestion = match tag.as_str() {
            "critical" | "security" => Some(900),
            "bug" => Some(700),
            "feature" => Some(600),
            "chore" | "refactor" => Some(300),
            "docs" => Some(200),
            _ => None,
        };
        if suggestion.is_some() {
            return suggestion;
        }
    }
    None
}

/// Create a task with an auto-assigned id and append it to the document
pub fn add_task(doc: &mut TaskDocument, new: NewTask) -> EngineResult<Task> {
    if new.title.trim().is_empty() {
        return Err(EngineError::EmptyTitle);
    }

    let id = doc.take_next_id();
    let mut task = Task::new(id, new.title, new.description);
    let priority = new
        .priority
        .map(|p| clamp_priority(i64::from(p)))
        .or_else(|| suggested_priority(&new.tags))
        .unwrap_or(DEFAULT_PRIORITY);
    task.priority = priority;
    task.base_priority = Some(priority);
    task.depends_on = dedupe_ids(new.depends_on);
    task.related_files = new.related_files;
    task.tests = new.tests;
    task.tags = new.tags;
    task.complexity = new.complexity;
    task.impact = new.impact;
    task.urgency = new.urgency;
    task.log("Task created");

    doc.tasks.push(task.clone());
    doc.touch();
    Ok(task)
}

/// Apply a partial update to a task
pub fn update_task(doc: &mut TaskDocument, id: u64, update: TaskUpdate) -> EngineResult<Task> {
    let task = doc
        .get_task_mut(id)
        .ok_or_else(|| EngineError::TaskNotFound { id: id.to_string() })?;

    if let Some(title) = update.title {
        if title.trim().is_empty() {
            return Err(EngineError::EmptyTitle);
        }
        task.title = title;
    }
    if let Some(description) = update.description {
        task.description = description;
    }
    if let Some(priority) = update.priority {
        let priority = clamp_priority(i64::from(priority));
        task.priority = priority;
        // manual edits become the new pipeline input
        task.base_priority = Some(priority);
    }
    if let Some(depends_on) = update.depends_on {
        task.depends_on = dedupe_ids(depends_on);
    }
    if let Some(related_files) = update.related_files {
        task.related_files = related_files;
    }
    if let Some(tests) = update.tests {
        task.tests = tests;
    }
    if let Some(tags) = update.tags {
        task.tags = tags;
    }
    if update.complexity.is_some() {
        task.complexity = update.complexity;
    }
    if update.impact.is_some() {
        task.impact = update.impact;
    }
    if update.urgency.is_some() {
        task.urgency = update.urgency;
    }

    task.log("Task updated");
    task.touch();
    let updated = task.clone();
    doc.touch();
    Ok(updated)
}

/// Remove a task, scrubbing it from every other task's dependency set
pub fn remove_task(doc: &mut TaskDocument, id: u64) -> EngineResult<Task> {
    doc.remove_task(id)
        .ok_or_else(|| EngineError::TaskNotFound { id: id.to_string() })
}

/// Create a subtask under a parent task
pub fn add_subtask(doc: &mut TaskDocument, parent_id: u64, new: NewSubtask) -> EngineResult<Subtask> {
    if new.title.trim().is_empty() {
        return Err(EngineError::EmptyTitle);
    }

    let task = doc
        .get_task_mut(parent_id)
        .ok_or_else(|| EngineError::TaskNotFound {
            id: parent_id.to_string(),
        })?;

    let ordinal = task.next_subtask_ordinal();
    let mut subtask = Subtask::new(parent_id, ordinal, new.title);
    subtask.related_files = new.related_files;
    subtask.tests = new.tests;
    subtask.log("Subtask created");

    task.add_subtask(subtask.clone());
    doc.touch();
    Ok(subtask)
}

/// Apply a partial update to a subtask
pub fn update_subtask(
    doc: &mut TaskDocument,
    id: &str,
    update: SubtaskUpdate,
) -> EngineResult<Subtask> {
    let (parent_id, subtask_id) = match ItemId::parse(id) {
        Some(ItemId::Subtask(parent_id, subtask_id)) => (parent_id, subtask_id),
        _ => return Err(EngineError::InvalidId { id: id.to_string() }),
    };

    let task = doc
        .get_task_mut(parent_id)
        .ok_or_else(|| EngineError::TaskNotFound {
            id: parent_id.to_string(),
        })?;

    let subtask = task
        .get_subtask_mut(&subtask_id)
        .ok_or_else(|| EngineError::SubtaskNotFound {
            task_id: parent_id,
            subtask_id: subtask_id.clone(),
        })?;

    if let Some(title) = update.title {
        if title.trim().is_empty() {
            return Err(EngineError::EmptyTitle);
        }
        subtask.title = title;
    }
    if let Some(related_files) = update.related_files {
        subtask.related_files = related_files;
    }
    if let Some(tests) = update.tests {
        subtask.tests = tests;
    }

    subtask.log("Subtask updated");
    subtask.touch();
    let updated = subtask.clone();
    task.touch();
    doc.touch();
    Ok(updated)
}

fn dedupe_ids(ids: Vec<u64>) -> Vec<u64> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TaskStatus;

    #[test]
    fn test_add_task_assigns_monotonic_ids() {
        let mut doc = TaskDocument::new();
        let a = add_task(
            &mut doc,
            NewTask {
                title: "First".to_string(),
                ..NewTask::default()
            },
        )
        .unwrap();
        let b = add_task(
            &mut doc,
            NewTask {
                title: "Second".to_string(),
                ..NewTask::default()
            },
        )
        .unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.status, TaskStatus::Todo);
        assert_eq!(a.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_add_task_rejects_empty_title() {
        let mut doc = TaskDocument::new();
        let result = add_task(
            &mut doc,
            NewTask {
                title: "   ".to_string(),
                ..NewTask::default()
            },
        );
        assert!(matches!(result, Err(EngineError::EmptyTitle)));
    }

    #[test]
    fn test_tag_template_priority() {
        let mut doc = TaskDocument::new();
        let bug = add_task(
            &mut doc,
            NewTask {
                title: "Fix crash".to_string(),
                tags: vec!["bug".to_string()],
                ..NewTask::default()
            },
        )
        .unwrap();
        assert_eq!(bug.priority, 700);

        let explicit = add_task(
            &mut doc,
            NewTask {
                title: "Urgent doc fix".to_string(),
                priority: Some(850),
                tags: vec!["docs".to_string()],
                ..NewTask::default()
            },
        )
        .unwrap();
        // explicit priority wins over the tag suggestion
        assert_eq!(explicit.priority, 850);
    }

    #[test]
    fn test_depends_on_deduplicated() {
        let mut doc = TaskDocument::new();
        let task = add_task(
            &mut doc,
            NewTask {
                title: "T".to_string(),
                depends_on: vec![3, 3, 5, 3],
                ..NewTask::default()
            },
        )
        .unwrap();
        assert_eq!(task.depends_on, vec![3, 5]);
    }

    #[test]
    fn test_manual_priority_edit_resets_base() {
        let mut doc = TaskDocument::new();
        let task = add_task(
            &mut doc,
            NewTask {
                title: "T".to_string(),
                ..NewTask::default()
            },
        )
        .unwrap();

        let updated = update_task(
            &mut doc,
            task.id,
            TaskUpdate {
                priority: Some(42),
                ..TaskUpdate::default()
            },
        )
        .unwrap();

        assert_eq!(updated.priority, 42);
        assert_eq!(updated.base_priority, Some(42));
    }

    #[test]
    fn test_subtask_lifecycle() {
        let mut doc = TaskDocument::new();
        let task = add_task(
            &mut doc,
            NewTask {
                title: "Parent".to_string(),
                ..NewTask::default()
            },
        )
        .unwrap();

        let sub = add_subtask(
            &mut doc,
            task.id,
            NewSubtask {
                title: "Child".to_string(),
                ..NewSubtask::default()
            },
        )
        .unwrap();
        assert_eq!(sub.id, "1.1");

        let updated = update_subtask(
            &mut doc,
            &sub.id,
            SubtaskUpdate {
                title: Some("Renamed".to_string()),
                ..SubtaskUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(updated.title, "Renamed");
    }

    #[test]
    fn test_remove_task_not_found() {
        let mut doc = TaskDocument::new();
        assert!(matches!(
            remove_task(&mut doc, 7),
            Err(EngineError::TaskNotFound { .. })
        ));
    }
}
