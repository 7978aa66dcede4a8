//! Status state machine.
//!
//! Validates and performs task/subtask status transitions: starting
//! work is gated on dependency completion, finishing a task is gated
//! on subtask completion, and `done` can only be left through an
//! explicit reopen to `todo`. Every successful transition appends an
//! activity log entry and refreshes timestamps.

use serde::Serialize;
use tracing::debug;

use crate::entities::{ItemId, Subtask, TaskDocument, TaskStatus};
use crate::errors::{EngineError, EngineResult};

/// Titles of the verification subtasks auto-created when a task enters
/// `testing`. The duplicate check is an exact case-sensitive title
/// match, so renaming one causes re-creation on the next entry.
const VERIFICATION_TITLES: [&str; 2] = ["Write tests", "Ensure tests pass"];

/// Result of a successful status transition
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
    /// Dotted ids of verification subtasks created as a side effect
    #[serde(skip_serializing_if = "Vec::is_empty", rename = "createdSubtasks")]
    pub created_subtasks: Vec<String>,
}

/// Validate and perform a status transition on a task or subtask.
pub fn set_status(
    doc: &mut TaskDocument,
    id: &str,
    new_status: TaskStatus,
    message: Option<&str>,
) -> EngineResult<StatusChange> {
    let item = ItemId::parse(id).ok_or_else(|| EngineError::InvalidId { id: id.to_string() })?;

    let change = match item {
        ItemId::Task(task_id) => set_task_status(doc, task_id, new_status, message)?,
        ItemId::Subtask(parent_id, subtask_id) => {
            set_subtask_status(doc, parent_id, &subtask_id, new_status, message)?
        }
    };

    doc.touch();
    debug!(id, from = %change.from, to = %change.to, "status transition");
    Ok(change)
}

fn set_task_status(
    doc: &mut TaskDocument,
    task_id: u64,
    new_status: TaskStatus,
    message: Option<&str>,
) -> EngineResult<StatusChange> {
    let done = doc.done_ids();
    let idx = doc
        .task_index(task_id)
        .ok_or_else(|| EngineError::TaskNotFound {
            id: task_id.to_string(),
        })?;

    let from = doc.tasks[idx].status;
    check_reopen_rule(&task_id.to_string(), from, new_status)?;

    if matches!(new_status, TaskStatus::InProgress | TaskStatus::Testing) {
        let unmet = doc.tasks[idx].unmet_deps(&done);
        if !unmet.is_empty() {
            return Err(EngineError::UnmetDependency {
                id: task_id.to_string(),
                unmet,
            });
        }
    }

    if new_status == TaskStatus::Done {
        let open = doc.tasks[idx].open_subtasks();
        if !open.is_empty() {
            return Err(EngineError::IncompleteSubtasks { id: task_id, open });
        }
    }

    let task = &mut doc.tasks[idx];
    task.status = new_status;
    task.log(transition_message(from, new_status, message));
    task.touch();

    let mut created_subtasks = Vec::new();
    if new_status == TaskStatus::Testing {
        created_subtasks = ensure_verification_subtasks(doc, idx);
    }

    Ok(StatusChange {
        id: task_id.to_string(),
        from,
        to: new_status,
        created_subtasks,
    })
}

fn set_subtask_status(
    doc: &mut TaskDocument,
    parent_id: u64,
    subtask_id: &str,
    new_status: TaskStatus,
    message: Option<&str>,
) -> EngineResult<StatusChange> {
    let done = doc.done_ids();
    let idx = doc
        .task_index(parent_id)
        .ok_or_else(|| EngineError::TaskNotFound {
            id: parent_id.to_string(),
        })?;

    // starting a subtask is gated on the parent's dependencies: work on
    // a blocked task must not begin through its subtasks
    if matches!(new_status, TaskStatus::InProgress | TaskStatus::Testing) {
        let unmet = doc.tasks[idx].unmet_deps(&done);
        if !unmet.is_empty() {
            return Err(EngineError::UnmetDependency {
                id: subtask_id.to_string(),
                unmet,
            });
        }
    }

    let parent = &mut doc.tasks[idx];
    let subtask =
        parent
            .get_subtask_mut(subtask_id)
            .ok_or_else(|| EngineError::SubtaskNotFound {
                task_id: parent_id,
                subtask_id: subtask_id.to_string(),
            })?;

    let from = subtask.status;
    check_reopen_rule(subtask_id, from, new_status)?;

    subtask.status = new_status;
    subtask.log(transition_message(from, new_status, message));
    subtask.touch();
    parent.touch();

    Ok(StatusChange {
        id: subtask_id.to_string(),
        from,
        to: new_status,
        created_subtasks: Vec::new(),
    })
}

/// `done` is terminal except for an explicit reopen to `todo`
fn check_reopen_rule(id: &str, from: TaskStatus, to: TaskStatus) -> EngineResult<()> {
    if from == TaskStatus::Done && !matches!(to, TaskStatus::Todo | TaskStatus::Done) {
        return Err(EngineError::InvalidTransition {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

fn transition_message(from: TaskStatus, to: TaskStatus, message: Option<&str>) -> String {
    match message {
        Some(m) => format!("Status changed from {from} to {to}: {m}"),
        None => format!("Status changed from {from} to {to}"),
    }
}

/// Create the standard verification subtasks on entering `testing`,
/// skipping any whose exact title already exists under the task.
fn ensure_verification_subtasks(doc: &mut TaskDocument, idx: usize) -> Vec<String> {
    let task = &mut doc.tasks[idx];
    let mut created = Vec::new();

    for title in VERIFICATION_TITLES {
        if task.subtasks.iter().any(|s| s.title == title) {
            continue;
        }
        let ordinal = task.next_subtask_ordinal();
        let mut subtask = Subtask::new(task.id, ordinal, title);
        subtask.log("Created automatically on entering testing");
        created.push(subtask.id.clone());
        task.subtasks.push(subtask);
    }

    if !created.is_empty() {
        task.touch();
    }
    created
}
