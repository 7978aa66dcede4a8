//! Subtask entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskStatus;
use super::LogEntry;

/// Subtask structure, owned exclusively by one parent task.
///
/// Subtasks carry no dependencies or priority of their own and
/// cannot be nested further.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Dotted id in `<parentId>.<ordinal>` format
    pub id: String,

    /// Brief, descriptive title
    pub title: String,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Paths of files this subtask touches
    #[serde(default, rename = "relatedFiles")]
    pub related_files: Vec<String>,

    /// Verification steps
    #[serde(default)]
    pub tests: Vec<String>,

    /// Append-only activity log
    #[serde(default, rename = "activityLog")]
    pub activity_log: Vec<LogEntry>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,

    /// Unknown fields preserved for lossless round-trips
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Subtask {
    /// Create a new subtask under a parent task
    pub fn new(parent_id: u64, ordinal: u32, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{parent_id}.{ordinal}"),
            title: title.into(),
            status: TaskStatus::default(),
            related_files: Vec::new(),
            tests: Vec::new(),
            activity_log: Vec::new(),
            created_at: now,
            updated_at: now,
            extra: serde_json::Map::new(),
        }
    }

    /// Ordinal component of the dotted id, if well-formed
    pub fn ordinal(&self) -> Option<u32> {
        self.id.split_once('.').and_then(|(_, ord)| ord.parse().ok())
    }

    /// Append an engine-generated activity log entry
    pub fn log(&mut self, message: impl Into<String>) {
        self.activity_log.push(LogEntry::log(message));
    }

    /// Refresh the updated timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
