//! Activity log entry entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable activity log entry, append-only once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,

    /// Entry kind; `log` is the only engine-generated kind, callers
    /// may append others
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Human-readable message
    pub message: String,
}

fn default_kind() -> String {
    "log".to_string()
}

impl LogEntry {
    /// Create an engine-generated `log` entry
    pub fn log(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: default_kind(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_kind() {
        let entry = LogEntry::log("status changed");
        assert_eq!(entry.kind, "log");
        assert_eq!(entry.message, "status changed");
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry::log("hello");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "log");
        assert!(json.get("timestamp").is_some());
    }
}
