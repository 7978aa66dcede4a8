//! Error types for the taskforge crate.

use thiserror::Error;

/// Comprehensive error types for the task engine
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    // Lookup errors
    #[error("Task '{id}' not found")]
    TaskNotFound { id: String },

    #[error("Subtask '{subtask_id}' not found in task '{task_id}'")]
    SubtaskNotFound { task_id: u64, subtask_id: String },

    // Policy violations
    #[error("Task '{id}' has unmet dependencies: {unmet:?}")]
    UnmetDependency { id: String, unmet: Vec<u64> },

    #[error("Task '{id}' has incomplete subtasks: {open:?}")]
    IncompleteSubtasks { id: u64, open: Vec<String> },

    #[error("Invalid status transition for '{id}': {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    // Validation errors
    #[error("Invalid status: '{status}'")]
    InvalidStatus { status: String },

    #[error("Invalid decay model: '{model}'")]
    InvalidDecayModel { model: String },

    #[error("Task title must not be empty")]
    EmptyTitle,

    #[error("Invalid task ID format: '{id}'")]
    InvalidId { id: String },

    // Dependency graph errors
    #[error("Circular dependency detected: {cycle:?}")]
    CircularDependency { cycle: Vec<u64> },

    #[error("Task '{task_id}' depends on non-existent task '{dep_id}'")]
    DanglingDependency { task_id: u64, dep_id: u64 },

    // Storage errors
    #[error("Corrupt task document at '{path}': {reason}")]
    CorruptDocument { path: String, reason: String },

    #[error("Failed to read file '{path}': {reason}")]
    FileReadError { path: String, reason: String },

    #[error("Failed to write file '{path}': {reason}")]
    FileWriteError { path: String, reason: String },

    #[error("Failed to parse JSON: {reason}")]
    JsonParseError { reason: String },

    #[error("Storage error: {reason}")]
    StorageError { reason: String },

    // Watcher errors
    #[error("Watcher error: {reason}")]
    WatcherError { reason: String },

    #[error("Watcher is not running")]
    WatcherNotRunning,
}

impl EngineError {
    /// Whether the error is a recoverable policy/lookup failure that the
    /// facade reports as a failed result rather than propagating.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::CorruptDocument { .. }
                | Self::FileReadError { .. }
                | Self::FileWriteError { .. }
                | Self::StorageError { .. }
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParseError {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::TaskNotFound {
            id: "123".to_string(),
        };
        assert_eq!(err.to_string(), "Task '123' not found");
    }

    #[test]
    fn test_unmet_dependency_is_recoverable() {
        let err = EngineError::UnmetDependency {
            id: "2".to_string(),
            unmet: vec![1],
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_corrupt_document_is_fatal() {
        let err = EngineError::CorruptDocument {
            path: "tasks.json".to_string(),
            reason: "truncated".to_string(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let engine_err: EngineError = io_err.into();
        assert!(matches!(engine_err, EngineError::StorageError { .. }));
    }
}
