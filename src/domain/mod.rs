//! Domain logic for the task engine.
//!
//! Everything here operates on a loaded document as explicit
//! value-returning transforms; persistence stays in `storage` and the
//! two meet in the `engine` facade.

pub mod config;
pub mod deps;
pub mod priority;
pub mod status;
pub mod tasks;
pub mod watcher;

pub use deps::{DanglingRef, DependencyAnalysis, DependencyAnalyzer};
pub use priority::{
    priority_statistics, PriorityEngine, PriorityStatistics, RecalculationSummary,
};
pub use status::{set_status, StatusChange};
pub use tasks::{NewSubtask, NewTask, SubtaskUpdate, TaskUpdate};
pub use watcher::{SyncWatcher, WatcherConfig, WatcherStatus};
