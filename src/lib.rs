//! Persistent task and priority engine for agent-driven workflows.
//!
//! A single JSON document holds the whole task graph: tasks with dotted
//! subtask ids, dependency edges, an activity log per item, and the
//! algorithm configuration. On top of that document this crate provides
//! a dependency graph analyzer (cycles, dangling references, critical
//! path, next-task selection), a four-stage priority recalculation
//! pipeline, a validated status state machine, and a debounced file
//! watcher that keeps priorities current as the document changes on
//! disk.
//!
//! `TaskEngine` is the entry point; the `domain` modules expose the
//! same logic as pure transforms over a loaded [`TaskDocument`] for
//! callers that manage persistence themselves.

pub mod domain;
pub mod engine;
pub mod entities;
pub mod errors;
pub mod storage;

pub use domain::{
    priority_statistics, set_status, DanglingRef, DependencyAnalysis, DependencyAnalyzer,
    NewSubtask, NewTask, PriorityEngine, PriorityStatistics, RecalculationSummary, StatusChange,
    SubtaskUpdate, SyncWatcher, TaskUpdate, WatcherConfig, WatcherStatus,
};
pub use engine::{EngineSaveOptions, OperationResult, TaskEngine};
pub use entities::{
    ConfigOverrides, DecayModel, EffortWeightConfig, FoundItem, ItemId, LogEntry,
    PriorityEngineConfig, Subtask, Task, TaskDocument, TaskStatus, TimeDecayConfig,
    DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
pub use errors::{EngineError, EngineResult};
pub use storage::{AfterSave, DocumentStore, FileStore, SaveOptions};
