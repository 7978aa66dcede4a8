//! Core data structures for the task engine.

mod config;
mod document;
mod log;
mod subtask;
mod task;

pub use config::{
    ConfigOverrides, DecayModel, EffortWeightConfig, PriorityEngineConfig, TimeDecayConfig,
};
pub use document::{DocumentMeta, FoundItem, ItemId, TaskDocument};
pub use log::LogEntry;
pub use subtask::Subtask;
pub use task::{
    clamp_priority, Task, TaskStatus, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
