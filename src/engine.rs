//! Engine facade.
//!
//! `TaskEngine` is the seam transport collaborators (CLI, RPC) consume:
//! every operation runs a whole-document load → mutate → save cycle and
//! returns an `OperationResult` carrying a success flag plus either a
//! payload or a human-readable message. Recoverable policy and lookup
//! failures become failed results; corrupt documents and I/O failures
//! propagate as hard errors.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::config as config_ops;
use crate::domain::tasks as task_ops;
use crate::domain::{
    priority_statistics, set_status, DependencyAnalysis, DependencyAnalyzer, NewSubtask, NewTask,
    PriorityEngine, PriorityStatistics, RecalculationSummary, StatusChange, SubtaskUpdate,
    SyncWatcher, TaskUpdate, WatcherConfig, WatcherStatus,
};
use crate::entities::{
    ConfigOverrides, EffortWeightConfig, FoundItem, PriorityEngineConfig, Subtask, Task,
    TaskDocument, TaskStatus, TimeDecayConfig,
};
use crate::errors::{EngineError, EngineResult};
use crate::storage::{AfterSave, DocumentStore, FileStore, SaveOptions};

/// Result object returned by every engine operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub message: String,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    /// Success without a payload (e.g. "no actionable task")
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
        }
    }
}

/// Map recoverable errors into failed results; let fatal ones propagate
fn respond<T>(
    result: EngineResult<T>,
    ok_message: impl Into<String>,
) -> EngineResult<OperationResult<T>> {
    match result {
        Ok(data) => Ok(OperationResult::ok(data, ok_message)),
        Err(e) if e.is_recoverable() => Ok(OperationResult::fail(e.to_string())),
        Err(e) => Err(e),
    }
}

/// Options for an explicit `save` through the facade
#[derive(Clone, Default)]
pub struct EngineSaveOptions {
    /// Run the priority pipeline before writing
    pub recalculate_priorities: bool,

    /// Collaborator hook (table/markdown regeneration) run after a
    /// successful write
    pub after_save: Option<AfterSave>,
}

/// Releases the advisory busy flag when a foreground operation ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Facade over the task store, priority engine, state machine, and
/// watcher. One instance per document.
pub struct TaskEngine {
    store: Arc<FileStore>,
    busy: Arc<AtomicBool>,
    watcher: Mutex<Option<SyncWatcher>>,
}

impl TaskEngine {
    /// Create an engine over the given document path
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(FileStore::new(document_path)),
            busy: Arc::new(AtomicBool::new(false)),
            watcher: Mutex::new(None),
        }
    }

    /// Hold the advisory busy flag for a foreground mutation; the
    /// watcher defers its cycles while we hold it, and vice versa.
    async fn acquire(&self) -> BusyGuard {
        loop {
            if self
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return BusyGuard(Arc::clone(&self.busy));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Load the persisted document
    pub async fn load(&self) -> EngineResult<TaskDocument> {
        self.store.load().await
    }

    /// Persist a document the caller loaded and mutated
    pub async fn save(
        &self,
        mut document: TaskDocument,
        options: EngineSaveOptions,
    ) -> EngineResult<OperationResult<TaskDocument>> {
        let _guard = self.acquire().await;
        if options.recalculate_priorities {
            let config = document.config.clone();
            PriorityEngine::new(&config).recalculate(&mut document, chrono::Utc::now());
        }
        self.store
            .save(
                &document,
                &SaveOptions {
                    after_save: options.after_save,
                },
            )
            .await?;
        Ok(OperationResult::ok(document, "Document saved"))
    }

    /// Create a task with an auto-assigned id
    pub async fn add_task(&self, new: NewTask) -> EngineResult<OperationResult<Task>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let result = task_ops::add_task(&mut doc, new);
        if result.is_ok() {
            self.store.save(&doc, &SaveOptions::plain()).await?;
        }
        respond(result, "Task created")
    }

    /// Create a subtask under a parent task
    pub async fn add_subtask(
        &self,
        parent_id: u64,
        new: NewSubtask,
    ) -> EngineResult<OperationResult<Subtask>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let result = task_ops::add_subtask(&mut doc, parent_id, new);
        if result.is_ok() {
            self.store.save(&doc, &SaveOptions::plain()).await?;
        }
        respond(result, "Subtask created")
    }

    /// Apply a partial update to a task
    pub async fn update_task(
        &self,
        id: u64,
        update: TaskUpdate,
    ) -> EngineResult<OperationResult<Task>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let result = task_ops::update_task(&mut doc, id, update);
        if result.is_ok() {
            self.store.save(&doc, &SaveOptions::plain()).await?;
        }
        respond(result, "Task updated")
    }

    /// Apply a partial update to a subtask
    pub async fn update_subtask(
        &self,
        id: &str,
        update: SubtaskUpdate,
    ) -> EngineResult<OperationResult<Subtask>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let result = task_ops::update_subtask(&mut doc, id, update);
        if result.is_ok() {
            self.store.save(&doc, &SaveOptions::plain()).await?;
        }
        respond(result, "Subtask updated")
    }

    /// Remove a task and scrub it from dependency sets
    pub async fn remove_task(&self, id: u64) -> EngineResult<OperationResult<Task>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let result = task_ops::remove_task(&mut doc, id);
        if result.is_ok() {
            self.store.save(&doc, &SaveOptions::plain()).await?;
        }
        respond(result, "Task removed")
    }

    /// Validate and perform a status transition on a task or subtask
    pub async fn set_status(
        &self,
        id: &str,
        new_status: TaskStatus,
        message: Option<&str>,
    ) -> EngineResult<OperationResult<StatusChange>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let result = set_status(&mut doc, id, new_status, message);
        if result.is_ok() {
            self.store.save(&doc, &SaveOptions::plain()).await?;
        }
        respond(result, format!("Status set to {new_status}"))
    }

    /// Highest-priority ready task, or an empty success when nothing
    /// is actionable
    pub async fn get_next_task(&self) -> EngineResult<OperationResult<Task>> {
        let doc = self.store.load().await?;
        let analyzer = DependencyAnalyzer::new(&doc);
        Ok(match analyzer.next_task() {
            Some(task) => OperationResult::ok(task.clone(), "Next task selected"),
            None => OperationResult::empty("No actionable task"),
        })
    }

    /// Resolve an integer task id or dotted subtask id
    pub async fn find_task(&self, id: &str) -> EngineResult<OperationResult<FoundItem>> {
        let doc = self.store.load().await?;
        let result = doc
            .find(id)
            .ok_or_else(|| EngineError::TaskNotFound { id: id.to_string() });
        respond(result, "Item found")
    }

    /// Run the priority pipeline over the whole document. Overrides
    /// apply to this run only and are not persisted.
    pub async fn recalculate_priorities(
        &self,
        overrides: ConfigOverrides,
    ) -> EngineResult<OperationResult<RecalculationSummary>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let config = doc.config.with_overrides(&overrides);
        let summary = PriorityEngine::new(&config).recalculate(&mut doc, chrono::Utc::now());
        self.store.save(&doc, &SaveOptions::plain()).await?;
        Ok(OperationResult::ok(summary, "Priorities recalculated"))
    }

    /// Priority distribution summary, read-only
    pub async fn get_priority_statistics(
        &self,
    ) -> EngineResult<OperationResult<PriorityStatistics>> {
        let doc = self.store.load().await?;
        Ok(OperationResult::ok(
            priority_statistics(&doc),
            "Priority statistics",
        ))
    }

    /// Cycles, dangling references, blocking map, and critical path
    pub async fn get_dependency_analysis(
        &self,
    ) -> EngineResult<OperationResult<DependencyAnalysis>> {
        let doc = self.store.load().await?;
        let analysis = DependencyAnalyzer::new(&doc).analyze();
        Ok(OperationResult::ok(analysis, "Dependency analysis"))
    }

    /// Persist a time decay configuration (clamped into bounds)
    pub async fn configure_time_decay(
        &self,
        config: TimeDecayConfig,
    ) -> EngineResult<OperationResult<TimeDecayConfig>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let applied = config_ops::configure_time_decay(&mut doc, config);
        self.store.save(&doc, &SaveOptions::plain()).await?;
        Ok(OperationResult::ok(applied, "Time decay configured"))
    }

    /// Persist an effort weighting configuration (clamped into bounds)
    pub async fn configure_effort_weighting(
        &self,
        config: EffortWeightConfig,
    ) -> EngineResult<OperationResult<EffortWeightConfig>> {
        let _guard = self.acquire().await;
        let mut doc = self.store.load().await?;
        let applied = config_ops::configure_effort_weighting(&mut doc, config);
        self.store.save(&doc, &SaveOptions::plain()).await?;
        Ok(OperationResult::ok(applied, "Effort weighting configured"))
    }

    /// Snapshot of the persisted algorithm configuration
    pub async fn get_advanced_algorithm_config(
        &self,
    ) -> EngineResult<OperationResult<PriorityEngineConfig>> {
        let doc = self.store.load().await?;
        Ok(OperationResult::ok(
            config_ops::algorithm_config(&doc),
            "Algorithm configuration",
        ))
    }

    /// Start the change watcher over this engine's document
    pub async fn initialize_watcher(
        &self,
        config: WatcherConfig,
    ) -> EngineResult<OperationResult<WatcherStatus>> {
        let mut slot = self.watcher.lock().await;
        if slot.is_some() {
            return Ok(OperationResult::fail("Watcher already running"));
        }
        match SyncWatcher::start(Arc::clone(&self.store), &config, Arc::clone(&self.busy)) {
            Ok(watcher) => {
                let status = watcher.status();
                *slot = Some(watcher);
                Ok(OperationResult::ok(status, "Watcher started"))
            }
            Err(e) if e.is_recoverable() => Ok(OperationResult::fail(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Stop the change watcher
    pub async fn stop_watcher(&self) -> EngineResult<OperationResult<WatcherStatus>> {
        let mut slot = self.watcher.lock().await;
        match slot.take() {
            Some(watcher) => {
                watcher.stop().await;
                Ok(OperationResult::ok(WatcherStatus::stopped(), "Watcher stopped"))
            }
            None => Ok(OperationResult::fail(
                EngineError::WatcherNotRunning.to_string(),
            )),
        }
    }

    /// Watcher status snapshot; reports a stopped watcher when none
    /// has been initialized
    pub async fn get_watcher_status(&self) -> EngineResult<OperationResult<WatcherStatus>> {
        let slot = self.watcher.lock().await;
        let status = slot
            .as_ref()
            .map_or_else(WatcherStatus::stopped, SyncWatcher::status);
        Ok(OperationResult::ok(status, "Watcher status"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MAX_PRIORITY, MIN_PRIORITY};
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir) -> TaskEngine {
        TaskEngine::new(dir.path().join("tasks.json"))
    }

    fn titled(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..NewTask::default()
        }
    }

    #[tokio::test]
    async fn test_add_find_remove() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let created = engine.add_task(titled("First")).await.unwrap();
        assert!(created.success);
        let task = created.data.unwrap();

        let found = engine.find_task(&task.id.to_string()).await.unwrap();
        assert!(found.success);
        assert_eq!(found.data.unwrap().task.title, "First");

        let removed = engine.remove_task(task.id).await.unwrap();
        assert!(removed.success);

        let missing = engine.find_task(&task.id.to_string()).await.unwrap();
        assert!(!missing.success);
        assert!(missing.message.contains("not found"));
    }

    #[tokio::test]
    async fn test_dependency_gate_via_facade() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let a = engine.add_task(titled("A")).await.unwrap().data.unwrap();
        let b = engine
            .add_task(NewTask {
                title: "B".to_string(),
                depends_on: vec![a.id],
                ..NewTask::default()
            })
            .await
            .unwrap()
            .data
            .unwrap();

        let blocked = engine
            .set_status(&b.id.to_string(), TaskStatus::InProgress, None)
            .await
            .unwrap();
        assert!(!blocked.success);
        assert!(blocked.message.contains("unmet dependencies"));

        engine
            .set_status(&a.id.to_string(), TaskStatus::Done, None)
            .await
            .unwrap();
        let started = engine
            .set_status(&b.id.to_string(), TaskStatus::InProgress, None)
            .await
            .unwrap();
        assert!(started.success);
    }

    #[tokio::test]
    async fn test_next_task_terminal_result() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let none = engine.get_next_task().await.unwrap();
        assert!(none.success);
        assert!(none.data.is_none());
        assert_eq!(none.message, "No actionable task");

        engine.add_task(titled("Only")).await.unwrap();
        let some = engine.get_next_task().await.unwrap();
        assert_eq!(some.data.unwrap().title, "Only");
    }

    #[tokio::test]
    async fn test_recalculation_keeps_bounds() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        for i in 0..5u16 {
            engine
                .add_task(NewTask {
                    title: format!("Task {i}"),
                    priority: Some(995 + i),
                    ..NewTask::default()
                })
                .await
                .unwrap();
        }

        let summary = engine
            .recalculate_priorities(ConfigOverrides::default())
            .await
            .unwrap();
        assert!(summary.success);

        let doc = engine.load().await.unwrap();
        for task in &doc.tasks {
            assert!((MIN_PRIORITY..=MAX_PRIORITY).contains(&task.priority));
        }
        // uniqueness after distribution optimization
        let mut priorities: Vec<u16> = doc.tasks.iter().map(|t| t.priority).collect();
        priorities.sort_unstable();
        priorities.dedup();
        assert_eq!(priorities.len(), doc.tasks.len());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.add_task(titled("Persisted")).await.unwrap();

        let doc = engine.load().await.unwrap();
        engine
            .save(doc.clone(), EngineSaveOptions::default())
            .await
            .unwrap();
        let again = engine.load().await.unwrap();

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::to_value(&again).unwrap()
        );
    }

    #[tokio::test]
    async fn test_configuration_round_trip() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let applied = engine
            .configure_time_decay(TimeDecayConfig {
                rate: 50.0,
                ..TimeDecayConfig::default()
            })
            .await
            .unwrap();
        assert_eq!(applied.data.unwrap().rate, 0.2);

        let config = engine.get_advanced_algorithm_config().await.unwrap();
        assert_eq!(config.data.unwrap().time_decay.rate, 0.2);
    }

    #[tokio::test]
    async fn test_watcher_controls() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);

        let idle = engine.get_watcher_status().await.unwrap();
        assert!(!idle.data.unwrap().running);

        let started = engine
            .initialize_watcher(WatcherConfig::default())
            .await
            .unwrap();
        assert!(started.success);
        assert!(started.data.unwrap().running);

        let duplicate = engine
            .initialize_watcher(WatcherConfig::default())
            .await
            .unwrap();
        assert!(!duplicate.success);

        let stopped = engine.stop_watcher().await.unwrap();
        assert!(stopped.success);

        let again = engine.stop_watcher().await.unwrap();
        assert!(!again.success);
    }

    #[tokio::test]
    async fn test_corrupt_document_propagates() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("tasks.json"), "not json at all")
            .await
            .unwrap();
        let engine = engine_in(&dir);

        let result = engine.add_task(titled("X")).await;
        assert!(matches!(result, Err(EngineError::CorruptDocument { .. })));
    }
}
