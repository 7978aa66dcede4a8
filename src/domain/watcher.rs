//! Change watcher and sync loop.
//!
//! Watches the persisted document for external modifications and
//! re-enters the load → recalculate → save cycle without caller
//! involvement. File events are debounced and funneled through a
//! bounded trigger queue; an advisory busy flag shared with the
//! foreground engine keeps the two from mutating concurrently, and a
//! content hash guard keeps the loop's own saves from re-triggering it.

use chrono::{DateTime, Utc};
use notify_debouncer_full::{
    new_debouncer,
    notify::{RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::priority::PriorityEngine;
use crate::errors::{EngineError, EngineResult};
use crate::storage::{DocumentStore, FileStore, SaveOptions};

/// Shortest accepted debounce window
pub const MIN_DEBOUNCE_MS: u64 = 100;
/// Longest accepted debounce window
pub const MAX_DEBOUNCE_MS: u64 = 5000;

/// Watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce window in milliseconds, clamped to [100, 5000]
    #[serde(default = "default_debounce_ms", rename = "debounceMs")]
    pub debounce_ms: u64,

    /// Trigger queue capacity; excess triggers are dropped (the
    /// debouncer has already coalesced bursts, so a dropped trigger is
    /// a merge, not a loss)
    #[serde(default = "default_max_queue", rename = "maxQueue")]
    pub max_queue: usize,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_max_queue() -> usize {
    16
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_queue: default_max_queue(),
        }
    }
}

impl WatcherConfig {
    /// Return a copy with every parameter forced into bounds
    pub fn clamped(&self) -> Self {
        Self {
            debounce_ms: self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS),
            max_queue: self.max_queue.max(1),
        }
    }
}

/// Watcher status snapshot for `getWatcherStatus`
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub running: bool,

    /// Triggers waiting in the queue
    pub pending: usize,

    /// Completed recompute cycles
    #[serde(rename = "cyclesCompleted")]
    pub cycles_completed: u64,

    #[serde(rename = "lastSync", skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,

    #[serde(rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WatcherStatus {
    /// Status reported when no watcher has been initialized
    pub fn stopped() -> Self {
        Self {
            running: false,
            pending: 0,
            cycles_completed: 0,
            last_sync: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SyncTrigger {
    FileChange,
    Forced,
}

struct WatcherShared {
    running: AtomicBool,
    pending: AtomicUsize,
    cycles: AtomicU64,
    last_hash: AtomicU64,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

/// Debounced document watcher driving the sync loop
pub struct SyncWatcher {
    shared: Arc<WatcherShared>,
    tx: mpsc::Sender<SyncTrigger>,
    // kept alive for the lifetime of the watcher; dropping it stops
    // event delivery
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    worker: tokio::task::JoinHandle<()>,
}

impl SyncWatcher {
    /// Start watching the store's document. `busy` is the advisory
    /// in-process flag shared with the foreground engine.
    pub fn start(
        store: Arc<FileStore>,
        config: &WatcherConfig,
        busy: Arc<AtomicBool>,
    ) -> EngineResult<Self> {
        let config = config.clamped();
        let doc_path = store.path().to_path_buf();
        let watch_dir = doc_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);
        std::fs::create_dir_all(&watch_dir)?;

        let shared = Arc::new(WatcherShared {
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
            cycles: AtomicU64::new(0),
            last_hash: AtomicU64::new(0),
            last_sync: Mutex::new(None),
            last_error: Mutex::new(None),
        });

        let (tx, mut rx) = mpsc::channel::<SyncTrigger>(config.max_queue);

        let handler_tx = tx.clone();
        let handler_shared = Arc::clone(&shared);
        let handler_path = doc_path.clone();
        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let relevant = events.iter().any(|e| {
                        e.event.paths.is_empty()
                            || e.event.paths.iter().any(|p| p == &handler_path)
                    });
                    if !relevant {
                        return;
                    }
                    match handler_tx.try_send(SyncTrigger::FileChange) {
                        Ok(()) => {
                            handler_shared.pending.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            // queue full: the pending trigger already
                            // covers this change
                            warn!("sync queue full, merging change event");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(err = %e, "file watcher error");
                    }
                }
            },
        )
        .map_err(|e| EngineError::WatcherError {
            reason: e.to_string(),
        })?;

        debouncer
            .watcher()
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| EngineError::WatcherError {
                reason: e.to_string(),
            })?;

        info!(path = %doc_path.display(), debounce_ms = config.debounce_ms, "sync watcher started");

        let worker_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            while let Some(trigger) = rx.recv().await {
                worker_shared.pending.fetch_sub(1, Ordering::SeqCst);
                if !worker_shared.running.load(Ordering::SeqCst) {
                    break;
                }

                // advisory exclusion against the foreground engine
                while busy
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }

                let outcome = run_cycle(store.as_ref(), &worker_shared, trigger).await;
                busy.store(false, Ordering::SeqCst);

                match outcome {
                    Ok(ran) => {
                        if ran {
                            worker_shared.cycles.fetch_add(1, Ordering::SeqCst);
                            *worker_shared.last_sync.lock().unwrap() = Some(Utc::now());
                            *worker_shared.last_error.lock().unwrap() = None;
                        }
                    }
                    Err(e) => {
                        warn!(err = %e, "sync cycle failed");
                        *worker_shared.last_error.lock().unwrap() = Some(e.to_string());
                    }
                }
            }
        });

        Ok(Self {
            shared,
            tx,
            _debouncer: debouncer,
            worker,
        })
    }

    /// Queue an immediate sync cycle, bypassing change detection
    pub fn force_sync(&self) -> EngineResult<()> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::WatcherNotRunning);
        }
        match self.tx.try_send(SyncTrigger::Forced) {
            Ok(()) => {
                self.shared.pending.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("sync queue full, merging forced sync");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EngineError::WatcherNotRunning),
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            pending: self.shared.pending.load(Ordering::SeqCst),
            cycles_completed: self.shared.cycles.load(Ordering::SeqCst),
            last_sync: *self.shared.last_sync.lock().unwrap(),
            last_error: self.shared.last_error.lock().unwrap().clone(),
        }
    }

    /// Stop watching. Shutdown is cooperative: event delivery stops,
    /// the trigger channel closes, and we wait for the worker to drain.
    /// An in-flight cycle always runs to completion, so the shared busy
    /// flag is never stranded and no partial write is left behind.
    pub async fn stop(self) {
        let Self {
            shared,
            tx,
            _debouncer,
            worker,
        } = self;
        shared.running.store(false, Ordering::SeqCst);
        // dropping the debouncer and our sender closes the channel once
        // the handler's clone goes with it; recv then returns None
        drop(_debouncer);
        drop(tx);
        if let Err(e) = worker.await {
            warn!(err = %e, "sync worker ended abnormally");
        }
        info!("sync watcher stopped");
    }
}

/// One recompute cycle. Returns false when the change was our own
/// write-back and the cycle was skipped.
async fn run_cycle(
    store: &FileStore,
    shared: &WatcherShared,
    trigger: SyncTrigger,
) -> EngineResult<bool> {
    let mut doc = store.load().await?;

    let hash = content_hash(&serde_json::to_string_pretty(&doc)?);
    if matches!(trigger, SyncTrigger::FileChange)
        && hash == shared.last_hash.load(Ordering::SeqCst)
    {
        debug!("document unchanged since our last write, skipping cycle");
        return Ok(false);
    }

    let config = doc.config.clone();
    PriorityEngine::new(&config).recalculate(&mut doc, Utc::now());
    store.save(&doc, &SaveOptions::plain()).await?;

    let new_hash = content_hash(&serde_json::to_string_pretty(&doc)?);
    shared.last_hash.store(new_hash, Ordering::SeqCst);
    debug!("sync cycle complete");
    Ok(true)
}

/// Cheap content hash for self-write detection; this guards a feedback
/// loop, not integrity, so a 64-bit std hash is plenty.
fn content_hash(content: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Task, TaskDocument};
    use tempfile::TempDir;

    #[test]
    fn test_config_clamping() {
        let config = WatcherConfig {
            debounce_ms: 10,
            max_queue: 0,
        }
        .clamped();
        assert_eq!(config.debounce_ms, MIN_DEBOUNCE_MS);
        assert_eq!(config.max_queue, 1);

        let config = WatcherConfig {
            debounce_ms: 60_000,
            max_queue: 8,
        }
        .clamped();
        assert_eq!(config.debounce_ms, MAX_DEBOUNCE_MS);
    }

    #[tokio::test]
    async fn test_start_status_stop() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("tasks.json")));
        let busy = Arc::new(AtomicBool::new(false));

        let watcher = SyncWatcher::start(store, &WatcherConfig::default(), busy).unwrap();
        let status = watcher.status();
        assert!(status.running);
        assert_eq!(status.cycles_completed, 0);

        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_force_sync_runs_a_cycle() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("tasks.json")));
        let busy = Arc::new(AtomicBool::new(false));

        let watcher =
            SyncWatcher::start(Arc::clone(&store), &WatcherConfig::default(), busy).unwrap();
        watcher.force_sync().unwrap();

        // bounded wait for the cycle to land
        for _ in 0..100 {
            if watcher.status().cycles_completed > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(watcher.status().cycles_completed > 0);
        assert!(store.exists().await);

        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_busy_flag() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("tasks.json")));

        // enough tasks that a cycle is plausibly in flight when we stop
        let mut doc = TaskDocument::new();
        for _ in 0..500 {
            let id = doc.take_next_id();
            doc.tasks.push(Task::new(id, format!("Task {id}"), ""));
        }
        store.save(&doc, &SaveOptions::plain()).await.unwrap();

        let busy = Arc::new(AtomicBool::new(false));
        let watcher = SyncWatcher::start(
            Arc::clone(&store),
            &WatcherConfig::default(),
            Arc::clone(&busy),
        )
        .unwrap();

        watcher.force_sync().unwrap();
        watcher.stop().await;

        // the in-flight cycle ran to completion and released the flag
        assert!(!busy.load(Ordering::SeqCst));
        assert!(store.load().await.is_ok());
    }
}
