//! Storage trait definitions.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::entities::TaskDocument;
use crate::errors::EngineResult;

/// Callback invoked after a successful write. Collaborator concerns
/// (table/markdown regeneration for human consumers) hook in here so
/// they never run against a half-persisted document.
pub type AfterSave = Arc<dyn Fn(&TaskDocument) + Send + Sync>;

/// Options controlling a document save
#[derive(Clone, Default)]
pub struct SaveOptions {
    /// Run the post-save hook once the write has landed
    pub after_save: Option<AfterSave>,
}

impl SaveOptions {
    /// Plain save with no post-save hook
    pub fn plain() -> Self {
        Self::default()
    }
}

/// Storage interface for whole-document persistence.
///
/// The discipline is whole-document read-modify-write: callers load
/// immediately before mutating and save immediately after. The last
/// save wins; concurrent external writers are an accepted risk.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the persisted document. An absent file yields an empty
    /// document with a fresh id counter; a malformed file is a
    /// `CorruptDocument` error, never a fabricated empty document.
    async fn load(&self) -> EngineResult<TaskDocument>;

    /// Serialize and persist the full document atomically
    /// (write-temp-then-rename), then run any post-save hook.
    async fn save(&self, document: &TaskDocument, options: &SaveOptions) -> EngineResult<()>;

    /// Whether a persisted document exists
    async fn exists(&self) -> bool;

    /// Path of the persisted document
    fn path(&self) -> &Path;
}
