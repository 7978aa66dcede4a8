//! JSON file storage for the task document.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::traits::{DocumentStore, SaveOptions};
use crate::entities::TaskDocument;
use crate::errors::{EngineError, EngineResult};

/// Single-file JSON document store
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by the given document path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".tmp");
        PathBuf::from(os)
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load(&self) -> EngineResult<TaskDocument> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no document on disk, starting empty");
                return Ok(TaskDocument::new());
            }
            Err(e) => {
                return Err(EngineError::FileReadError {
                    path: self.path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| EngineError::CorruptDocument {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, document: &TaskDocument, options: &SaveOptions) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(document)?;
        let tmp = self.tmp_path();

        // Write-temp-then-rename so a concurrent reader never sees a
        // partial document.
        fs::write(&tmp, &content)
            .await
            .map_err(|e| EngineError::FileWriteError {
                path: tmp.display().to_string(),
                reason: e.to_string(),
            })?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EngineError::FileWriteError {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            path = %self.path.display(),
            tasks = document.tasks.len(),
            "document saved"
        );

        if let Some(hook) = &options.after_save {
            hook(document);
        }

        Ok(())
    }

    async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
