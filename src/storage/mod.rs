//! Persistence for the task document.

mod file;
mod traits;

pub use file::FileStore;
pub use traits::{AfterSave, DocumentStore, SaveOptions};
