pub mod attachments;
pub mod chat_db;
pub mod connection;
pub mod document_service;
pub mod models;
pub mod profiles;

pub use attachments::{AttachmentStorage, LocalAttachmentStore};
pub use chat_db::ChatDatabase;
pub use document_service::{Change, DocumentService};
pub use profiles::{ProfileDirectory, SqliteProfileDirectory};

use std::fs;
use std::path::Path;

/// Ensure the parent directory of `path` exists
pub fn ensure_parent_dir<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
