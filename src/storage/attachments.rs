use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{ChatError, Result};

/// Object storage for message attachments.
#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    /// Store `bytes` under `path` and return a durable retrieval URL.
    /// An existing object is never replaced.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Upload path for an attachment: `chat/{key}/{timestamp_ms}_{id}.{ext}`.
/// The random id keeps uploads within the same millisecond apart.
pub fn attachment_path(conversation_key: &str, timestamp_ms: i64, file_name: Option<&str>) -> String {
    let ext = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());

    let id = Uuid::new_v4().simple();
    format!("chat/{conversation_key}/{timestamp_ms}_{id}.{ext}")
}

/// Stores attachments as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
}

impl LocalAttachmentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if path.is_empty() || escapes {
            return Err(ChatError::Validation(format!(
                "invalid attachment path `{path}`"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AttachmentStorage for LocalAttachmentStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        if bytes.is_empty() {
            return Err(ChatError::Validation("attachment is empty".to_string()));
        }

        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Đã gửi thì không được ghi đè
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        let absolute = tokio::fs::canonicalize(&target).await?;
        log::debug!("Stored attachment {} ({} bytes)", absolute.display(), bytes.len());
        Ok(format!("file://{}", absolute.display()))
    }
}
