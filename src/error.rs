use thiserror::Error;

/// Lỗi của tầng chat.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Backend could not be reached or the worker pool is gone.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Rejected before touching the backend.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Connectivity-class failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::Unavailable(_) | ChatError::Database(_) | ChatError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
