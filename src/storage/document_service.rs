use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::chat_db::ChatDatabase;
use crate::error::{ChatError, Result};

// Kích thước buffer của change feed
const CHANGE_FEED_CAPACITY: usize = 256;

/// Notification published after a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    ConversationChanged {
        key: String,
        participants: Vec<String>,
    },
    MessagesChanged {
        key: String,
    },
}

/// Asynchronous handle to the document backend.
///
/// Queries run on the blocking pool against one shared connection; every
/// successful mutation should be followed by [`DocumentService::publish`]
/// so live subscriptions can refresh.
#[derive(Clone)]
pub struct DocumentService {
    db: Arc<Mutex<ChatDatabase>>,
    changes: broadcast::Sender<Change>,
}

impl DocumentService {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_database(ChatDatabase::with_path(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_database(ChatDatabase::in_memory()?))
    }

    pub fn from_database(db: ChatDatabase) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            changes,
        }
    }

    /// Run `op` against the database without blocking the async caller.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut ChatDatabase) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| ChatError::Unavailable("database lock poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|err| ChatError::Unavailable(format!("database worker failed: {err}")))?
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    pub fn publish(&self, change: Change) {
        // Không có ai lắng nghe thì bỏ qua
        let _ = self.changes.send(change);
    }
}
