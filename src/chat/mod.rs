//! Two-party chat: conversation identity, metadata, message log, unread
//! counters and the live views built on top of them.

pub mod list_view;
pub mod message_log;
pub mod resolver;
pub mod service;
pub mod session;
pub mod store;
pub mod subscription;
pub mod unread;

pub use list_view::ConversationListView;
pub use message_log::MessageLog;
pub use resolver::conversation_key;
pub use service::ChatService;
pub use session::ChatSession;
pub use store::ConversationStore;
pub use subscription::Subscription;
pub use unread::UnreadCounter;

pub use crate::error::{ChatError, Result};

/// Backend clock, milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
