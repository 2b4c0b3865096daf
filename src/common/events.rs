use super::types::{ConversationSummary, Message, ParticipantRef};

/// Sự kiện từ chat worker gửi lên UI.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    ConversationsUpdated(Vec<ConversationSummary>),
    ConversationOpened {
        key: String,
        counterpart: ParticipantRef,
    },
    /// Full ordered snapshot, not a diff.
    MessagesUpdated { key: String, messages: Vec<Message> },
    Error { message: String, retryable: bool },
}
