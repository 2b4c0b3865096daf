use std::path::PathBuf;

use crate::common::{ChatEvent, ConversationSummary, Message, ParticipantRef};

/// Hội thoại đang mở trên màn hình.
#[derive(Debug, Clone)]
pub struct OpenView {
    pub key: String,
    pub counterpart: ParticipantRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    pub message: String,
    pub retryable: bool,
}

/// Trạng thái cục bộ của UI.
pub struct AppState {
    pub viewer: String,
    pub conversations: Vec<ConversationSummary>,
    pub open: Option<OpenView>,
    pub messages: Vec<Message>,
    pub input_text: String,
    pub image_path_input: String,
    pub new_chat_input: String,
    pub error: Option<ErrorBanner>,
}

impl AppState {
    pub fn new(viewer: String) -> Self {
        Self {
            viewer,
            conversations: Vec::new(),
            open: None,
            messages: Vec::new(),
            input_text: String::new(),
            image_path_input: String::new(),
            new_chat_input: String::new(),
            error: None,
        }
    }

    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ConversationsUpdated(list) => self.conversations = list,
            ChatEvent::ConversationOpened { key, counterpart } => {
                self.open = Some(OpenView { key, counterpart });
                self.messages.clear();
                self.error = None;
            }
            ChatEvent::MessagesUpdated { key, messages } => {
                // Snapshot của hội thoại cũ có thể đến trễ
                if self.open.as_ref().is_some_and(|open| open.key == key) {
                    self.messages = messages;
                }
            }
            ChatEvent::Error { message, retryable } => {
                self.error = Some(ErrorBanner { message, retryable });
            }
        }
    }

    pub fn close_conversation(&mut self) {
        self.open = None;
        self.messages.clear();
    }

    pub fn take_image_path(&mut self) -> Option<PathBuf> {
        let path = self.image_path_input.trim().to_string();
        self.image_path_input.clear();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations.iter().map(|c| c.unread).sum()
    }

    /// Label for a message sender: "You" or the counterpart's name.
    pub fn sender_label(&self, sender: &str) -> String {
        if sender == self.viewer {
            return "You".to_string();
        }
        match &self.open {
            Some(open) if open.counterpart.id == sender => open.counterpart.display_name.clone(),
            _ => sender.to_string(),
        }
    }
}
