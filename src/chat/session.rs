use crate::chat::resolver::conversation_key;
use crate::chat::service::ChatService;
use crate::chat::store::validate_pair;
use crate::chat::subscription::Subscription;
use crate::common::{Message, OutgoingMessage};
use crate::error::{ChatError, Result};

/// One open conversation as seen by `viewer`.
///
/// Opening resolves the key, creates the conversation if needed, clears
/// the viewer's unread counter and starts the message subscription.
/// Dropping or closing the session cancels the subscription.
pub struct ChatSession {
    chat: ChatService,
    viewer: String,
    counterpart: String,
    key: String,
    messages: Subscription<Vec<Message>>,
}

impl ChatSession {
    pub async fn open(chat: ChatService, viewer_id: &str, counterpart_id: &str) -> Result<Self> {
        validate_pair(viewer_id, counterpart_id)?;
        let key = conversation_key(viewer_id, counterpart_id);

        chat.store()
            .ensure_conversation(&key, viewer_id, counterpart_id)
            .await?;
        chat.store().mark_read(&key, viewer_id).await?;
        let messages = chat.messages().subscribe(&key);

        log::info!("{viewer_id} opened {key}");
        Ok(Self {
            chat,
            viewer: viewer_id.to_string(),
            counterpart: counterpart_id.to_string(),
            key,
            messages,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn counterpart(&self) -> &str {
        &self.counterpart
    }

    /// Next full message list.
    pub async fn next_messages(&mut self) -> Option<Result<Vec<Message>>> {
        self.messages.next().await
    }

    /// Restart the message subscription after a terminal error.
    pub fn resubscribe(&mut self) {
        self.messages = self.chat.messages().subscribe(&self.key);
    }

    pub async fn send_text(&self, text: &str) -> Result<Message> {
        // Kiểm tra trước khi gọi backend
        let message = OutgoingMessage::text(text)?;
        self.send(&message).await
    }

    /// Upload `bytes` and send them as an image, with an optional caption.
    pub async fn send_attachment(
        &self,
        file_name: Option<&str>,
        bytes: Vec<u8>,
        caption: Option<String>,
    ) -> Result<Message> {
        if bytes.is_empty() {
            return Err(ChatError::Validation("attachment is empty".to_string()));
        }
        let url = self
            .chat
            .upload_attachment(&self.key, file_name, bytes)
            .await?;
        let message = OutgoingMessage::new(caption, Some(url))?;
        self.send(&message).await
    }

    pub async fn send(&self, message: &OutgoingMessage) -> Result<Message> {
        self.chat
            .send_message(&self.key, &self.viewer, &self.counterpart, message)
            .await
    }

    pub async fn mark_read(&self) -> Result<()> {
        self.chat.store().mark_read(&self.key, &self.viewer).await
    }

    pub fn close(self) {
        log::info!("{} closed {}", self.viewer, self.key);
        self.messages.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::chat_service;

    #[tokio::test]
    async fn test_open_clears_viewer_unread() {
        let (chat, _dir) = chat_service();
        let alice = chat.open_session("u1", "u2").await.unwrap();
        alice.send_text("one").await.unwrap();
        alice.send_text("two").await.unwrap();
        assert_eq!(chat.unread().unread_for("u1_u2", "u2").await.unwrap(), 2);

        let mut bob = chat.open_session("u2", "u1").await.unwrap();
        assert_eq!(bob.key(), alice.key());
        assert_eq!(chat.unread().unread_for("u1_u2", "u2").await.unwrap(), 0);

        let messages = bob.next_messages().await.unwrap().unwrap();
        let texts: Vec<_> = messages.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        bob.close();
        alice.close();
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_any_write() {
        let (chat, _dir) = chat_service();
        let session = chat.open_session("u1", "u2").await.unwrap();

        assert!(matches!(
            session.send_text("   ").await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            session.send_attachment(Some("a.png"), Vec::new(), None).await,
            Err(ChatError::Validation(_))
        ));

        let conv = chat.store().get("u1_u2").await.unwrap().unwrap();
        assert!(conv.last_message.is_none());
        assert_eq!(conv.unread_for("u2"), 0);
        assert!(chat.messages().messages("u1_u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_with_self_is_rejected() {
        let (chat, _dir) = chat_service();
        assert!(matches!(
            chat.open_session("u1", "u1").await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_send_attachment_uploads_then_sends() {
        let (chat, dir) = chat_service();
        let mut session = chat.open_session("u1", "u2").await.unwrap();
        session.next_messages().await.unwrap().unwrap();

        let message = session
            .send_attachment(Some("cat.PNG"), vec![0x89, 0x50], Some("look".into()))
            .await
            .unwrap();
        let url = message.attachment.clone().unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".png"));
        assert_eq!(message.text.as_deref(), Some("look"));

        let chat_dir = dir.path().join("chat").join("u1_u2");
        assert_eq!(std::fs::read_dir(chat_dir).unwrap().count(), 1);

        let snapshot = session.next_messages().await.unwrap().unwrap();
        assert_eq!(snapshot.last(), Some(&message));

        let conv = chat.store().get("u1_u2").await.unwrap().unwrap();
        assert_eq!(conv.last_message.as_deref(), Some("look"));
    }

    #[tokio::test]
    async fn test_attachment_only_preview() {
        let (chat, _dir) = chat_service();
        let session = chat.open_session("u1", "u2").await.unwrap();
        session
            .send_attachment(None, vec![1], None)
            .await
            .unwrap();

        let conv = chat.store().get("u1_u2").await.unwrap().unwrap();
        assert_eq!(conv.last_message.as_deref(), Some("[image]"));
        assert_eq!(conv.unread_for("u2"), 1);
    }

    #[tokio::test]
    async fn test_back_to_back_images_keep_their_own_files() {
        let (chat, _dir) = chat_service();
        let session = chat.open_session("u1", "u2").await.unwrap();

        let first = session.send_attachment(Some("a.png"), vec![1], None).await.unwrap();
        let second = session.send_attachment(Some("a.png"), vec![2], None).await.unwrap();

        let first_url = first.attachment.unwrap();
        let second_url = second.attachment.unwrap();
        assert_ne!(first_url, second_url);
        let first_path = first_url.trim_start_matches("file://");
        assert_eq!(std::fs::read(first_path).unwrap(), vec![1]);
    }
}
