use std::sync::Arc;

use uuid::Uuid;

use crate::chat::list_view::ConversationListView;
use crate::chat::message_log::MessageLog;
use crate::chat::now_millis;
use crate::chat::session::ChatSession;
use crate::chat::store::ConversationStore;
use crate::chat::unread::{self, UnreadCounter};
use crate::common::{Message, OutgoingMessage, ParticipantRef};
use crate::error::{ChatError, Result};
use crate::storage::attachments::attachment_path;
use crate::storage::chat_db::{self, NewMessage};
use crate::storage::{AttachmentStorage, Change, DocumentService, ProfileDirectory};

/// Entry point wiring the chat components to one backend.
#[derive(Clone)]
pub struct ChatService {
    service: DocumentService,
    store: ConversationStore,
    log: MessageLog,
    unread: UnreadCounter,
    list_view: ConversationListView,
    profiles: Arc<dyn ProfileDirectory>,
    attachments: Arc<dyn AttachmentStorage>,
}

impl ChatService {
    pub fn new(
        service: DocumentService,
        profiles: Arc<dyn ProfileDirectory>,
        attachments: Arc<dyn AttachmentStorage>,
        subscription_buffer: usize,
    ) -> Self {
        let store = ConversationStore::new(service.clone(), subscription_buffer);
        Self {
            log: MessageLog::new(service.clone(), subscription_buffer),
            unread: UnreadCounter::new(service.clone()),
            list_view: ConversationListView::new(
                store.clone(),
                Arc::clone(&profiles),
                subscription_buffer,
            ),
            store,
            profiles,
            attachments,
            service,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    pub fn unread(&self) -> &UnreadCounter {
        &self.unread
    }

    pub fn list_view(&self) -> &ConversationListView {
        &self.list_view
    }

    /// Display metadata for a single participant, falling back to the id.
    pub async fn participant(&self, user_id: &str) -> Result<ParticipantRef> {
        let found = self.profiles.lookup(&[user_id.to_string()]).await?;
        Ok(ParticipantRef::from_profile(user_id, found.get(user_id)))
    }

    /// Append the message and update preview/counter in one transaction.
    pub async fn send_message(
        &self,
        key: &str,
        sender_id: &str,
        recipient_id: &str,
        message: &OutgoingMessage,
    ) -> Result<Message> {
        let key = key.to_string();
        let sender = sender_id.to_string();
        let recipient = recipient_id.to_string();
        let text = message.text_body().map(str::to_string);
        let attachment = message.attachment().map(str::to_string);
        let preview = message.preview();

        let (record, doc) = self
            .service
            .run(move |db| {
                db.transaction(|tx| {
                    let mut doc = chat_db::load_conversation(tx, &key)?
                        .ok_or_else(|| ChatError::NotFound(key.clone()))?;
                    let now = now_millis();
                    unread::record_outgoing(&mut doc, &sender, &recipient, &preview, now)?;

                    let id = Uuid::new_v4().to_string();
                    let record = chat_db::insert_message(
                        tx,
                        NewMessage {
                            id: &id,
                            conversation_key: &key,
                            sender: &sender,
                            text: text.as_deref(),
                            attachment_url: attachment.as_deref(),
                        },
                        now,
                    )?;
                    doc.last_message_at = Some(record.created_at);
                    chat_db::store_conversation(tx, &doc)?;
                    Ok((record, doc))
                })
            })
            .await?;

        log::debug!("{sender_id} -> {recipient_id} in {}", doc.key);
        self.service.publish(Change::MessagesChanged {
            key: doc.key.clone(),
        });
        self.store.publish_conversation(&doc);
        Message::try_from(record)
    }

    /// Upload attachment bytes for `key` and return the retrieval URL.
    pub async fn upload_attachment(
        &self,
        key: &str,
        file_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<String> {
        if bytes.is_empty() {
            return Err(ChatError::Validation("attachment is empty".to_string()));
        }
        let path = attachment_path(key, now_millis(), file_name);
        self.attachments.upload(&path, bytes).await
    }

    /// Open the per-conversation view between `viewer_id` and `counterpart_id`.
    pub async fn open_session(&self, viewer_id: &str, counterpart_id: &str) -> Result<ChatSession> {
        ChatSession::open(self.clone(), viewer_id, counterpart_id).await
    }
}
