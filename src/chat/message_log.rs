use uuid::Uuid;

use crate::chat::now_millis;
use crate::chat::subscription::{Subscription, live_query};
use crate::common::{Message, OutgoingMessage};
use crate::error::{ChatError, Result};
use crate::storage::chat_db::{self, NewMessage};
use crate::storage::models::MessageRecord;
use crate::storage::{Change, DocumentService};

/// Append-only, time-ordered messages of each conversation.
#[derive(Clone)]
pub struct MessageLog {
    service: DocumentService,
    buffer: usize,
}

impl MessageLog {
    pub fn new(service: DocumentService, buffer: usize) -> Self {
        Self { service, buffer }
    }

    /// Append a message with a backend-assigned timestamp.
    ///
    /// Does not touch unread counters; see
    /// [`ConversationStore::record_outgoing_message`](crate::chat::ConversationStore::record_outgoing_message).
    pub async fn append(&self, key: &str, sender_id: &str, message: &OutgoingMessage) -> Result<Message> {
        let key = key.to_string();
        let sender = sender_id.to_string();
        let text = message.text_body().map(str::to_string);
        let attachment = message.attachment().map(str::to_string);

        let record = self
            .service
            .run(move |db| {
                db.transaction(|tx| {
                    let doc = chat_db::load_conversation(tx, &key)?
                        .ok_or_else(|| ChatError::NotFound(key.clone()))?;
                    if !doc.has_participant(&sender) {
                        return Err(ChatError::Validation(format!(
                            "{sender} is not a participant of {key}"
                        )));
                    }

                    let id = Uuid::new_v4().to_string();
                    chat_db::insert_message(
                        tx,
                        NewMessage {
                            id: &id,
                            conversation_key: &key,
                            sender: &sender,
                            text: text.as_deref(),
                            attachment_url: attachment.as_deref(),
                        },
                        now_millis(),
                    )
                })
            })
            .await?;

        self.service.publish(Change::MessagesChanged {
            key: record.conversation_key.clone(),
        });
        Message::try_from(record)
    }

    /// Current messages, oldest first. Malformed entries are skipped.
    pub async fn messages(&self, key: &str) -> Result<Vec<Message>> {
        let key = key.to_string();
        let records = self.service.run(move |db| db.messages_for(&key)).await?;
        Ok(valid_messages(records))
    }

    /// Live, ascending view of the conversation's messages. Each item is the
    /// whole list.
    pub fn subscribe(&self, key: &str) -> Subscription<Vec<Message>> {
        let log = self.clone();
        let key = key.to_string();
        let watched = key.clone();

        live_query(
            &self.service,
            self.buffer,
            format!("messages of {key}"),
            move |change| matches!(change, Change::MessagesChanged { key } if key == &watched),
            move || {
                let log = log.clone();
                let key = key.clone();
                async move { log.messages(&key).await }
            },
        )
    }
}

pub(crate) fn valid_messages(records: Vec<MessageRecord>) -> Vec<Message> {
    records
        .into_iter()
        .filter_map(|record| match Message::try_from(record) {
            Ok(message) => Some(message),
            Err(err) => {
                log::warn!("Skipping message: {err}");
                None
            }
        })
        .collect()
}
