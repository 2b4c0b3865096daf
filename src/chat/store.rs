use crate::chat::now_millis;
use crate::chat::resolver::conversation_key;
use crate::chat::subscription::{Subscription, live_query};
use crate::chat::unread;
use crate::common::Conversation;
use crate::error::{ChatError, Result};
use crate::storage::chat_db::{self, latest_seq};
use crate::storage::models::ConversationDocument;
use crate::storage::{Change, DocumentService};

/// Conversation metadata: participants, preview and unread counters.
#[derive(Clone)]
pub struct ConversationStore {
    service: DocumentService,
    buffer: usize,
}

impl ConversationStore {
    pub fn new(service: DocumentService, buffer: usize) -> Self {
        Self { service, buffer }
    }

    /// Read the conversation, creating it with zeroed counters if absent.
    ///
    /// The key is the document identity, so concurrent calls for the same
    /// pair converge on one conversation.
    pub async fn ensure_conversation(
        &self,
        key: &str,
        participant_a: &str,
        participant_b: &str,
    ) -> Result<Conversation> {
        validate_pair(participant_a, participant_b)?;
        let expected = conversation_key(participant_a, participant_b);
        if key != expected {
            return Err(ChatError::Validation(format!(
                "key `{key}` does not belong to {participant_a} and {participant_b}"
            )));
        }

        let doc = ConversationDocument::new(key, participant_a, participant_b, now_millis());
        let pair = doc.participants.clone();
        let (stored, created) = self
            .service
            .run(move |db| db.insert_conversation_if_absent(&doc))
            .await?;

        // Ids containing the separator can join to an existing pair's key
        let mut stored_pair = stored.participants.clone();
        stored_pair.sort();
        if stored_pair != pair {
            return Err(ChatError::Validation(format!(
                "key `{key}` already belongs to {:?}",
                stored.participants
            )));
        }

        if created {
            log::info!("Created conversation {}", stored.key);
            self.publish_conversation(&stored);
        }
        Conversation::try_from(stored)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Conversation>> {
        let key = key.to_string();
        let doc = self.service.run(move |db| db.get_conversation(&key)).await?;
        doc.map(Conversation::try_from).transpose()
    }

    /// Zero `viewer_id`'s unread counter.
    pub async fn mark_read(&self, key: &str, viewer_id: &str) -> Result<()> {
        let key = key.to_string();
        let viewer = viewer_id.to_string();
        let doc = self
            .service
            .run(move |db| {
                db.transaction(|tx| {
                    let mut doc = chat_db::load_conversation(tx, &key)?
                        .ok_or_else(|| ChatError::NotFound(key.clone()))?;
                    let cursor = latest_seq(tx, &key)?;
                    unread::reset(&mut doc, &viewer, cursor, now_millis())?;
                    chat_db::store_conversation(tx, &doc)?;
                    Ok(doc)
                })
            })
            .await?;

        log::debug!("{viewer_id} read {}", doc.key);
        self.publish_conversation(&doc);
        Ok(())
    }

    /// Set the preview and bump the recipient's counter.
    ///
    /// Standalone this is the second half of a two-step send: a failure
    /// after the message append leaves the counter behind until the next
    /// reconciliation. `ChatService::send_message` does both atomically.
    pub async fn record_outgoing_message(
        &self,
        key: &str,
        sender_id: &str,
        recipient_id: &str,
        preview_text: &str,
    ) -> Result<()> {
        let key = key.to_string();
        let sender = sender_id.to_string();
        let recipient = recipient_id.to_string();
        let preview = preview_text.to_string();
        let doc = self
            .service
            .run(move |db| {
                db.transaction(|tx| {
                    let mut doc = chat_db::load_conversation(tx, &key)?
                        .ok_or_else(|| ChatError::NotFound(key.clone()))?;
                    unread::record_outgoing(&mut doc, &sender, &recipient, &preview, now_millis())?;
                    chat_db::store_conversation(tx, &doc)?;
                    Ok(doc)
                })
            })
            .await?;

        self.publish_conversation(&doc);
        Ok(())
    }

    /// One-shot read of the raw documents naming `user_id` as participant,
    /// most recently active first.
    pub async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationDocument>> {
        let user = user_id.to_string();
        self.service
            .run(move |db| db.conversations_for_user(&user))
            .await
    }

    /// Live list of the raw documents naming `user_id` as participant.
    /// Shape validation is left to the consumer.
    pub fn list_conversations_for_user(&self, user_id: &str) -> Subscription<Vec<ConversationDocument>> {
        let store = self.clone();
        let user = user_id.to_string();
        let watched = user.clone();

        live_query(
            &self.service,
            self.buffer,
            format!("conversations of {user_id}"),
            move |change| match change {
                Change::ConversationChanged { participants, .. } => {
                    participants.iter().any(|p| p == &watched)
                }
                Change::MessagesChanged { .. } => false,
            },
            move || {
                let store = store.clone();
                let user = user.clone();
                async move { store.conversations_for_user(&user).await }
            },
        )
    }

    pub(crate) fn publish_conversation(&self, doc: &ConversationDocument) {
        self.service.publish(Change::ConversationChanged {
            key: doc.key.clone(),
            participants: doc.participants.clone(),
        });
    }
}

pub(crate) fn validate_pair(a: &str, b: &str) -> Result<()> {
    if a.trim().is_empty() || b.trim().is_empty() {
        return Err(ChatError::Validation("participant id is empty".to_string()));
    }
    if a == b {
        return Err(ChatError::Validation(format!(
            "{a} cannot start a conversation with themselves"
        )));
    }
    Ok(())
}
