//! Per-participant unread counters.
//!
//! Counters live on the conversation document and are only changed through
//! the helpers below, which the store and the send path call inside their
//! own transactions. [`UnreadCounter`] adds reads and the reconciliation
//! job that recomputes counters from the message log.

use rusqlite::Connection;

use crate::chat::now_millis;
use crate::common::Conversation;
use crate::error::{ChatError, Result};
use crate::storage::chat_db::{self, count_unseen};
use crate::storage::models::ConversationDocument;
use crate::storage::{Change, DocumentService};

/// Update preview and bump the recipient's counter by one.
/// The sender's counter is left untouched.
pub(crate) fn record_outgoing(
    doc: &mut ConversationDocument,
    sender: &str,
    recipient: &str,
    preview: &str,
    now: i64,
) -> Result<()> {
    if sender == recipient || !doc.has_participant(sender) || !doc.has_participant(recipient) {
        return Err(ChatError::Validation(format!(
            "{sender} -> {recipient} is not a pair in conversation {}",
            doc.key
        )));
    }

    let count = doc.unread.entry(recipient.to_string()).or_insert(0);
    *count = (*count).max(0).saturating_add(1);

    doc.last_message = Some(preview.to_string());
    doc.last_message_at = Some(now);
    doc.updated_at = now;
    Ok(())
}

/// Zero the viewer's counter and move their read cursor to `cursor`.
pub(crate) fn reset(doc: &mut ConversationDocument, viewer: &str, cursor: i64, now: i64) -> Result<()> {
    if !doc.has_participant(viewer) {
        return Err(ChatError::Validation(format!(
            "{viewer} is not a participant of {}",
            doc.key
        )));
    }

    doc.unread.insert(viewer.to_string(), 0);
    let seen = doc.read_cursor.entry(viewer.to_string()).or_insert(0);
    *seen = (*seen).max(cursor);
    doc.updated_at = now;
    Ok(())
}

/// Recompute every participant's counter from the message log.
/// Returns true when any counter changed.
pub(crate) fn recount(conn: &Connection, doc: &mut ConversationDocument) -> Result<bool> {
    if doc.participants.len() != 2 {
        return Err(ChatError::Malformed(format!(
            "conversation {} has {} participants",
            doc.key,
            doc.participants.len()
        )));
    }

    let mut changed = false;
    for participant in doc.participants.clone() {
        let cursor = doc.read_cursor.get(&participant).copied().unwrap_or(0);
        let expected = count_unseen(conn, &doc.key, &participant, cursor)?;
        let current = doc.unread.insert(participant, expected);
        changed |= current != Some(expected);
    }
    Ok(changed)
}

/// Reads and repairs unread counters.
#[derive(Clone)]
pub struct UnreadCounter {
    service: DocumentService,
}

impl UnreadCounter {
    pub fn new(service: DocumentService) -> Self {
        Self { service }
    }

    pub async fn unread_for(&self, key: &str, user_id: &str) -> Result<u32> {
        let key = key.to_string();
        let doc = self
            .service
            .run(move |db| db.get_conversation(&key))
            .await?;
        match doc {
            Some(doc) => Ok(Conversation::try_from(doc)?.unread_for(user_id)),
            None => Ok(0),
        }
    }

    /// Recompute one conversation's counters.
    pub async fn reconcile(&self, key: &str) -> Result<Conversation> {
        let (doc, _) = self.recount_and_store(key).await?;
        Conversation::try_from(doc)
    }

    /// Recompute every conversation. Malformed conversations are skipped.
    /// Returns how many conversations needed a correction.
    pub async fn reconcile_all(&self) -> Result<usize> {
        let keys = self.service.run(|db| db.conversation_keys()).await?;
        let mut corrected = 0;

        for key in keys {
            match self.recount_and_store(&key).await {
                Ok((_, true)) => corrected += 1,
                Ok((_, false)) => {}
                Err(ChatError::Malformed(reason)) | Err(ChatError::NotFound(reason)) => {
                    log::warn!("Skipping unread reconciliation: {reason}");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(corrected)
    }

    async fn recount_and_store(&self, key: &str) -> Result<(ConversationDocument, bool)> {
        let key = key.to_string();
        let (doc, changed) = self
            .service
            .run(move |db| {
                db.transaction(|tx| {
                    let mut doc = chat_db::load_conversation(tx, &key)?
                        .ok_or_else(|| ChatError::NotFound(key.clone()))?;
                    let changed = recount(tx, &mut doc)?;
                    if changed {
                        doc.updated_at = now_millis();
                        chat_db::store_conversation(tx, &doc)?;
                    }
                    Ok((doc, changed))
                })
            })
            .await?;

        if changed {
            log::info!("Reconciled unread counters for {}", doc.key);
            self.service.publish(Change::ConversationChanged {
                key: doc.key.clone(),
                participants: doc.participants.clone(),
            });
        }
        Ok((doc, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::chat_db::{NewMessage, insert_message};

    fn doc() -> ConversationDocument {
        ConversationDocument::new("u1_u2", "u1", "u2", 1)
    }

    #[test]
    fn test_record_outgoing_increments_only_recipient() {
        let mut doc = doc();
        record_outgoing(&mut doc, "u1", "u2", "hi", 10).unwrap();
        record_outgoing(&mut doc, "u1", "u2", "again", 11).unwrap();

        assert_eq!(doc.unread["u2"], 2);
        assert_eq!(doc.unread["u1"], 0);
        assert_eq!(doc.last_message.as_deref(), Some("again"));
        assert_eq!(doc.last_message_at, Some(11));
    }

    #[test]
    fn test_record_outgoing_rejects_strangers() {
        let mut doc = doc();
        assert!(record_outgoing(&mut doc, "u3", "u2", "x", 1).is_err());
        assert!(record_outgoing(&mut doc, "u1", "u1", "x", 1).is_err());
        assert_eq!(doc.unread["u2"], 0);
        assert!(doc.last_message.is_none());
    }

    #[test]
    fn test_reset_zeroes_and_never_moves_cursor_back() {
        let mut doc = doc();
        doc.unread.insert("u2".into(), 7);
        reset(&mut doc, "u2", 12, 5).unwrap();
        assert_eq!(doc.unread["u2"], 0);
        assert_eq!(doc.read_cursor["u2"], 12);

        reset(&mut doc, "u2", 3, 6).unwrap();
        assert_eq!(doc.read_cursor["u2"], 12);
        assert!(reset(&mut doc, "u9", 1, 1).is_err());
    }

    #[test]
    fn test_recount_from_message_log() {
        let db = crate::storage::ChatDatabase::in_memory().unwrap();
        let conn = db.connection();
        let mut doc = doc();
        for (i, sender) in ["u1", "u1", "u2"].iter().enumerate() {
            let id = format!("m{i}");
            insert_message(
                conn,
                NewMessage {
                    id: &id,
                    conversation_key: "u1_u2",
                    sender,
                    text: Some("x"),
                    attachment_url: None,
                },
                i as i64,
            )
            .unwrap();
        }

        assert!(recount(conn, &mut doc).unwrap());
        assert_eq!(doc.unread["u2"], 2);
        assert_eq!(doc.unread["u1"], 1);
        assert!(!recount(conn, &mut doc).unwrap());
    }

    #[test]
    fn test_recount_rejects_wrong_shape() {
        let db = crate::storage::ChatDatabase::in_memory().unwrap();
        let mut doc = doc();
        doc.participants.push("u3".into());
        assert!(matches!(
            recount(db.connection(), &mut doc),
            Err(ChatError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drifted_counter() {
        let service = DocumentService::in_memory().unwrap();
        let counter = UnreadCounter::new(service.clone());
        service
            .run(|db| {
                let mut doc = ConversationDocument::new("u1_u2", "u1", "u2", 1);
                insert_message(
                    db.connection(),
                    NewMessage {
                        id: "m1",
                        conversation_key: "u1_u2",
                        sender: "u1",
                        text: Some("lost update"),
                        attachment_url: None,
                    },
                    2,
                )?;
                // Counter never bumped: the two-step write was interrupted
                doc.unread.insert("u2".into(), 0);
                db.put_conversation(&doc)
            })
            .await
            .unwrap();

        assert_eq!(counter.unread_for("u1_u2", "u2").await.unwrap(), 0);
        assert_eq!(counter.reconcile_all().await.unwrap(), 1);
        assert_eq!(counter.unread_for("u1_u2", "u2").await.unwrap(), 1);
        assert_eq!(counter.reconcile_all().await.unwrap(), 0);
    }
}
