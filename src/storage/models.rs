use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::common::{Conversation, Message};
use crate::error::ChatError;

/// Conversation as stored in the `conversations` collection.
///
/// Loosely typed on purpose: other writers share this backend, so shape
/// checks happen when converting into [`Conversation`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub key: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub unread: HashMap<String, i64>,
    /// Participant -> highest message `seq` seen when they last read.
    #[serde(default)]
    pub read_cursor: HashMap<String, i64>,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConversationDocument {
    /// Fresh document with zeroed counters for both participants.
    pub fn new(key: &str, participant_a: &str, participant_b: &str, now: i64) -> Self {
        let mut participants = vec![participant_a.to_string(), participant_b.to_string()];
        participants.sort();

        let unread = participants.iter().map(|p| (p.clone(), 0)).collect();
        let read_cursor = participants.iter().map(|p| (p.clone(), 0)).collect();

        Self {
            key: key.to_string(),
            participants,
            unread,
            read_cursor,
            last_message: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

impl TryFrom<ConversationDocument> for Conversation {
    type Error = ChatError;

    fn try_from(doc: ConversationDocument) -> Result<Self, Self::Error> {
        let mut participants = doc.participants;
        if participants.len() != 2 {
            return Err(ChatError::Malformed(format!(
                "conversation {} has {} participants",
                doc.key,
                participants.len()
            )));
        }
        if participants.iter().any(|p| p.trim().is_empty()) || participants[0] == participants[1] {
            return Err(ChatError::Malformed(format!(
                "conversation {} has invalid participant ids",
                doc.key
            )));
        }
        participants.sort();

        let unread = participants
            .iter()
            .map(|p| {
                let count = doc.unread.get(p).copied().unwrap_or(0).max(0);
                (p.clone(), u32::try_from(count).unwrap_or(u32::MAX))
            })
            .collect();

        let [first, second]: [String; 2] = participants
            .try_into()
            .map_err(|_| ChatError::Malformed(format!("conversation {}", doc.key)))?;

        Ok(Conversation {
            key: doc.key,
            participants: [first, second],
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            last_message: doc.last_message,
            last_message_at: doc.last_message_at,
            unread,
        })
    }
}

/// Row of the `messages` collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub seq: i64,
    pub id: String,
    pub conversation_key: String,
    pub sender: String,
    pub text: Option<String>,
    pub attachment_url: Option<String>,
    pub created_at: i64,
}

impl TryFrom<MessageRecord> for Message {
    type Error = ChatError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let text = record.text.filter(|t| !t.trim().is_empty());
        let attachment = record.attachment_url.filter(|a| !a.trim().is_empty());
        if text.is_none() && attachment.is_none() {
            return Err(ChatError::Malformed(format!(
                "message {} has neither text nor attachment",
                record.id
            )));
        }
        if record.sender.trim().is_empty() {
            return Err(ChatError::Malformed(format!(
                "message {} has no sender",
                record.id
            )));
        }

        Ok(Message {
            id: record.id,
            conversation_key: record.conversation_key,
            sender: record.sender,
            text,
            attachment,
            created_at: record.created_at,
            seq: record.seq,
        })
    }
}

/// Profile row (owned by the profile service, read-only for chat).
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: Option<&str>, attachment: Option<&str>) -> MessageRecord {
        MessageRecord {
            seq: 1,
            id: "m1".into(),
            conversation_key: "u1_u2".into(),
            sender: "u1".into(),
            text: text.map(str::to_string),
            attachment_url: attachment.map(str::to_string),
            created_at: 5,
        }
    }

    #[test]
    fn test_new_document_sorts_participants_and_zeroes_counters() {
        let doc = ConversationDocument::new("a_b", "b", "a", 42);
        assert_eq!(doc.participants, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(doc.unread.get("a"), Some(&0));
        assert_eq!(doc.unread.get("b"), Some(&0));
        assert_eq!(doc.created_at, 42);
    }

    #[test]
    fn test_conversation_requires_two_distinct_participants() {
        let mut doc = ConversationDocument::new("a_b", "a", "b", 1);
        assert!(Conversation::try_from(doc.clone()).is_ok());

        doc.participants.push("c".into());
        assert!(matches!(
            Conversation::try_from(doc.clone()),
            Err(ChatError::Malformed(_))
        ));

        doc.participants = vec!["a".into(), "a".into()];
        assert!(Conversation::try_from(doc.clone()).is_err());

        doc.participants = vec!["a".into(), " ".into()];
        assert!(Conversation::try_from(doc).is_err());
    }

    #[test]
    fn test_negative_unread_is_clamped() {
        let mut doc = ConversationDocument::new("a_b", "a", "b", 1);
        doc.unread.insert("a".into(), -4);
        let conv = Conversation::try_from(doc).unwrap();
        assert_eq!(conv.unread_for("a"), 0);
    }

    #[test]
    fn test_message_record_validation() {
        assert!(Message::try_from(record(Some("hi"), None)).is_ok());
        assert!(Message::try_from(record(None, Some("file:///x.png"))).is_ok());
        assert!(matches!(
            Message::try_from(record(None, None)),
            Err(ChatError::Malformed(_))
        ));
        assert!(Message::try_from(record(Some("  "), None)).is_err());
    }
}
