use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Maximum characters kept in a conversation's last-message preview.
pub const PREVIEW_MAX_CHARS: usize = 100;
pub const ATTACHMENT_PREVIEW: &str = "[image]";

/// Cuộc hội thoại giữa đúng hai người, đã qua kiểm tra.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub key: String,
    /// Sorted pair of participant ids.
    pub participants: [String; 2],
    pub created_at: i64,
    pub updated_at: i64,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread: HashMap<String, u32>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The other party, if `viewer` is a participant.
    pub fn counterpart_of(&self, viewer: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == viewer => Some(b.as_str()),
            [a, b] if b == viewer => Some(a.as_str()),
            _ => None,
        }
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread.get(user_id).copied().unwrap_or(0)
    }

    pub fn last_activity(&self) -> i64 {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

/// Tin nhắn trong một cuộc hội thoại. Không bao giờ bị sửa sau khi tạo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_key: String,
    pub sender: String,
    pub text: Option<String>,
    /// Retrieval URL returned by attachment storage.
    pub attachment: Option<String>,
    pub created_at: i64,
    /// Backend-assigned sequence, breaks ties between equal timestamps.
    pub seq: i64,
}

/// A message that passed client-side validation and may be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    text: Option<String>,
    attachment: Option<String>,
}

impl OutgoingMessage {
    /// Blank text counts as absent; at least one of text or attachment is required.
    pub fn new(text: Option<String>, attachment: Option<String>) -> Result<Self> {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let attachment = attachment.filter(|a| !a.trim().is_empty());

        if text.is_none() && attachment.is_none() {
            return Err(ChatError::Validation(
                "message needs text or an attachment".to_string(),
            ));
        }
        Ok(Self { text, attachment })
    }

    pub fn text(content: impl Into<String>) -> Result<Self> {
        Self::new(Some(content.into()), None)
    }

    pub fn text_body(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    pub fn preview(&self) -> String {
        preview_text(self.text.as_deref())
    }
}

fn preview_text(text: Option<&str>) -> String {
    match text {
        Some(text) if text.chars().count() > PREVIEW_MAX_CHARS => {
            let mut cut: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
            cut.push('…');
            cut
        }
        Some(text) => text.to_string(),
        None => ATTACHMENT_PREVIEW.to_string(),
    }
}

/// Display metadata owned by the profile service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ParticipantRef {
    pub fn from_profile(id: &str, profile: Option<&ParticipantProfile>) -> Self {
        match profile {
            Some(profile) => Self {
                id: id.to_string(),
                display_name: profile.display_name.clone(),
                avatar_url: profile.avatar_url.clone(),
            },
            None => Self {
                id: id.to_string(),
                display_name: id.to_string(),
                avatar_url: None,
            },
        }
    }
}

/// Một dòng trong danh sách hội thoại, sẵn sàng để render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub key: String,
    pub counterpart: ParticipantRef,
    pub last_message: Option<String>,
    pub last_activity: i64,
    pub unread: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation {
            key: "u1_u2".into(),
            participants: ["u1".into(), "u2".into()],
            created_at: 10,
            updated_at: 10,
            last_message: None,
            last_message_at: None,
            unread: HashMap::from([("u1".to_string(), 0), ("u2".to_string(), 3)]),
        }
    }

    #[test]
    fn test_outgoing_requires_text_or_attachment() {
        assert!(matches!(
            OutgoingMessage::new(None, None),
            Err(ChatError::Validation(_))
        ));
        assert!(OutgoingMessage::new(Some("   ".into()), None).is_err());
        assert!(OutgoingMessage::new(Some(String::new()), Some(" ".into())).is_err());

        let msg = OutgoingMessage::new(Some("  hi ".into()), None).unwrap();
        assert_eq!(msg.text_body(), Some("hi"));

        let img = OutgoingMessage::new(Some("".into()), Some("file:///a.png".into())).unwrap();
        assert_eq!(img.text_body(), None);
        assert_eq!(img.preview(), ATTACHMENT_PREVIEW);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "x".repeat(PREVIEW_MAX_CHARS + 20);
        let preview = OutgoingMessage::text(long).unwrap().preview();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_counterpart_and_unread() {
        let conv = conversation();
        assert_eq!(conv.counterpart_of("u1"), Some("u2"));
        assert_eq!(conv.counterpart_of("u2"), Some("u1"));
        assert_eq!(conv.counterpart_of("u3"), None);
        assert_eq!(conv.unread_for("u2"), 3);
        assert_eq!(conv.unread_for("u3"), 0);
        assert_eq!(conv.last_activity(), 10);
    }

    #[test]
    fn test_participant_ref_falls_back_to_id() {
        let missing = ParticipantRef::from_profile("u9", None);
        assert_eq!(missing.display_name, "u9");
        assert!(missing.avatar_url.is_none());
    }
}
