use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::de::DeserializeOwned;
use std::path::Path;

use super::connection;
use super::models::{ConversationDocument, MessageRecord, ProfileRecord};
use crate::error::{ChatError, Result};

const CONVERSATION_COLUMNS: &str =
    "key, participants, unread, read_cursor, last_message, last_message_at, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "seq, id, conversation_key, sender, text, attachment_url, created_at";

/// Message about to be written; `seq` and the final `created_at` are
/// assigned by the database.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_key: &'a str,
    pub sender: &'a str,
    pub text: Option<&'a str>,
    pub attachment_url: Option<&'a str>,
}

/// Database for the chat collections (conversations, messages, profiles)
pub struct ChatDatabase {
    conn: Connection,
}

impl ChatDatabase {
    /// Initialize chat database at custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let chat_db = Self {
            conn: connection::open_file(path)?,
        };
        chat_db.init_schema()?;
        Ok(chat_db)
    }

    pub fn in_memory() -> Result<Self> {
        let chat_db = Self {
            conn: connection::open_memory()?,
        };
        chat_db.init_schema()?;
        Ok(chat_db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = &self.conn;

        // Conversations: một document cho mỗi cặp, key là khóa chính
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                key TEXT PRIMARY KEY,
                participants TEXT NOT NULL DEFAULT '[]',
                unread TEXT NOT NULL DEFAULT '{}',
                read_cursor TEXT NOT NULL DEFAULT '{}',
                last_message TEXT,
                last_message_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Messages: append-only
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_key TEXT NOT NULL,
                sender TEXT NOT NULL,
                text TEXT,
                attachment_url TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_url TEXT,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Indexes
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_key, created_at, seq)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_conversations_activity
             ON conversations(last_message_at)",
            [],
        )?;

        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `op` inside one transaction; nothing is written if it fails.
    pub fn transaction<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ========== Conversations ==========

    /// Insert `doc` unless a conversation with the same key exists, then
    /// return the stored document and whether it was created.
    pub fn insert_conversation_if_absent(
        &mut self,
        doc: &ConversationDocument,
    ) -> Result<(ConversationDocument, bool)> {
        self.transaction(|tx| {
            let created = insert_conversation_if_absent(tx, doc)?;
            let stored = load_conversation(tx, &doc.key)?
                .ok_or_else(|| ChatError::NotFound(doc.key.clone()))?;
            Ok((stored, created))
        })
    }

    pub fn get_conversation(&self, key: &str) -> Result<Option<ConversationDocument>> {
        load_conversation(self.connection(), key)
    }

    /// Raw document write (replace).
    pub fn put_conversation(&self, doc: &ConversationDocument) -> Result<()> {
        store_conversation(self.connection(), doc)
    }

    /// Conversations listing `user_id` among participants, most recent first.
    /// Rows whose participants column is not valid JSON are left out.
    pub fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationDocument>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations c
             WHERE CASE WHEN json_valid(c.participants)
                   THEN EXISTS (SELECT 1 FROM json_each(c.participants) WHERE value = ?1)
                   ELSE 0 END
             ORDER BY COALESCE(c.last_message_at, c.created_at) DESC"
        ))?;

        let docs = stmt
            .query_map(params![user_id], conversation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    pub fn conversation_keys(&self) -> Result<Vec<String>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT key FROM conversations ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    // ========== Messages ==========

    /// Messages of one conversation, oldest first.
    pub fn messages_for(&self, conversation_key: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE conversation_key = ?1
             ORDER BY created_at ASC, seq ASC"
        ))?;

        let messages = stmt
            .query_map(params![conversation_key], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    pub fn message_count(&self, conversation_key: &str) -> Result<usize> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_key = ?1",
            params![conversation_key],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========== Profiles ==========

    pub fn upsert_profile(&self, profile: &ProfileRecord) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO profiles (user_id, display_name, avatar_url, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.user_id,
                profile.display_name,
                profile.avatar_url,
                profile.updated_at
            ],
        )?;
        Ok(())
    }

    /// All profiles for `user_ids` in a single query.
    pub fn profiles_for(&self, user_ids: &[String]) -> Result<Vec<ProfileRecord>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = serde_json::to_string(user_ids)?;
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT user_id, display_name, avatar_url, updated_at
             FROM profiles
             WHERE user_id IN (SELECT value FROM json_each(?1))",
        )?;

        let profiles = stmt
            .query_map(params![ids], |row| {
                Ok(ProfileRecord {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    avatar_url: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(profiles)
    }
}

// ========== Helpers usable inside a transaction ==========

pub fn load_conversation(conn: &Connection, key: &str) -> Result<Option<ConversationDocument>> {
    let doc = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE key = ?1"),
            params![key],
            conversation_from_row,
        )
        .optional()?;
    Ok(doc)
}

pub fn store_conversation(conn: &Connection, doc: &ConversationDocument) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO conversations
            (key, participants, unread, read_cursor, last_message, last_message_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            doc.key,
            serde_json::to_string(&doc.participants)?,
            serde_json::to_string(&doc.unread)?,
            serde_json::to_string(&doc.read_cursor)?,
            doc.last_message,
            doc.last_message_at,
            doc.created_at,
            doc.updated_at
        ],
    )?;
    Ok(())
}

/// Conditional create keyed by the conversation key. Returns true if inserted.
pub fn insert_conversation_if_absent(conn: &Connection, doc: &ConversationDocument) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO conversations
            (key, participants, unread, read_cursor, last_message, last_message_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            doc.key,
            serde_json::to_string(&doc.participants)?,
            serde_json::to_string(&doc.unread)?,
            serde_json::to_string(&doc.read_cursor)?,
            doc.last_message,
            doc.last_message_at,
            doc.created_at,
            doc.updated_at
        ],
    )?;
    Ok(changed == 1)
}

/// Append a message. `created_at` never goes below the conversation's
/// latest message so that timestamps stay non-decreasing.
pub fn insert_message(conn: &Connection, message: NewMessage<'_>, now: i64) -> Result<MessageRecord> {
    let latest: Option<i64> = conn.query_row(
        "SELECT MAX(created_at) FROM messages WHERE conversation_key = ?1",
        params![message.conversation_key],
        |row| row.get(0),
    )?;
    let created_at = latest.map_or(now, |latest| latest.max(now));

    conn.execute(
        "INSERT INTO messages (id, conversation_key, sender, text, attachment_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.id,
            message.conversation_key,
            message.sender,
            message.text,
            message.attachment_url,
            created_at
        ],
    )?;

    Ok(MessageRecord {
        seq: conn.last_insert_rowid(),
        id: message.id.to_string(),
        conversation_key: message.conversation_key.to_string(),
        sender: message.sender.to_string(),
        text: message.text.map(str::to_string),
        attachment_url: message.attachment_url.map(str::to_string),
        created_at,
    })
}

/// Highest message sequence in the conversation, 0 when empty.
pub fn latest_seq(conn: &Connection, conversation_key: &str) -> Result<i64> {
    let seq: Option<i64> = conn.query_row(
        "SELECT MAX(seq) FROM messages WHERE conversation_key = ?1",
        params![conversation_key],
        |row| row.get(0),
    )?;
    Ok(seq.unwrap_or(0))
}

/// Messages not sent by `reader` with a sequence past `cursor`.
pub fn count_unseen(conn: &Connection, conversation_key: &str, reader: &str, cursor: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE conversation_key = ?1 AND sender != ?2 AND seq > ?3",
        params![conversation_key, reader, cursor],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationDocument> {
    let key: String = row.get(0)?;
    let participants: String = row.get(1)?;
    let unread: String = row.get(2)?;
    let read_cursor: String = row.get(3)?;

    Ok(ConversationDocument {
        participants: decode_or_default(&key, "participants", &participants),
        unread: decode_or_default(&key, "unread", &unread),
        read_cursor: decode_or_default(&key, "read_cursor", &read_cursor),
        last_message: row.get(4)?,
        last_message_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        key,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        seq: row.get(0)?,
        id: row.get(1)?,
        conversation_key: row.get(2)?,
        sender: row.get(3)?,
        text: row.get(4)?,
        attachment_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn decode_or_default<T: DeserializeOwned + Default>(key: &str, column: &str, raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        log::warn!("Conversation {key}: unreadable `{column}` ({err}); treating as empty");
        T::default()
    })
}
