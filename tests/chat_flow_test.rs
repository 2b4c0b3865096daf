use std::sync::Arc;

use event_chat::chat::{ChatService, conversation_key};
use event_chat::common::OutgoingMessage;
use event_chat::storage::{DocumentService, LocalAttachmentStore, SqliteProfileDirectory};
use event_chat::ChatError;
use tempfile::TempDir;

fn setup() -> (ChatService, SqliteProfileDirectory, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = DocumentService::in_memory().expect("in-memory backend");
    let profiles = SqliteProfileDirectory::new(service.clone());
    let chat = ChatService::new(
        service,
        Arc::new(profiles.clone()),
        Arc::new(LocalAttachmentStore::new(dir.path())),
        16,
    );
    (chat, profiles, dir)
}

#[tokio::test]
async fn test_two_party_conversation_walkthrough() {
    let (chat, profiles, _dir) = setup();
    profiles.upsert("u1", "Organizer", None).await.unwrap();
    profiles
        .upsert("u2", "Guest", Some("https://avatars/u2.png"))
        .await
        .unwrap();

    let key = conversation_key("u1", "u2");
    assert_eq!(key, "u1_u2");
    assert_eq!(conversation_key("u2", "u1"), key);

    // u1 sends "Hello": conversation is created and u2 has one unread
    let u1 = chat.open_session("u1", "u2").await.unwrap();
    u1.send_text("Hello").await.unwrap();
    let conv = chat.store().get(&key).await.unwrap().unwrap();
    assert_eq!(conv.last_message.as_deref(), Some("Hello"));
    assert_eq!(conv.unread_for("u2"), 1);
    assert_eq!(conv.unread_for("u1"), 0);

    let u2_list = chat.list_view().snapshot("u2").await.unwrap();
    assert_eq!(u2_list.len(), 1);
    assert_eq!(u2_list[0].counterpart.display_name, "Organizer");
    assert_eq!(u2_list[0].unread, 1);

    // u2 opens: counter reset, one message from u1
    let mut u2 = chat.open_session("u2", "u1").await.unwrap();
    assert_eq!(chat.unread().unread_for(&key, "u2").await.unwrap(), 0);
    let messages = u2.next_messages().await.unwrap().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, "u1");
    assert_eq!(messages[0].text.as_deref(), Some("Hello"));

    // u2 replies: u1 has one unread, list has two ordered entries
    let reply = u2.send_text("Hi!").await.unwrap();
    assert_eq!(chat.unread().unread_for(&key, "u1").await.unwrap(), 1);
    assert_eq!(chat.unread().unread_for(&key, "u2").await.unwrap(), 0);

    let messages = u2.next_messages().await.unwrap().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], reply);
    assert!(messages[0].created_at <= messages[1].created_at);
    assert!(messages[0].seq < messages[1].seq);

    let u1_list = chat.list_view().snapshot("u1").await.unwrap();
    assert_eq!(u1_list[0].counterpart.display_name, "Guest");
    assert_eq!(u1_list[0].counterpart.avatar_url.as_deref(), Some("https://avatars/u2.png"));
    assert_eq!(u1_list[0].last_message.as_deref(), Some("Hi!"));
    assert_eq!(u1_list[0].unread, 1);

    u2.close();
    u1.close();
}

#[tokio::test]
async fn test_mark_read_resets_any_prior_count() {
    let (chat, _profiles, _dir) = setup();
    let key = conversation_key("a", "b");
    chat.store().ensure_conversation(&key, "a", "b").await.unwrap();

    for n in 0..5 {
        chat.store()
            .record_outgoing_message(&key, "a", "b", &format!("msg {n}"))
            .await
            .unwrap();
    }
    assert_eq!(chat.unread().unread_for(&key, "b").await.unwrap(), 5);

    chat.store().mark_read(&key, "b").await.unwrap();
    assert_eq!(chat.unread().unread_for(&key, "b").await.unwrap(), 0);
    assert_eq!(chat.unread().unread_for(&key, "a").await.unwrap(), 0);
}

#[tokio::test]
async fn test_two_step_send_gap_is_repaired_by_reconciliation() {
    let (chat, _profiles, _dir) = setup();
    let key = conversation_key("a", "b");
    chat.store().ensure_conversation(&key, "a", "b").await.unwrap();

    // Append without the counter update, as if the second write never happened
    chat.messages()
        .append(&key, "a", &OutgoingMessage::text("orphan").unwrap())
        .await
        .unwrap();
    assert_eq!(chat.unread().unread_for(&key, "b").await.unwrap(), 0);

    let repaired = chat.unread().reconcile(&key).await.unwrap();
    assert_eq!(repaired.unread_for("b"), 1);
    assert_eq!(repaired.unread_for("a"), 0);
}

#[tokio::test]
async fn test_empty_send_rejected_without_side_effects() {
    let (chat, _profiles, _dir) = setup();
    assert!(matches!(
        OutgoingMessage::new(Some(String::new()), None),
        Err(ChatError::Validation(_))
    ));

    let session = chat.open_session("a", "b").await.unwrap();
    assert!(session.send_text("").await.is_err());
    assert!(chat.messages().messages(session.key()).await.unwrap().is_empty());
    assert_eq!(chat.unread().unread_for(session.key(), "b").await.unwrap(), 0);
}
