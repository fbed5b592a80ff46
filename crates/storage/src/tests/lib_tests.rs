use super::*;

fn key(lawyer: &str, client: &str) -> ConversationKey {
    ConversationKey::new(LawyerId::new(lawyer), ClientId::new(client))
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("consult_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("chats.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn history_preserves_append_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let key = key("L1", "C1");

    storage
        .append_message(&key, ParticipantRole::Client, "안녕하세요")
        .await
        .expect("first append");
    storage
        .append_message(&key, ParticipantRole::Lawyer, "네, 말씀하세요")
        .await
        .expect("second append");

    let history = storage.history(&key).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender, ParticipantRole::Client);
    assert_eq!(history[0].content, "안녕하세요");
    assert_eq!(history[1].sender, ParticipantRole::Lawyer);
    assert!(history[1].sent_at >= history[0].sent_at);
}

#[tokio::test]
async fn timestamps_never_decrease_within_a_conversation() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let key = key("L1", "C1");

    let mut previous = None;
    for i in 0..20 {
        let stored = storage
            .append_message(&key, ParticipantRole::Client, &format!("msg {i}"))
            .await
            .expect("append");
        if let Some(prev) = previous {
            assert!(stored.sent_at >= prev, "timestamp went backwards");
        }
        previous = Some(stored.sent_at);
    }
}

#[tokio::test]
async fn conversation_created_implicitly_on_first_append() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lawyer = LawyerId::new("L1");

    assert!(storage
        .conversations_for_lawyer(&lawyer)
        .await
        .expect("empty list")
        .is_empty());

    storage
        .append_message(&key("L1", "C1"), ParticipantRole::Client, "hello")
        .await
        .expect("append");

    let conversations = storage
        .conversations_for_lawyer(&lawyer)
        .await
        .expect("list");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].client_id, ClientId::new("C1"));
    assert_eq!(conversations[0].messages.len(), 1);
}

#[tokio::test]
async fn conversations_sorted_by_most_recent_activity() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let lawyer = LawyerId::new("L1");

    storage
        .append_message(&key("L1", "C1"), ParticipantRole::Client, "first")
        .await
        .expect("append c1");
    storage
        .append_message(&key("L1", "C2"), ParticipantRole::Client, "second")
        .await
        .expect("append c2");
    storage
        .append_message(&key("L1", "C1"), ParticipantRole::Lawyer, "reply")
        .await
        .expect("append c1 again");

    let conversations = storage
        .conversations_for_lawyer(&lawyer)
        .await
        .expect("list");
    assert_eq!(conversations.len(), 2);
    assert!(conversations[0].last_updated >= conversations[1].last_updated);
    assert_eq!(conversations[0].client_id, ClientId::new("C1"));
}

#[tokio::test]
async fn histories_are_isolated_per_conversation() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    storage
        .append_message(&key("L1", "C1"), ParticipantRole::Client, "for L1")
        .await
        .expect("append");
    storage
        .append_message(&key("L2", "C1"), ParticipantRole::Client, "for L2")
        .await
        .expect("append");

    let history = storage.history(&key("L1", "C1")).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "for L1");

    let other_lawyer = storage
        .conversations_for_lawyer(&LawyerId::new("L2"))
        .await
        .expect("list");
    assert_eq!(other_lawyer.len(), 1);
    assert_eq!(other_lawyer[0].messages[0].content, "for L2");
}
