mod common;

use std::sync::Arc;

use chatrelay::commands::chat::ChatSession;
use chatrelay::conversation::MessageKind;
use chatrelay::providers::Provider;
use common::{config_for, create_temp_storage, http_client, CHAT_COMPLETION_HI};
use serde_json::Value;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_session_is_saved_and_resumed_with_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHAT_COMPLETION_HI))
        .mount(&server)
        .await;

    let (storage, tmp) = create_temp_storage();
    let client = Arc::new(http_client(config_for(
        Provider::Groq,
        format!("{}/openai/v1/chat/completions", server.uri()),
    )));

    let mut session = ChatSession::start(client.clone(), storage, None, "alice").unwrap();
    session.exchange("Hello").await.unwrap();
    let session_id = session.conversation().session_id.clone();

    // Reopen the same database as a fresh process would
    let storage = chatrelay::storage::SqliteStorage::new_with_path(tmp.path().join("history.db"))
        .unwrap();
    let stored = storage.load_conversation(&session_id).unwrap().unwrap();
    assert_eq!(stored.total_messages, 2);
    assert_eq!(stored.title, "Hello");
    assert!(stored.total_tokens > 0);

    let mut resumed = ChatSession::start(client, storage, Some(&session_id[..8]), "alice").unwrap();
    resumed.exchange("And again").await.unwrap();
    assert_eq!(resumed.conversation().total_messages, 4);

    let requests = server.received_requests().await.unwrap_or_default();
    let second: Value = requests[1].body_json().unwrap();
    let contents: Vec<&str> = second["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["content"].as_str())
        .collect();
    assert!(contents.contains(&"Hello"));
    assert!(contents.contains(&"Hi!"));
    assert_eq!(contents.last(), Some(&"And again"));
}

#[tokio::test]
async fn test_failed_exchange_is_stored_as_error_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (storage, tmp) = create_temp_storage();
    let client = Arc::new(http_client(config_for(
        Provider::OpenAi,
        format!("{}/v1/chat/completions", server.uri()),
    )));

    let mut session = ChatSession::start(client, storage, None, "bob").unwrap();
    assert!(session.exchange("Hello").await.is_err());
    let session_id = session.conversation().session_id.clone();

    let storage = chatrelay::storage::SqliteStorage::new_with_path(tmp.path().join("history.db"))
        .unwrap();
    let stored = storage.load_conversation(&session_id).unwrap().unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].kind, MessageKind::Chat);
    assert_eq!(stored.messages[1].kind, MessageKind::Error);
    assert!(!stored.messages[1].is_sendable());

    let usage = storage.usage_for_user("bob").unwrap();
    assert_eq!(usage.conversations, 1);
    assert_eq!(usage.total_messages, 2);
}

#[test]
fn test_usage_aggregates_across_sessions() {
    use chatrelay::conversation::Conversation;
    use chatrelay::providers::NormalizedResponse;

    let (storage, _tmp) = create_temp_storage();
    let response = NormalizedResponse {
        content: "1234".to_string(),
        finish_reason: None,
        usage: None,
        model: String::new(),
    };

    for _ in 0..3 {
        let mut conversation = Conversation::new("carol");
        conversation.record_exchange("5678", &response);
        storage.save_conversation(&conversation).unwrap();
    }
    storage
        .save_conversation(&Conversation::new("someone-else"))
        .unwrap();

    let usage = storage.usage_for_user("carol").unwrap();
    assert_eq!(usage.conversations, 3);
    assert_eq!(usage.total_messages, 6);
    assert_eq!(usage.total_tokens, 6);
    assert_eq!(storage.list_conversations(Some("carol")).unwrap().len(), 3);
    assert_eq!(storage.list_conversations(None).unwrap().len(), 4);
}
