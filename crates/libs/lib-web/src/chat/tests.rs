//! # Chat Core Tests
//!
//! Session-level tests for the append/broadcast protocol: ordering,
//! fallback behavior, publish-after-persist, and recovery of dropped
//! broadcasts through the store read path.

use super::bus::DeliveryBus;
use super::generate::{GeneratedReply, HistoryMessage, OllamaClient, ReplyGenerator, FALLBACK_REPLY};
use super::session::ChatSession;
use async_trait::async_trait;
use lib_core::error::AppError;
use lib_core::model::store::models::MessageRole;
use lib_core::model::store::ChatRepository;
use lib_core::DbPool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

struct EchoGenerator;

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate(&self, _model: &str, history: &[HistoryMessage]) -> GeneratedReply {
        let last = history.last().map(|m| m.content.as_str()).unwrap_or("");
        GeneratedReply {
            content: format!("echo: {}", last),
            upstream_error: None,
        }
    }
}

async fn setup_test_db() -> DbPool {
    let pool = SqlitePoolOptions::new()
        // One connection: a pooled in-memory SQLite gives every
        // connection its own database.
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    sqlx::raw_sql(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            title TEXT NOT NULL,
            model TEXT NOT NULL DEFAULT 'llama2',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            sender_id INTEGER NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (chat_id, seq)
        );
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create schema");

    sqlx::query(
        "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@example.com', 'x')",
    )
    .execute(&pool)
    .await
    .expect("Failed to insert test user");

    pool
}

fn session_with(pool: &DbPool, generator: Arc<dyn ReplyGenerator>) -> (ChatSession, Arc<DeliveryBus>) {
    let bus = Arc::new(DeliveryBus::new());
    (
        ChatSession::new(pool.clone(), generator, bus.clone()),
        bus,
    )
}

#[tokio::test]
async fn test_send_returns_user_and_assistant_pair() {
    let pool = setup_test_db().await;
    let chat = ChatRepository::create(&pool, 1, "greetings", "llama2").await.unwrap();
    let (session, _bus) = session_with(&pool, Arc::new(EchoGenerator));

    let (user_message, assistant_message) =
        session.send_message(chat.id, 1, "hello").await.unwrap();

    assert_eq!(user_message.content, "hello");
    assert_eq!(user_message.role, MessageRole::User);
    assert_eq!(assistant_message.role, MessageRole::Assistant);
    assert_eq!(ChatRepository::count_messages(&pool, chat.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_sends_interleave_at_call_granularity() {
    let pool = setup_test_db().await;
    let chat = ChatRepository::create(&pool, 1, "ordering", "llama2").await.unwrap();
    let (session, _bus) = session_with(&pool, Arc::new(EchoGenerator));

    session.send_message(chat.id, 1, "one").await.unwrap();
    session.send_message(chat.id, 1, "two").await.unwrap();

    let messages = ChatRepository::list_since(&pool, chat.id, 0).await.unwrap();
    let expected_roles = [
        MessageRole::User,
        MessageRole::Assistant,
        MessageRole::User,
        MessageRole::Assistant,
    ];
    let expected_contents = ["one", "echo: one", "two", "echo: two"];

    assert_eq!(messages.len(), 4);
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message.seq, i as i64);
        assert_eq!(message.role, expected_roles[i]);
        assert_eq!(message.content, expected_contents[i]);
    }
}

#[tokio::test]
async fn test_send_to_missing_chat_fails() {
    let pool = setup_test_db().await;
    let (session, _bus) = session_with(&pool, Arc::new(EchoGenerator));

    let result = session.send_message(999, 1, "hello?").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_send_to_foreign_chat_fails() {
    let pool = setup_test_db().await;
    sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('bob', 'bob@example.com', 'x')")
        .execute(&pool)
        .await
        .unwrap();
    let chat = ChatRepository::create(&pool, 1, "private", "llama2").await.unwrap();
    let (session, _bus) = session_with(&pool, Arc::new(EchoGenerator));

    let result = session.send_message(chat.id, 2, "let me in").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_unreachable_upstream_yields_exact_fallback() {
    let pool = setup_test_db().await;
    let chat = ChatRepository::create(&pool, 1, "degraded", "llama2").await.unwrap();

    // Nothing listens on port 1; the connect fails immediately and the
    // generator downgrades it to the canned reply.
    let generator: Arc<dyn ReplyGenerator> = Arc::new(OllamaClient::new("http://127.0.0.1:1", 1));
    let (session, _bus) = session_with(&pool, generator);

    let (user_message, assistant_message) =
        session.send_message(chat.id, 1, "anyone there?").await.unwrap();

    assert_eq!(user_message.content, "anyone there?");
    assert_eq!(assistant_message.content, FALLBACK_REPLY);
    assert_eq!(assistant_message.role, MessageRole::Assistant);

    // Both messages are durable despite the upstream failure.
    assert_eq!(ChatRepository::count_messages(&pool, chat.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_generate_reports_upstream_error_alongside_fallback() {
    let client = OllamaClient::new("http://127.0.0.1:1", 1);
    let history = [HistoryMessage {
        role: MessageRole::User,
        content: "hi".to_string(),
    }];

    let reply = client.generate("llama2", &history).await;

    assert_eq!(reply.content, FALLBACK_REPLY);
    assert!(matches!(reply.upstream_error, Some(AppError::Upstream(_))));
}

#[tokio::test]
async fn test_subscribers_receive_user_then_assistant() {
    let pool = setup_test_db().await;
    let chat = ChatRepository::create(&pool, 1, "live", "llama2").await.unwrap();
    let (session, bus) = session_with(&pool, Arc::new(EchoGenerator));

    let mut rx = bus.subscribe(chat.id).await;

    session.send_message(chat.id, 1, "ping").await.unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();

    assert_eq!(first.role, MessageRole::User);
    assert_eq!(first.content, "ping");
    assert_eq!(second.role, MessageRole::Assistant);
    assert_eq!(second.seq, first.seq + 1);
}

#[tokio::test]
async fn test_dropped_broadcast_is_recoverable_by_reading_since() {
    let pool = setup_test_db().await;
    let chat = ChatRepository::create(&pool, 1, "gap", "llama2").await.unwrap();
    let (session, bus) = session_with(&pool, Arc::new(EchoGenerator));

    // The client knows the chat is empty, then goes offline: nobody is
    // subscribed while the send happens, so the publish is a no-op.
    let known_count = 0;
    assert_eq!(bus.subscriber_count(chat.id).await, 0);
    session.send_message(chat.id, 1, "missed me?").await.unwrap();

    // The next poll from the stale count returns exactly what was dropped.
    let missed = ChatRepository::list_since(&pool, chat.id, known_count).await.unwrap();
    assert_eq!(missed.len(), 2);
    assert_eq!(missed[0].content, "missed me?");
    assert_eq!(missed[1].content, "echo: missed me?");
}
