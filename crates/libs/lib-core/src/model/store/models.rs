//! # Store Entities
//!
//! Persistent entities for users, chats, and messages. Message rows are
//! append-only: once written they are never edited or reordered, and `seq`
//! records the insertion index within the chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User entity representing a complete user record from the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Data structure for creating a new user.
///
/// Password must be hashed before creating.
#[derive(Debug, Clone)]
pub struct UserForCreate {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A chat conversation bound to one model and owned by one user.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary row for chat listings (no message payload).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: i64,
    pub title: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted chat message.
///
/// `seq` is the 0-based position of the message inside its chat; it is the
/// value used by incremental reads and by client-side de-duplication.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub seq: i64,
    pub sender_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Data structure for appending a new message to a chat.
///
/// Identifier, position, and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct MessageForCreate {
    pub sender_id: i64,
    pub role: MessageRole,
    pub content: String,
}

impl MessageForCreate {
    pub fn new(sender_id: i64, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            role,
            content: content.into(),
        }
    }
}
