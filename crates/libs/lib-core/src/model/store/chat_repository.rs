//! # Chat Repository
//!
//! Database access layer for chats and their message sequences.
//!
//! The message list of a chat is append-only. `append_message` runs as a
//! single transaction that assigns the next `seq`, inserts the row, and
//! bumps the chat's `updated_at`. A failure anywhere leaves the prior
//! state unchanged, so persisted state never runs behind what has been
//! broadcast to subscribers.

use super::models::{Chat, ChatSummary, Message, MessageForCreate};
use super::DbPool;
use crate::error::{AppError, Result};
use sqlx::{query, query_as, query_scalar};

/// Repository for chat and message persistence.
pub struct ChatRepository;

impl ChatRepository {
    /// Create a new chat for a user.
    pub async fn create(pool: &DbPool, user_id: i64, title: &str, model: &str) -> Result<Chat> {
        let chat = query_as::<_, Chat>(
            "INSERT INTO chats (user_id, title, model) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(user_id)
        .bind(title)
        .bind(model)
        .fetch_one(pool)
        .await?;

        Ok(chat)
    }

    /// Find a chat by id, regardless of owner.
    pub async fn find_by_id(pool: &DbPool, chat_id: i64) -> Result<Chat> {
        query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))
    }

    /// Find a chat by id, scoped to its owner.
    ///
    /// A chat owned by someone else is indistinguishable from a missing one.
    pub async fn find_for_user(pool: &DbPool, chat_id: i64, user_id: i64) -> Result<Chat> {
        query_as::<_, Chat>("SELECT * FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))
    }

    /// List chat summaries for a user, most recently updated first.
    pub async fn list_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<ChatSummary>> {
        let chats = query_as::<_, ChatSummary>(
            "SELECT id, title, model, created_at, updated_at \
             FROM chats WHERE user_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(chats)
    }

    /// Append a message to a chat.
    ///
    /// Assigns the message identifier, its `seq` (0-based insertion index),
    /// and the timestamp, and bumps `chats.updated_at`, all in one
    /// transaction. Fails with `NotFound` when the chat does not exist.
    pub async fn append_message(
        pool: &DbPool,
        chat_id: i64,
        message: MessageForCreate,
    ) -> Result<Message> {
        let mut tx = pool.begin().await?;

        let touched = query("UPDATE chats SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        if touched.rows_affected() == 0 {
            return Err(AppError::NotFound("Chat not found".to_string()));
        }

        let seq: i64 = query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(&mut *tx)
            .await?;

        let appended = query_as::<_, Message>(
            "INSERT INTO messages (chat_id, seq, sender_id, role, content) \
             VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(chat_id)
        .bind(seq)
        .bind(message.sender_id)
        .bind(message.role)
        .bind(&message.content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(appended)
    }

    /// List messages whose insertion index is `>= since_count`, in order.
    ///
    /// Returns an empty list when the caller is already up to date. Fails
    /// with `NotFound` when the chat itself is missing.
    pub async fn list_since(pool: &DbPool, chat_id: i64, since_count: i64) -> Result<Vec<Message>> {
        let exists: i64 = query_scalar("SELECT COUNT(*) FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_one(pool)
            .await?;

        if exists == 0 {
            return Err(AppError::NotFound("Chat not found".to_string()));
        }

        let messages = query_as::<_, Message>(
            "SELECT * FROM messages WHERE chat_id = ? AND seq >= ? ORDER BY seq ASC",
        )
        .bind(chat_id)
        .bind(since_count)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    /// Count the messages in a chat.
    pub async fn count_messages(pool: &DbPool, chat_id: i64) -> Result<i64> {
        let count = query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Delete a chat and all of its messages.
    ///
    /// Owner-scoped like `find_for_user`. Fails with `NotFound` when absent.
    pub async fn delete(pool: &DbPool, chat_id: i64, user_id: i64) -> Result<()> {
        let mut tx = pool.begin().await?;

        query("DELETE FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        let deleted = query("DELETE FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("Chat not found".to_string()));
        }

        tx.commit().await?;

        Ok(())
    }
}
