//! # Poll Fallback
//!
//! Pull-based reconciliation over the normal chat read. Not a separate
//! endpoint: the reader fetches the same chat document any client load
//! uses, and the fallback diffs it against the count the caller already
//! holds. Pure read, safe to repeat.

use crate::error::ClientError;
use async_trait::async_trait;
use lib_core::dto::ChatDocument;
use lib_core::model::store::models::Message;

/// The chat read capability the fallback polls through.
#[async_trait]
pub trait ChatReader: Send + Sync {
    async fn fetch_chat(&self, chat_id: i64) -> Result<ChatDocument, ClientError>;
}

#[async_trait]
impl<R: ChatReader + ?Sized> ChatReader for std::sync::Arc<R> {
    async fn fetch_chat(&self, chat_id: i64) -> Result<ChatDocument, ClientError> {
        (**self).fetch_chat(chat_id).await
    }
}

/// Result of one poll tick.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub has_new: bool,
    pub messages: Vec<Message>,
}

/// Count-based polling over an injected [`ChatReader`].
pub struct PollFallback<R> {
    reader: R,
}

impl<R: ChatReader> PollFallback<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Fetch anything newer than `known_count`.
    pub async fn poll(&self, chat_id: i64, known_count: i64) -> Result<PollOutcome, ClientError> {
        let chat = self.reader.fetch_chat(chat_id).await?;

        if (chat.messages.len() as i64) > known_count {
            let messages = chat
                .messages
                .into_iter()
                .skip(known_count.max(0) as usize)
                .collect();

            Ok(PollOutcome {
                has_new: true,
                messages,
            })
        } else {
            Ok(PollOutcome {
                has_new: false,
                messages: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lib_core::model::store::models::MessageRole;
    use std::sync::Mutex;

    struct FixedReader {
        messages: Mutex<Vec<Message>>,
    }

    impl FixedReader {
        fn with(messages: Vec<Message>) -> Self {
            Self {
                messages: Mutex::new(messages),
            }
        }
    }

    #[async_trait]
    impl ChatReader for FixedReader {
        async fn fetch_chat(&self, chat_id: i64) -> Result<ChatDocument, ClientError> {
            Ok(ChatDocument {
                id: chat_id,
                user_id: 1,
                title: "test".to_string(),
                model: "llama2".to_string(),
                created_at: Utc::now().to_rfc3339(),
                updated_at: Utc::now().to_rfc3339(),
                messages: self.messages.lock().unwrap().clone(),
            })
        }
    }

    fn message(seq: i64, content: &str) -> Message {
        Message {
            id: seq + 100,
            chat_id: 1,
            seq,
            sender_id: 1,
            role: MessageRole::User,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_poll_returns_only_newer_messages() {
        let reader = FixedReader::with(vec![
            message(0, "a"),
            message(1, "b"),
            message(2, "c"),
        ]);
        let fallback = PollFallback::new(reader);

        let outcome = fallback.poll(1, 1).await.unwrap();
        assert!(outcome.has_new);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].seq, 1);
        assert_eq!(outcome.messages[1].seq, 2);
    }

    #[tokio::test]
    async fn test_poll_up_to_date_has_nothing_new() {
        let reader = FixedReader::with(vec![message(0, "a")]);
        let fallback = PollFallback::new(reader);

        let outcome = fallback.poll(1, 1).await.unwrap();
        assert!(!outcome.has_new);
        assert!(outcome.messages.is_empty());
    }

    #[tokio::test]
    async fn test_poll_is_idempotent_without_appends() {
        let reader = FixedReader::with(vec![message(0, "a"), message(1, "b")]);
        let fallback = PollFallback::new(reader);

        let first = fallback.poll(1, 0).await.unwrap();
        let second = fallback.poll(1, 0).await.unwrap();

        assert_eq!(first.has_new, second.has_new);
        assert_eq!(first.messages, second.messages);
    }

    #[tokio::test]
    async fn test_degraded_tick_sees_two_appends_in_order() {
        // A client in degraded mode knows 1 message; the server appended a
        // user/assistant pair meanwhile.
        let reader = FixedReader::with(vec![
            message(0, "seed"),
            message(1, "question"),
            message(2, "answer"),
        ]);
        let fallback = PollFallback::new(reader);

        let outcome = fallback.poll(1, 1).await.unwrap();
        assert!(outcome.has_new);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].content, "question");
        assert_eq!(outcome.messages[1].content, "answer");
    }
}
