//! # Chat Session Orchestration
//!
//! The append/broadcast protocol for one send:
//!
//! 1. validate ownership,
//! 2. persist the user message,
//! 3. generate the assistant reply (never fails outward),
//! 4. persist the reply,
//! 5. broadcast both, user first.
//!
//! Persisted state is always ahead of or equal to broadcast state, so a
//! client that missed a broadcast recovers the identical messages by
//! re-reading the chat. Only a store failure aborts the send; a publish
//! with zero subscribers or a broken transport never does.

use super::bus::DeliveryBus;
use super::generate::{HistoryMessage, ReplyGenerator};
use lib_core::error::Result;
use lib_core::model::store::models::{Message, MessageForCreate, MessageRole};
use lib_core::model::store::ChatRepository;
use lib_core::DbPool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Server-side aggregate handling message exchange for chats.
///
/// All collaborators are injected at construction; nothing is looked up
/// from ambient context.
#[derive(Clone)]
pub struct ChatSession {
    db: DbPool,
    generator: Arc<dyn ReplyGenerator>,
    bus: Arc<DeliveryBus>,
}

impl ChatSession {
    pub fn new(db: DbPool, generator: Arc<dyn ReplyGenerator>, bus: Arc<DeliveryBus>) -> Self {
        Self { db, generator, bus }
    }

    /// Accept a user message and produce the assistant reply.
    ///
    /// Returns both persisted messages. Fails with `NotFound` when the chat
    /// does not exist or belongs to another user, and with a persistence
    /// error when an append did not go through. Those are the only
    /// failure modes; upstream and delivery problems are absorbed here.
    pub async fn send_message(
        &self,
        chat_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<(Message, Message)> {
        let chat = ChatRepository::find_for_user(&self.db, chat_id, user_id).await?;

        let user_message = ChatRepository::append_message(
            &self.db,
            chat.id,
            MessageForCreate::new(user_id, MessageRole::User, content),
        )
        .await?;

        // Full ordered history, role + content only, including the message
        // just appended.
        let history: Vec<HistoryMessage> = ChatRepository::list_since(&self.db, chat.id, 0)
            .await?
            .into_iter()
            .map(|m| HistoryMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        debug!(
            chat_id = chat.id,
            model = %chat.model,
            history_len = history.len(),
            "[SEND] Requesting assistant reply"
        );

        let reply = self.generator.generate(&chat.model, &history).await;
        if let Some(err) = &reply.upstream_error {
            warn!(chat_id = chat.id, "[SEND] Upstream failed, using fallback reply: {}", err);
        }

        // The assistant reply is stored under the chat owner's id, matching
        // how the conversation records authorship for both roles.
        let assistant_message = ChatRepository::append_message(
            &self.db,
            chat.id,
            MessageForCreate::new(user_id, MessageRole::Assistant, reply.content),
        )
        .await?;

        let delivered = self.bus.publish(user_message.clone()).await;
        self.bus.publish(assistant_message.clone()).await;

        debug!(
            chat_id = chat.id,
            subscribers = delivered,
            user_seq = user_message.seq,
            assistant_seq = assistant_message.seq,
            "[SEND] Messages persisted and broadcast"
        );

        Ok((user_message, assistant_message))
    }
}
