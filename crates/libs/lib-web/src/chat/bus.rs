//! # Delivery Bus
//!
//! Per-chat publish/subscribe fan-out for freshly appended messages.
//!
//! Delivery is best-effort and transient: no persistence, no replay buffer,
//! at most one delivery per subscriber per publish. Publishing to a chat
//! with no subscribers is a no-op: the message is already durable in the
//! store, and absent clients recover it through the polling read path.
//! Within one chat, subscribers observe publishes in publish order; there
//! is no ordering relationship across chats.

use lib_core::model::store::models::Message;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

/// Buffered broadcasts per chat before slow subscribers start lagging.
///
/// A subscriber that falls further behind is skipped forward by the
/// broadcast channel rather than blocking the publisher or its peers.
const CHANNEL_CAPACITY: usize = 100;

/// Publish/subscribe channel registry keyed by chat id.
#[derive(Debug, Default)]
pub struct DeliveryBus {
    senders: RwLock<HashMap<i64, broadcast::Sender<Message>>>,
}

impl DeliveryBus {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a chat's delivery channel.
    ///
    /// Dropping the returned receiver is the unsubscribe.
    pub async fn subscribe(&self, chat_id: i64) -> broadcast::Receiver<Message> {
        let mut senders = self.senders.write().await;

        if let Some(sender) = senders.get(&chat_id) {
            sender.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
            senders.insert(chat_id, tx);
            rx
        }
    }

    /// Broadcast one message to every current subscriber of its chat.
    ///
    /// Returns how many subscribers received it. Never fails: a send error
    /// only means there were zero receivers.
    pub async fn publish(&self, message: Message) -> usize {
        let senders = self.senders.read().await;

        match senders.get(&message.chat_id) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Number of live subscribers for a chat.
    pub async fn subscriber_count(&self, chat_id: i64) -> usize {
        self.senders
            .read()
            .await
            .get(&chat_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Remove a chat's channel, ending its subscriber streams.
    ///
    /// Called when the chat itself is deleted.
    pub async fn drop_chat(&self, chat_id: i64) {
        self.senders.write().await.remove(&chat_id);
    }
}
