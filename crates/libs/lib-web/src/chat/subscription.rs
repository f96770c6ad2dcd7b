//! # Chat Subscription
//!
//! Server-sent-event stream for a chat's delivery channel.
//!
//! The first frame is a catch-up batch: every message at or past the count
//! the client announced in its `since` header (read from the store, which
//! is always at least as fresh as any broadcast). Live frames follow, one
//! per publish. Frames already covered by the catch-up are filtered out,
//! so a message racing the subscription is sent once, not twice. The
//! client's own admission rule makes the second copy harmless anyway.

use super::bus::DeliveryBus;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use lib_core::dto::chat::{PushCatchUp, PushDelivery};
use lib_core::error::Result;
use lib_core::model::store::ChatRepository;
use lib_core::DbPool;
use tokio::sync::broadcast;
use tracing::debug;

/// Open the event stream for a chat, starting from `since`.
///
/// The caller has already authenticated the user and checked chat access.
pub async fn subscribe_events(
    pool: &DbPool,
    bus: &DeliveryBus,
    chat_id: i64,
    since: i64,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    // Subscribe before the catch-up read: anything published in between is
    // then either in the batch or in the receiver, never in neither.
    let rx = bus.subscribe(chat_id).await;

    let missed = ChatRepository::list_since(pool, chat_id, since).await?;
    let next_seq = since + missed.len() as i64;

    debug!(
        chat_id,
        since,
        caught_up = missed.len(),
        "[SUBSCRIBE] Opening event stream"
    );

    let catch_up = serde_json::to_string(&PushCatchUp {
        since,
        messages: missed,
    })?;

    let stream = stream::unfold(
        (rx, next_seq, false, catch_up),
        move |(mut rx, mut next_seq, sent_catch_up, catch_up)| async move {
            if !sent_catch_up {
                let event = Event::default().data(catch_up);
                return Some((Ok(event), (rx, next_seq, true, String::new())));
            }

            loop {
                match rx.recv().await {
                    Ok(message) => {
                        // Already delivered through the catch-up batch.
                        if message.seq < next_seq {
                            continue;
                        }

                        let frame = PushDelivery {
                            seq: message.seq,
                            message,
                        };
                        let data = match serde_json::to_string(&frame) {
                            Ok(s) => s,
                            Err(_) => continue,
                        };

                        next_seq = frame.seq + 1;
                        return Some((
                            Ok(Event::default().data(data)),
                            (rx, next_seq, true, String::new()),
                        ));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The subscriber fell behind and lost broadcasts; it
                        // will see a seq gap and reconcile through the poll
                        // path.
                        debug!(chat_id, skipped, "[SUBSCRIBE] Subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return None;
                    }
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
