//! # Push Subscriber
//!
//! Client side of the push path: opens the chat's server-sent-event stream
//! and turns its frames into [`PushEvent`]s on a channel. The first frame
//! after connecting is the server's catch-up batch for the count announced
//! in the `since` header; live deliveries follow one frame per broadcast.

use crate::error::ClientError;
use async_trait::async_trait;
use futures_util::StreamExt;
use lib_core::dto::chat::{PushCatchUp, PushDelivery};
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted by a push transport.
#[derive(Debug)]
pub enum PushEvent {
    /// The subscription is established.
    Connected,
    /// Catch-up batch: everything missed since the announced count.
    CatchUp(PushCatchUp),
    /// One live broadcast.
    Delivery(PushDelivery),
    /// The stream ended or broke; the sender closes after this.
    Disconnected,
}

/// The push transport capability, injectable for driver tests.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the push channel for a chat, resuming from `since`.
    ///
    /// A successful return means the subscription is established; delivery
    /// then continues on the returned receiver until it yields
    /// [`PushEvent::Disconnected`].
    async fn connect(
        &self,
        chat_id: i64,
        since: i64,
    ) -> Result<mpsc::Receiver<PushEvent>, ClientError>;
}

/// SSE-based push transport against the backend's subscription route.
pub struct SseSubscriber {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SseSubscriber {
    pub fn new(base_url: &str, token: &str) -> Self {
        // No request timeout: the subscription body is open-ended. The
        // connect itself is bounded, and the driver additionally bounds the
        // whole attempt.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl PushTransport for SseSubscriber {
    async fn connect(
        &self,
        chat_id: i64,
        since: i64,
    ) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
        let url = format!("{}/api/ai/chats/{}", self.base_url, chat_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("subscribe", "true")
            .header("since", since.to_string())
            .send()
            .await
            .map_err(ClientError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: "subscription rejected".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(100);
        let _ = tx.send(PushEvent::Connected).await;

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        debug!(chat_id, "[PUSH] Stream error: {}", e);
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines; keep any incomplete tail.
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim_end();

                    // Keep-alive comments and event separators carry no data.
                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    let event = if let Ok(delivery) = serde_json::from_str::<PushDelivery>(payload)
                    {
                        PushEvent::Delivery(delivery)
                    } else if let Ok(catch_up) = serde_json::from_str::<PushCatchUp>(payload) {
                        PushEvent::CatchUp(catch_up)
                    } else {
                        debug!(chat_id, "[PUSH] Unrecognized frame: {}", payload);
                        continue;
                    };

                    if tx.send(event).await.is_err() {
                        // Receiver dropped: the view unsubscribed.
                        return;
                    }
                }
            }

            let _ = tx.send(PushEvent::Disconnected).await;
        });

        Ok(rx)
    }
}
