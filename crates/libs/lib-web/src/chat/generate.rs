//! # Response Generation
//!
//! Wrapper around the Ollama chat API. One upstream call per invocation, no
//! internal retry. Any failure (connect error, timeout, non-2xx status,
//! malformed body, empty output) is downgraded to a canned fallback reply
//! so the conversation always advances; the underlying error stays
//! observable to the caller for logging.

use async_trait::async_trait;
use lib_core::dto::ModelInfo;
use lib_core::error::AppError;
use lib_core::model::store::models::MessageRole;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Canned assistant reply substituted when the model call fails.
pub const FALLBACK_REPLY: &str = "Lo siento, no pude generar una respuesta en este momento. \
Por favor, intenta nuevamente más tarde.";

/// Model used when a chat is created without one and when the model listing
/// itself is unavailable.
pub const DEFAULT_MODEL: &str = "llama2";

/// One entry of the conversation history sent upstream: role and content
/// only, in conversation order.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Outcome of a generate call.
///
/// `content` is always usable. When the upstream call failed, `content` is
/// [`FALLBACK_REPLY`] and `upstream_error` carries what went wrong.
#[derive(Debug)]
pub struct GeneratedReply {
    pub content: String,
    pub upstream_error: Option<AppError>,
}

/// The generate capability, injectable so orchestration is testable without
/// a live model service.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce an assistant reply for the given history. Never fails: the
    /// worst case is the fallback reply with the error attached.
    async fn generate(&self, model: &str, history: &[HistoryMessage]) -> GeneratedReply;
}

/// HTTP client for the Ollama API.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCallBody<'a> {
    model: &'a str,
    messages: &'a [HistoryMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCallReply {
    message: ChatCallMessage,
}

#[derive(Deserialize)]
struct ChatCallMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    /// Create a client for the given base URL.
    ///
    /// The timeout bounds the otherwise open-ended generate call; expiry is
    /// treated like any other upstream failure.
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call_chat(&self, model: &str, history: &[HistoryMessage]) -> Result<String, AppError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&ChatCallBody {
                model,
                messages: history,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Model request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Model service returned {}",
                response.status()
            )));
        }

        let reply: ChatCallReply = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed model response: {}", e)))?;

        let content = reply.message.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Upstream("Empty model response".to_string()));
        }

        Ok(content)
    }

    /// List the models the service advertises.
    ///
    /// Returns an empty list on any failure; the models handler substitutes
    /// the default model so the UI is never left without a choice.
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let url = format!("{}/api/tags", self.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<TagsReply>().await {
                    Ok(tags) => tags.models,
                    Err(e) => {
                        warn!("[MODELS] Malformed tags response: {}", e);
                        Vec::new()
                    }
                }
            }
            Ok(response) => {
                warn!("[MODELS] Model service returned {}", response.status());
                Vec::new()
            }
            Err(e) => {
                warn!("[MODELS] Failed to reach model service: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ReplyGenerator for OllamaClient {
    async fn generate(&self, model: &str, history: &[HistoryMessage]) -> GeneratedReply {
        match self.call_chat(model, history).await {
            Ok(content) => GeneratedReply {
                content,
                upstream_error: None,
            },
            Err(err) => GeneratedReply {
                content: FALLBACK_REPLY.to_string(),
                upstream_error: Some(err),
            },
        }
    }
}
