//! # Model Listing Handler
//!
//! Proxy for the model-serving API's tag listing. Failures never surface:
//! an unreachable service or an empty list yields the default model with a
//! 200, so the chat-creation form always has something to offer.

use crate::chat::generate::{OllamaClient, DEFAULT_MODEL};
use crate::handlers::utils::extract_user_id;
use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use lib_core::dto::{ModelInfo, ModelsResponse};
use lib_core::error::Result;
use lib_core::Config;
use lib_utils::time::{format_time, now_utc};
use std::sync::Arc;
use tracing::instrument;

/// List available models.
///
/// **Route**: `GET /api/ai/models`
#[instrument(skip(ollama, config, headers))]
pub async fn list_models(
    State(ollama): State<Arc<OllamaClient>>,
    State(config): State<Config>,
    headers: HeaderMap,
) -> Result<Json<ModelsResponse>> {
    extract_user_id(&headers, &config)?;

    let mut models = ollama.list_models().await;

    if models.is_empty() {
        models = vec![ModelInfo {
            name: DEFAULT_MODEL.to_string(),
            modified_at: Some(format_time(now_utc())),
        }];
    }

    Ok(Json(ModelsResponse { models }))
}
