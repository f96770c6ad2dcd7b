//! # Chat Handlers
//!
//! HTTP handlers for chat management and message exchange. All routes are
//! scoped to the authenticated owner.
//!
//! `GET /api/ai/chats/{id}` is two things: without headers it
//! is the normal chat read (the same read the polling fallback diffs
//! against), and with a `subscribe` header it upgrades to the server-sent
//! event stream fed by the delivery bus.

use crate::chat::{subscription, DEFAULT_MODEL};
use crate::handlers::utils::extract_user_id;
use crate::server::AppState;
use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use lib_core::dto::{
    ChatDocument, ChatListResponse, ChatResponse, CreateChatRequest, CreateChatResponse,
    DeleteChatResponse, SendMessageRequest, SendMessageResponse,
};
use lib_core::error::{AppError, Result};
use lib_core::model::store::ChatRepository;
use lib_utils::validation::{validate_max_length, validate_not_empty};
use tracing::{info, instrument};

const MAX_MESSAGE_LENGTH: usize = 10_000;
const MAX_TITLE_LENGTH: usize = 200;

/// Create a new chat.
///
/// **Route**: `POST /api/ai/chats`
#[instrument(skip(state, headers, req))]
pub async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<CreateChatResponse>)> {
    let user_id = extract_user_id(&headers, &state.config)?;

    validate_not_empty(&req.title, "Title").map_err(AppError::InvalidInput)?;
    validate_max_length(&req.title, MAX_TITLE_LENGTH, "Title").map_err(AppError::InvalidInput)?;

    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let chat = ChatRepository::create(&state.db, user_id, req.title.trim(), &model).await?;

    info!("[CHAT] Created chat {} for user {}", chat.id, user_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateChatResponse {
            message: "Chat created successfully".to_string(),
            chat,
        }),
    ))
}

/// List the caller's chats, most recently updated first.
///
/// **Route**: `GET /api/ai/chats`
#[instrument(skip(state, headers))]
pub async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatListResponse>> {
    let user_id = extract_user_id(&headers, &state.config)?;

    let chats = ChatRepository::list_for_user(&state.db, user_id).await?;

    Ok(Json(ChatListResponse { chats }))
}

/// Read a chat, or subscribe to its event stream.
///
/// **Route**: `GET /api/ai/chats/{chat_id}`
///
/// With a `subscribe` header the response is a server-sent-event stream; a
/// `since` header carries the client's known message count for catch-up.
/// Without it, the full chat document is returned; polling clients call
/// this and diff against their own count.
#[instrument(skip(state, headers))]
pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response> {
    let user_id = extract_user_id(&headers, &state.config)?;

    if headers.contains_key("subscribe") {
        let chat = ChatRepository::find_by_id(&state.db, chat_id).await?;
        if chat.user_id != user_id {
            return Err(AppError::Forbidden(
                "Chat belongs to another user".to_string(),
            ));
        }

        let since = headers
            .get("since")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        let sse = subscription::subscribe_events(&state.db, &state.bus, chat_id, since).await?;
        return Ok(sse.into_response());
    }

    let chat = ChatRepository::find_for_user(&state.db, chat_id, user_id).await?;
    let messages = ChatRepository::list_since(&state.db, chat_id, 0).await?;

    Ok(Json(ChatResponse {
        chat: ChatDocument::from_parts(chat, messages),
    })
    .into_response())
}

/// Send a message and return both the user message and the assistant reply.
///
/// **Route**: `POST /api/ai/chats/{chat_id}/messages`
#[instrument(skip(state, headers, req))]
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>> {
    let user_id = extract_user_id(&headers, &state.config)?;

    validate_not_empty(&req.content, "Message content").map_err(AppError::InvalidInput)?;
    validate_max_length(&req.content, MAX_MESSAGE_LENGTH, "Message content")
        .map_err(AppError::InvalidInput)?;

    let (user_message, assistant_message) = state
        .session
        .send_message(chat_id, user_id, req.content.trim())
        .await?;

    Ok(Json(SendMessageResponse {
        user_message,
        assistant_message,
    }))
}

/// Delete a chat and all of its messages.
///
/// **Route**: `DELETE /api/ai/chats/{chat_id}`
#[instrument(skip(state, headers))]
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<DeleteChatResponse>> {
    let user_id = extract_user_id(&headers, &state.config)?;

    ChatRepository::delete(&state.db, chat_id, user_id).await?;
    state.bus.drop_chat(chat_id).await;

    info!("[CHAT] Deleted chat {} for user {}", chat_id, user_id);

    Ok(Json(DeleteChatResponse {
        message: "Chat deleted successfully".to_string(),
    }))
}
