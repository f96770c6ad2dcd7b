//! # Chat Data Transfer Objects
//!
//! Request and response structures for chat management, message exchange,
//! and the model-listing proxy.

use crate::model::store::models::{Chat, ChatSummary, Message};
use serde::{Deserialize, Serialize};

/// Request to create a new chat.
///
/// The model defaults to `llama2` when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub title: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Response after creating a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatResponse {
    pub message: String,
    pub chat: Chat,
}

/// Listing of the caller's chats, most recently updated first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

/// A chat together with its full ordered message list.
///
/// This is the payload of the normal chat read, the same read the polling
/// fallback uses to diff against a client's known message count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDocument {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<Message>,
}

impl ChatDocument {
    pub fn from_parts(chat: Chat, messages: Vec<Message>) -> Self {
        Self {
            id: chat.id,
            user_id: chat.user_id,
            title: chat.title,
            model: chat.model,
            created_at: chat.created_at.to_rfc3339(),
            updated_at: chat.updated_at.to_rfc3339(),
            messages,
        }
    }
}

/// Response wrapper for a single chat read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat: ChatDocument,
}

/// Request to send a message to a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Both messages produced by one send: the persisted user message and the
/// assistant reply (possibly the canned fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Response after deleting a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteChatResponse {
    pub message: String,
}

/// One available model as reported by the model-serving API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// Listing of available models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// First frame of a push subscription: everything the client missed since
/// the count it announced, so a reconnect fills the gap before live events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCatchUp {
    pub since: i64,
    pub messages: Vec<Message>,
}

/// One live push frame: a single broadcast message and its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushDelivery {
    pub seq: i64,
    pub message: Message,
}
