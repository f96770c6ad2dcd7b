//! # API Client
//!
//! HTTP client for the chat backend. One instance per authenticated user;
//! the connection pool is shared across calls.

use crate::error::ClientError;
use crate::poll::ChatReader;
use async_trait::async_trait;
use lib_core::dto::{
    AuthResponse, ChatDocument, ChatListResponse, ChatResponse, CreateChatRequest,
    CreateChatResponse, ErrorResponse, LoginRequest, SendMessageRequest, SendMessageResponse,
};
use lib_core::model::store::models::{Chat, ChatSummary};

/// Request timeout for plain API calls (the push subscription uses its own
/// client without a body timeout).
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// The message-send capability, injectable for driver tests.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        content: &str,
    ) -> Result<SendMessageResponse, ClientError>;
}

/// HTTP client for communicating with the backend API server.
pub struct ChatApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ChatApi {
    /// Create an authenticated client for the given backend.
    pub fn new(base_url: &str, token: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Log in and build a client from the issued token.
    pub async fn login(
        base_url: &str,
        email_or_username: &str,
        password: &str,
    ) -> Result<(Self, AuthResponse), ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let response = http
            .post(format!("{}/api/auth/login", base_url.trim_end_matches('/')))
            .json(&LoginRequest {
                email_or_username: email_or_username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(ClientError::transport)?;

        let auth: AuthResponse = decode(response).await?;
        let api = Self::new(base_url, &auth.token);

        Ok((api, auth))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create a chat.
    pub async fn create_chat(
        &self,
        title: &str,
        model: Option<&str>,
    ) -> Result<Chat, ClientError> {
        let response = self
            .http
            .post(self.url("/api/ai/chats"))
            .bearer_auth(&self.token)
            .json(&CreateChatRequest {
                title: title.to_string(),
                model: model.map(str::to_string),
            })
            .send()
            .await
            .map_err(ClientError::transport)?;

        let created: CreateChatResponse = decode(response).await?;
        Ok(created.chat)
    }

    /// List the caller's chats.
    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, ClientError> {
        let response = self
            .http
            .get(self.url("/api/ai/chats"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ClientError::transport)?;

        let listing: ChatListResponse = decode(response).await?;
        Ok(listing.chats)
    }

    /// Fetch a chat with its full message list.
    pub async fn get_chat(&self, chat_id: i64) -> Result<ChatDocument, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/ai/chats/{}", chat_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ClientError::transport)?;

        let read: ChatResponse = decode(response).await?;
        Ok(read.chat)
    }

    /// Delete a chat.
    pub async fn delete_chat(&self, chat_id: i64) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/ai/chats/{}", chat_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ClientError::transport)?;

        check_status(response).await?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl ChatReader for ChatApi {
    async fn fetch_chat(&self, chat_id: i64) -> Result<ChatDocument, ClientError> {
        self.get_chat(chat_id).await
    }
}

#[async_trait]
impl MessageSender for ChatApi {
    async fn send_message(
        &self,
        chat_id: i64,
        content: &str,
    ) -> Result<SendMessageResponse, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/api/ai/chats/{}/messages", chat_id)))
            .bearer_auth(&self.token)
            .json(&SendMessageRequest {
                content: content.to_string(),
            })
            .send()
            .await
            .map_err(ClientError::transport)?;

        decode(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}
