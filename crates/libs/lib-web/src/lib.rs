//! # Web Library
//!
//! HTTP handlers, middleware, and the chat delivery core.
//!
//! The `chat` module holds the delivery-consistency layer: the per-chat
//! append/broadcast orchestration ([`chat::ChatSession`]), the best-effort
//! publish/subscribe fan-out ([`chat::DeliveryBus`]), and the response
//! generator that never stalls a conversation ([`chat::OllamaClient`]).

pub mod chat;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{start_server, AppState, ServerConfig};
