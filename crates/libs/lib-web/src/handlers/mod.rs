//! # HTTP Handlers
//!
//! Request handlers for authentication, model listing, and chat management.

// region: --- Modules
pub mod auth;
pub mod chats;
pub mod models;
pub mod utils;
// endregion: --- Modules
