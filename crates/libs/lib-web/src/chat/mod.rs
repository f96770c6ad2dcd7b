//! # Chat Delivery Core
//!
//! The message relay and delivery-consistency layer.
//!
//! A send is orchestrated by [`ChatSession`]: persist the user message,
//! obtain the assistant reply (or its fallback), persist it, then broadcast
//! both through the [`DeliveryBus`]. Persistence strictly precedes
//! broadcast, so a client that misses a broadcast can always recover the
//! same messages through the normal read path.

pub mod bus;
pub mod generate;
pub mod session;
pub mod subscription;

pub use bus::DeliveryBus;
pub use generate::{OllamaClient, ReplyGenerator, DEFAULT_MODEL, FALLBACK_REPLY};
pub use session::ChatSession;

#[cfg(test)]
mod tests;
