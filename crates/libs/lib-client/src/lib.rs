//! # Client Library
//!
//! Client-side delivery consistency for chat views.
//!
//! A chat view owns one [`reconciler::ClientReconciler`], an explicit state
//! machine rather than ambient globals, and runs it through a
//! [`driver::ChatViewDriver`], which serializes every mutation of the
//! message list in one task. Push delivery (the SSE subscription) is
//! preferred; when it is down the driver degrades to the polling fallback
//! over the normal chat read, and either path feeds the same admission rule
//! so a message is applied exactly once, in order.

pub mod driver;
pub mod error;
pub mod http;
pub mod poll;
pub mod reconciler;
pub mod subscriber;

pub use driver::{ChatViewDriver, ReconcilerConfig, ViewCommand, ViewHandle, ViewSnapshot};
pub use error::ClientError;
pub use http::{ChatApi, MessageSender};
pub use poll::{ChatReader, PollFallback, PollOutcome};
pub use reconciler::{Admission, ClientMessage, ClientReconciler, DeliveryStatus, SyncState};
pub use subscriber::{PushEvent, PushTransport, SseSubscriber};
