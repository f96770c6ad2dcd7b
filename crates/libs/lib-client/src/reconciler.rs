//! # Client Reconciler
//!
//! State machine that merges push-delivered and poll-delivered messages
//! into one ordered, duplicate-free view.
//!
//! The admission rule is count-based: the reconciler tracks the highest
//! confirmed position observed (`known_count`) and a message from either
//! path is admitted only at or past that count, so a message racing in
//! through both paths lands exactly once. Positions advance contiguously;
//! a pushed message that arrives ahead of a hole is parked until the poll
//! path (authoritative for gap-filling) supplies the missing positions.
//!
//! Locally authored messages are rendered optimistically under a temporary
//! id with `Pending` status, then *replaced* (not merged, never
//! duplicated) when the server-confirmed version is observed via any
//! path.

use lib_core::model::store::models::{Message, MessageRole};
use lib_utils::time::now_utc;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Delivery state of one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Push subscription being established (bounded by a connect timeout).
    Connecting,
    /// Push connected; the poll timer is off.
    Live,
    /// Push down; the poll timer drives delivery.
    Degraded,
    /// View left; nothing is delivered any more.
    Closed,
}

/// Client-side status of one rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Optimistic local append, awaiting server confirmation.
    Pending,
    /// Server-confirmed.
    Confirmed,
    /// The send was rejected; kept visible for the retry affordance.
    Failed,
}

/// One message as the view renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    /// Client-local identifier; the only id a `Pending` message has.
    pub local_id: String,
    /// Durable store identifier, once confirmed.
    pub server_id: Option<i64>,
    /// Position within the chat, once confirmed.
    pub seq: Option<i64>,
    pub sender_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl ClientMessage {
    fn confirmed(message: &Message) -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            server_id: Some(message.id),
            seq: Some(message.seq),
            sender_id: message.sender_id,
            role: message.role,
            content: message.content.clone(),
            timestamp: message.created_at,
            status: DeliveryStatus::Confirmed,
        }
    }
}

/// Outcome of offering a remote message to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted at the expected position.
    Applied,
    /// Position already covered; dropped.
    Duplicate,
    /// Ahead of a hole; parked until the missing positions arrive. The
    /// caller should poll to fill the gap.
    Buffered,
}

/// Per-chat-view reconciliation state.
///
/// One instance per open chat view, owned by the view's driver task so all
/// mutations are serialized.
#[derive(Debug)]
pub struct ClientReconciler {
    chat_id: i64,
    state: SyncState,
    known_count: i64,
    messages: Vec<ClientMessage>,
    /// Confirmed messages that arrived ahead of a hole, keyed by position.
    parked: BTreeMap<i64, Message>,
}

impl ClientReconciler {
    /// Start reconciling a view seeded from a full chat read.
    pub fn new(chat_id: i64, initial: &[Message]) -> Self {
        Self {
            chat_id,
            state: SyncState::Connecting,
            known_count: initial.len() as i64,
            messages: initial.iter().map(ClientMessage::confirmed).collect(),
            parked: BTreeMap::new(),
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Highest confirmed message count observed.
    pub fn known_count(&self) -> i64 {
        self.known_count
    }

    /// The rendered message list, in order.
    pub fn messages(&self) -> &[ClientMessage] {
        &self.messages
    }

    // region: --- State transitions

    /// Re-enter `Connecting` (initial entry or a manual refresh from
    /// `Degraded`). No-op once closed.
    pub fn begin_connecting(&mut self) {
        if self.state != SyncState::Closed {
            self.state = SyncState::Connecting;
        }
    }

    /// The push subscription came up.
    pub fn push_connected(&mut self) {
        if matches!(self.state, SyncState::Connecting | SyncState::Degraded) {
            self.state = SyncState::Live;
        }
    }

    /// The push subscription failed or dropped.
    pub fn push_disconnected(&mut self) {
        if matches!(self.state, SyncState::Connecting | SyncState::Live) {
            self.state = SyncState::Degraded;
        }
    }

    /// Explicit leave; terminal.
    pub fn close(&mut self) {
        self.state = SyncState::Closed;
    }

    // endregion: --- State transitions

    // region: --- Message admission

    /// Offer a server-confirmed message from either delivery path.
    pub fn apply_remote(&mut self, message: &Message) -> Admission {
        if self.state == SyncState::Closed {
            return Admission::Duplicate;
        }

        if message.seq < self.known_count {
            return Admission::Duplicate;
        }

        if message.seq > self.known_count {
            self.parked.insert(message.seq, message.clone());
            return Admission::Buffered;
        }

        self.admit(message);
        self.drain_parked();
        Admission::Applied
    }

    /// Offer an ordered batch from the poll path. Returns how many were
    /// newly applied.
    pub fn apply_batch(&mut self, messages: &[Message]) -> usize {
        messages
            .iter()
            .filter(|m| self.apply_remote(m) == Admission::Applied)
            .count()
    }

    fn admit(&mut self, message: &Message) {
        // A confirmed copy of an optimistic local append replaces it in
        // place instead of landing twice.
        if message.role == MessageRole::User {
            if let Some(pos) = self.messages.iter().position(|m| {
                m.status == DeliveryStatus::Pending
                    && m.sender_id == message.sender_id
                    && m.content == message.content
            }) {
                self.messages[pos] = ClientMessage::confirmed(message);
                self.known_count = message.seq + 1;
                return;
            }
        }

        self.messages.push(ClientMessage::confirmed(message));
        self.known_count = message.seq + 1;
    }

    fn drain_parked(&mut self) {
        while let Some(message) = self.parked.remove(&self.known_count) {
            self.admit(&message);
        }
        // Anything at an already-covered position was a cross-path
        // duplicate of a message admitted meanwhile.
        let covered: Vec<i64> = self
            .parked
            .range(..self.known_count)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in covered {
            self.parked.remove(&seq);
        }
    }

    // endregion: --- Message admission

    // region: --- Optimistic local appends

    /// Render a locally authored message immediately, before the server
    /// has confirmed it. Returns the temporary id.
    pub fn append_local(&mut self, sender_id: i64, content: &str) -> String {
        let local_id = Uuid::new_v4().to_string();

        self.messages.push(ClientMessage {
            local_id: local_id.clone(),
            server_id: None,
            seq: None,
            sender_id,
            role: MessageRole::User,
            content: content.to_string(),
            timestamp: now_utc(),
            status: DeliveryStatus::Pending,
        });

        local_id
    }

    /// Reconcile a pending local message with the server's confirmed copy
    /// (direct correlation via the send response).
    pub fn confirm_local(&mut self, local_id: &str, message: &Message) {
        if message.seq < self.known_count {
            // Already observed through push or poll; the pending copy, if
            // it somehow survived, is dropped rather than duplicated.
            self.messages
                .retain(|m| !(m.local_id == local_id && m.status == DeliveryStatus::Pending));
            return;
        }

        if let Some(pos) = self
            .messages
            .iter()
            .position(|m| m.local_id == local_id && m.status == DeliveryStatus::Pending)
        {
            self.messages[pos] = ClientMessage::confirmed(message);
        } else {
            self.messages.push(ClientMessage::confirmed(message));
        }

        self.known_count = message.seq + 1;
        self.drain_parked();
    }

    /// The send failed; keep the message visible, marked for retry.
    pub fn mark_failed(&mut self, local_id: &str) {
        if let Some(m) = self
            .messages
            .iter_mut()
            .find(|m| m.local_id == local_id && m.status == DeliveryStatus::Pending)
        {
            m.status = DeliveryStatus::Failed;
        }
    }

    // endregion: --- Optimistic local appends
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(seq: i64, role: MessageRole, content: &str) -> Message {
        Message {
            id: seq + 100,
            chat_id: 1,
            seq,
            sender_id: 1,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn contents(reconciler: &ClientReconciler) -> Vec<&str> {
        reconciler
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect()
    }

    #[test]
    fn test_same_message_via_both_paths_applies_once() {
        let mut r = ClientReconciler::new(1, &[]);
        let m = message(0, MessageRole::Assistant, "hi");

        // Push wins the race, then the poll result describes the same message.
        assert_eq!(r.apply_remote(&m), Admission::Applied);
        assert_eq!(r.apply_batch(&[m.clone()]), 0);
        assert_eq!(r.apply_remote(&m), Admission::Duplicate);

        assert_eq!(contents(&r), vec!["hi"]);
        assert_eq!(r.known_count(), 1);
    }

    #[test]
    fn test_batches_apply_in_order() {
        let mut r = ClientReconciler::new(1, &[]);

        let batch = [
            message(0, MessageRole::User, "one"),
            message(1, MessageRole::Assistant, "two"),
        ];
        assert_eq!(r.apply_batch(&batch), 2);
        assert_eq!(contents(&r), vec!["one", "two"]);
    }

    #[test]
    fn test_seeded_view_skips_already_known() {
        let initial = [
            message(0, MessageRole::User, "old"),
            message(1, MessageRole::Assistant, "older"),
        ];
        let mut r = ClientReconciler::new(1, &initial);
        assert_eq!(r.known_count(), 2);

        assert_eq!(r.apply_remote(&initial[1]), Admission::Duplicate);
        assert_eq!(r.apply_remote(&message(2, MessageRole::User, "new")), Admission::Applied);
        assert_eq!(contents(&r), vec!["old", "older", "new"]);
    }

    #[test]
    fn test_gap_is_parked_then_filled_by_poll() {
        let mut r = ClientReconciler::new(1, &[]);

        r.apply_remote(&message(0, MessageRole::User, "zero"));

        // Push skipped position 1 (lagged subscriber): parked, not shown.
        let ahead = message(2, MessageRole::User, "two");
        assert_eq!(r.apply_remote(&ahead), Admission::Buffered);
        assert_eq!(contents(&r), vec!["zero"]);
        assert_eq!(r.known_count(), 1);

        // The poll path fills the hole; the parked message drains after it.
        let filled = r.apply_batch(&[message(1, MessageRole::Assistant, "one"), ahead]);
        assert_eq!(filled, 1);
        assert_eq!(contents(&r), vec!["zero", "one", "two"]);
        assert_eq!(r.known_count(), 3);
    }

    #[test]
    fn test_optimistic_append_is_replaced_not_duplicated() {
        let mut r = ClientReconciler::new(1, &[]);

        let local_id = r.append_local(1, "hello");
        assert_eq!(r.messages()[0].status, DeliveryStatus::Pending);

        // The confirmed copy arrives via push, without id correlation.
        r.apply_remote(&message(0, MessageRole::User, "hello"));

        assert_eq!(contents(&r), vec!["hello"]);
        assert_eq!(r.messages()[0].status, DeliveryStatus::Confirmed);
        assert_eq!(r.messages()[0].seq, Some(0));

        // Direct confirmation afterwards must not resurrect the pending copy.
        r.confirm_local(&local_id, &message(0, MessageRole::User, "hello"));
        assert_eq!(r.messages().len(), 1);
    }

    #[test]
    fn test_confirm_local_by_id() {
        let mut r = ClientReconciler::new(1, &[]);

        let local_id = r.append_local(1, "hello");
        r.confirm_local(&local_id, &message(0, MessageRole::User, "hello"));

        assert_eq!(r.messages().len(), 1);
        assert_eq!(r.messages()[0].status, DeliveryStatus::Confirmed);
        assert_eq!(r.known_count(), 1);

        // The push copy of the same message is now a duplicate.
        assert_eq!(
            r.apply_remote(&message(0, MessageRole::User, "hello")),
            Admission::Duplicate
        );
    }

    #[test]
    fn test_failed_send_keeps_message_for_retry() {
        let mut r = ClientReconciler::new(1, &[]);

        let local_id = r.append_local(1, "doomed");
        r.mark_failed(&local_id);

        assert_eq!(r.messages()[0].status, DeliveryStatus::Failed);

        // A failed copy is no longer a reconciliation target.
        r.apply_remote(&message(0, MessageRole::User, "doomed"));
        assert_eq!(r.messages().len(), 2);
    }

    #[test]
    fn test_state_transitions() {
        let mut r = ClientReconciler::new(1, &[]);
        assert_eq!(r.state(), SyncState::Connecting);

        r.push_connected();
        assert_eq!(r.state(), SyncState::Live);

        r.push_disconnected();
        assert_eq!(r.state(), SyncState::Degraded);

        r.push_connected();
        assert_eq!(r.state(), SyncState::Live);

        r.close();
        assert_eq!(r.state(), SyncState::Closed);

        // Closed is terminal.
        r.push_connected();
        r.begin_connecting();
        assert_eq!(r.state(), SyncState::Closed);
        assert_eq!(r.apply_remote(&message(0, MessageRole::User, "late")), Admission::Duplicate);
    }
}
