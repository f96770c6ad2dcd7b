//! # Chat View Driver
//!
//! Runs one chat view's delivery loop: at most one of the push
//! subscription and the poll timer actively delivers at a time, and both
//! feed the same reconciler, whose mutations are serialized here in a
//! single task. Consumers observe the view through a watch channel and
//! steer it through commands. The driver is handed its collaborators
//! explicitly and touches no ambient state.

use crate::http::MessageSender;
use crate::poll::{ChatReader, PollFallback};
use crate::reconciler::{Admission, ClientMessage, ClientReconciler, SyncState};
use crate::subscriber::{PushEvent, PushTransport};
use lib_core::model::store::models::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Timing and retry policy for one chat view.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Fixed poll interval while degraded.
    pub poll_interval: Duration,
    /// Bound on one push connect attempt before falling back.
    pub connect_timeout: Duration,
    /// Push reconnect attempts while degraded; once exhausted the view
    /// stays poll-only until an explicit refresh.
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Commands a view consumer can issue.
#[derive(Debug)]
pub enum ViewCommand {
    /// Optimistically render and send a message.
    SendMessage(String),
    /// Re-enter `Connecting` (e.g. manual refresh after retry exhaustion).
    Refresh,
    /// Leave the view; terminal.
    Close,
}

/// What a consumer sees of the view at any instant.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub state: SyncState,
    pub messages: Vec<ClientMessage>,
}

/// Consumer-side handle to a running view.
pub struct ViewHandle {
    pub commands: mpsc::Sender<ViewCommand>,
    pub snapshots: watch::Receiver<ViewSnapshot>,
}

/// The delivery loop for one open chat view.
pub struct ChatViewDriver<T, C> {
    chat_id: i64,
    user_id: i64,
    reconciler: ClientReconciler,
    transport: T,
    api: Arc<C>,
    poller: PollFallback<Arc<C>>,
    config: ReconcilerConfig,
    commands: mpsc::Receiver<ViewCommand>,
    snapshots: watch::Sender<ViewSnapshot>,
    push_rx: Option<mpsc::Receiver<PushEvent>>,
}

impl<T, C> ChatViewDriver<T, C>
where
    T: PushTransport,
    C: ChatReader + MessageSender + 'static,
{
    /// Build a driver for a view seeded from a full chat read.
    pub fn new(
        chat_id: i64,
        user_id: i64,
        initial: &[Message],
        transport: T,
        api: Arc<C>,
        config: ReconcilerConfig,
    ) -> (Self, ViewHandle) {
        let reconciler = ClientReconciler::new(chat_id, initial);
        let (command_tx, command_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(ViewSnapshot {
            state: reconciler.state(),
            messages: reconciler.messages().to_vec(),
        });

        let driver = Self {
            chat_id,
            user_id,
            reconciler,
            transport,
            api: api.clone(),
            poller: PollFallback::new(api),
            config,
            commands: command_rx,
            snapshots: snapshot_tx,
            push_rx: None,
        };

        (
            driver,
            ViewHandle {
                commands: command_tx,
                snapshots: snapshot_rx,
            },
        )
    }

    /// Drive the view until it is closed.
    pub async fn run(mut self) {
        while self.reconciler.state() != SyncState::Closed {
            match self.reconciler.state() {
                SyncState::Connecting => self.connect_once().await,
                SyncState::Live => self.run_live().await,
                SyncState::Degraded => self.run_degraded().await,
                SyncState::Closed => {}
            }
        }
    }

    async fn connect_once(&mut self) {
        let since = self.reconciler.known_count();
        let attempt = self.transport.connect(self.chat_id, since);

        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(rx)) => {
                self.push_rx = Some(rx);
                self.reconciler.push_connected();
            }
            Ok(Err(e)) => {
                debug!(chat_id = self.chat_id, "[VIEW] Push connect failed: {}", e);
                self.reconciler.push_disconnected();
            }
            Err(_) => {
                debug!(chat_id = self.chat_id, "[VIEW] Push connect timed out");
                self.reconciler.push_disconnected();
            }
        }

        self.publish();
    }

    async fn run_live(&mut self) {
        let Some(mut rx) = self.push_rx.take() else {
            self.reconciler.push_disconnected();
            return;
        };

        while self.reconciler.state() == SyncState::Live {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(PushEvent::Connected) => {}
                    Some(PushEvent::CatchUp(batch)) => {
                        self.reconciler.apply_batch(&batch.messages);
                        self.publish();
                    }
                    Some(PushEvent::Delivery(delivery)) => {
                        if self.reconciler.apply_remote(&delivery.message) == Admission::Buffered {
                            // Push skipped ahead of a hole; the poll path is
                            // authoritative for filling it.
                            self.poll_now().await;
                        }
                        self.publish();
                    }
                    Some(PushEvent::Disconnected) | None => {
                        self.reconciler.push_disconnected();
                        self.publish();
                    }
                },
                command = self.commands.recv() => {
                    self.handle_command(command).await;
                }
            }
        }
        // Dropping the receiver here is the unsubscribe.
    }

    async fn run_degraded(&mut self) {
        self.push_rx = None;

        // Poll immediately on entry: no waiting out a full tick right
        // after a disconnect.
        self.poll_now().await;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate tick, covered by the entry poll

        let mut attempts_left = self.config.reconnect_attempts;

        while self.reconciler.state() == SyncState::Degraded {
            if attempts_left > 0 {
                tokio::select! {
                    _ = ticker.tick() => self.poll_now().await,
                    _ = tokio::time::sleep(self.config.reconnect_delay) => {
                        attempts_left -= 1;
                        self.connect_once().await;
                    }
                    command = self.commands.recv() => self.handle_command(command).await,
                }
            } else {
                // Retries exhausted: poll-only until refresh or close.
                tokio::select! {
                    _ = ticker.tick() => self.poll_now().await,
                    command = self.commands.recv() => self.handle_command(command).await,
                }
            }
        }
    }

    async fn poll_now(&mut self) {
        match self
            .poller
            .poll(self.chat_id, self.reconciler.known_count())
            .await
        {
            Ok(outcome) => {
                if outcome.has_new {
                    self.reconciler.apply_batch(&outcome.messages);
                    self.publish();
                }
            }
            Err(e) => {
                debug!(chat_id = self.chat_id, "[VIEW] Poll failed: {}", e);
            }
        }
    }

    async fn handle_command(&mut self, command: Option<ViewCommand>) {
        match command {
            // A dropped handle closes the view.
            None | Some(ViewCommand::Close) => {
                self.reconciler.close();
                self.push_rx = None;
                self.publish();
            }
            Some(ViewCommand::Refresh) => {
                self.reconciler.begin_connecting();
                self.push_rx = None;
                self.publish();
            }
            Some(ViewCommand::SendMessage(content)) => {
                self.send_message(content).await;
            }
        }
    }

    async fn send_message(&mut self, content: String) {
        let local_id = self.reconciler.append_local(self.user_id, &content);
        self.publish();

        match self.api.send_message(self.chat_id, &content).await {
            Ok(sent) => {
                self.reconciler.confirm_local(&local_id, &sent.user_message);
                self.reconciler.apply_remote(&sent.assistant_message);
            }
            Err(e) => {
                warn!(chat_id = self.chat_id, "[VIEW] Send failed: {}", e);
                self.reconciler.mark_failed(&local_id);
            }
        }

        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshots.send(ViewSnapshot {
            state: self.reconciler.state(),
            messages: self.reconciler.messages().to_vec(),
        });
    }
}
