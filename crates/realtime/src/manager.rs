//! Room-scoped push-channel connection manager.
//!
//! [`ConnectionManager`] owns the lifecycle of one persistent push
//! session: connect, room join/leave, bounded reconnect, and a local
//! fan-out of [`PushEvent`]s to handlers registered by event name.
//!
//! The set of joined rooms outlives any single session. After every
//! transition into [`ConnectionState::Connected`] the whole set is
//! replayed to the server before the connection task reads another
//! inbound frame, so no job event is dispatched for a session that has
//! not been resubscribed yet.
//!
//! Created explicitly by the application root and torn down with
//! [`ConnectionManager::shutdown`]; there is no global instance.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use pulse_core::JobId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::client::{PushSession, PushTransport};
use crate::events::PushEvent;
use crate::messages::{ClientMessage, ServerMessage};
use crate::processor::{interpret, is_stale};
use crate::reconnect::{reconnect_loop, ReconnectConfig, ReconnectOutcome};

/// How long [`ConnectionManager::shutdown`] waits for the connection task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted. Sticky until re-initialized.
    Failed,
}

/// Error type handlers may return; it is logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A locally registered event handler.
pub type Handler = Arc<dyn Fn(&PushEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Token returned by [`ConnectionManager::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Rooms plus the outbound half of the current session, guarded
/// together so a replay and a concurrent join cannot interleave.
#[derive(Default)]
struct Subscriptions {
    rooms: IndexSet<JobId>,
    outbound: Option<mpsc::UnboundedSender<ClientMessage>>,
}

struct ConnectionTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Manages the persistent push connection for one client.
pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    config: ReconnectConfig,
    state: Mutex<ConnectionState>,
    subscriptions: Mutex<Subscriptions>,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_handler_id: AtomicU64,
    task: Mutex<Option<ConnectionTask>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, config: ReconnectConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            subscriptions: Mutex::new(Subscriptions::default()),
            handlers: RwLock::new(HashMap::new()),
            next_handler_id: AtomicU64::new(1),
            task: Mutex::new(None),
        })
    }

    /// Establish the push channel.
    ///
    /// Returns `true` once a session is up and every retained room has
    /// been replayed. Returns `false` when the transport is unsupported
    /// or the first attempt fails; in the latter case a `connect_error`
    /// is emitted and reconnection continues in the background.
    /// Calling this while a connection task is alive, including one
    /// still performing its first handshake, is a no-op that reports
    /// whether the channel is currently connected. A manager in
    /// [`ConnectionState::Failed`] starts over with a fresh budget.
    pub async fn initialize(self: &Arc<Self>) -> bool {
        if !self.transport.is_supported() {
            tracing::info!("Push transport unsupported, relying on polling");
            return false;
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut task = self.task.lock();
            let state = self.state();
            if state != ConnectionState::Failed
                && task.as_ref().is_some_and(|t| !t.handle.is_finished())
            {
                return state == ConnectionState::Connected;
            }
            if let Some(previous) = task.take() {
                previous.cancel.cancel();
            }

            self.set_state(ConnectionState::Connecting);
            let cancel = CancellationToken::new();
            let manager = Arc::clone(self);
            let task_cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                manager.run(ready_tx, task_cancel).await;
                tracing::debug!("Push connection task exited");
            });
            *task = Some(ConnectionTask { cancel, handle });
        }

        ready_rx.await.unwrap_or(false)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Subscribe to a job room.
    ///
    /// The room is retained across reconnects. If connected, the join is
    /// sent immediately; otherwise it is replayed on the next connect.
    /// Joining an already-joined room does nothing.
    pub fn join_room(&self, job_id: &JobId) {
        let mut subs = self.subscriptions.lock();
        if !subs.rooms.insert(job_id.clone()) {
            return;
        }
        tracing::debug!(job_id = %job_id, "Joined room");
        if let Some(outbound) = &subs.outbound {
            let _ = outbound.send(ClientMessage::JoinAnalysis {
                analysis_id: job_id.clone(),
            });
        }
    }

    /// Unsubscribe from a job room. Leaving an unknown room does nothing.
    pub fn leave_room(&self, job_id: &JobId) {
        let mut subs = self.subscriptions.lock();
        if !subs.rooms.shift_remove(job_id) {
            return;
        }
        tracing::debug!(job_id = %job_id, "Left room");
        if let Some(outbound) = &subs.outbound {
            let _ = outbound.send(ClientMessage::LeaveAnalysis {
                analysis_id: job_id.clone(),
            });
        }
    }

    /// Rooms currently retained, in join order.
    pub fn rooms(&self) -> Vec<JobId> {
        self.subscriptions.lock().rooms.iter().cloned().collect()
    }

    pub fn is_subscribed(&self, job_id: &JobId) -> bool {
        self.subscriptions.lock().rooms.contains(job_id)
    }

    /// Register a handler for an event name. Handlers for the same name
    /// run in registration order.
    pub fn on<F>(&self, event_name: &str, handler: F) -> HandlerId
    where
        F: Fn(&PushEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, event_name: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event_name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_name);
        }
        removed
    }

    /// Gracefully stop the connection task.
    ///
    /// Retained rooms are kept so a later [`initialize`](Self::initialize)
    /// resubscribes them.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            tracing::info!("Shutting down push connection");
            task.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, task.handle).await;
        }
        self.subscriptions.lock().outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    // ---- private helpers ----

    /// First handshake, reported through `ready`.
    async fn connect_first(
        &self,
        ready: oneshot::Sender<bool>,
        cancel: &CancellationToken,
    ) -> Option<PushSession> {
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = self.transport.connect() => result,
        };
        match result {
            Ok(session) => {
                self.attach(&session);
                self.set_state(ConnectionState::Connected);
                self.emit(&PushEvent::Connect);
                let _ = ready.send(true);
                Some(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Initial push connection failed, entering reconnect loop");
                self.set_state(ConnectionState::Reconnecting);
                self.emit(&PushEvent::ConnectError {
                    error: e.to_string(),
                });
                let _ = ready.send(false);
                None
            }
        }
    }

    /// Core loop: connect -> process inbound frames -> reconnect on drop.
    async fn run(self: Arc<Self>, ready: oneshot::Sender<bool>, cancel: CancellationToken) {
        let first = self.connect_first(ready, &cancel).await;
        if cancel.is_cancelled() {
            self.detach();
            return;
        }
        let mut ever_connected = first.is_some();
        let mut session = match first {
            Some(session) => session,
            None => match self.reconnect(&cancel, ever_connected).await {
                Some(session) => session,
                None => return,
            },
        };
        ever_connected = true;

        loop {
            tracing::debug!(client_id = %session.client_id, "Processing push session");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.detach();
                        return;
                    }
                    msg = session.inbound.recv() => match msg {
                        Some(msg) => self.handle_server_message(msg),
                        None => break,
                    }
                }
            }

            self.detach();
            if cancel.is_cancelled() {
                return;
            }

            tracing::info!("Push connection lost, entering reconnect loop");
            if self.set_state(ConnectionState::Reconnecting) == ConnectionState::Connected {
                self.emit(&PushEvent::Disconnect);
            }

            session = match self.reconnect(&cancel, ever_connected).await {
                Some(session) => session,
                None => return,
            };
        }
    }

    /// Run one bounded reconnect loop and apply its outcome.
    async fn reconnect(
        &self,
        cancel: &CancellationToken,
        ever_connected: bool,
    ) -> Option<PushSession> {
        match reconnect_loop(self.transport.as_ref(), &self.config, cancel).await {
            ReconnectOutcome::Connected { session, attempts } => {
                self.attach(&session);
                self.set_state(ConnectionState::Connected);
                if ever_connected {
                    self.emit(&PushEvent::Reconnect { attempts });
                } else {
                    self.emit(&PushEvent::Connect);
                }
                Some(session)
            }
            ReconnectOutcome::Exhausted { attempts } => {
                if self.set_state(ConnectionState::Failed) != ConnectionState::Failed {
                    self.emit(&PushEvent::ReconnectFailed { attempts });
                }
                None
            }
            ReconnectOutcome::Cancelled => None,
        }
    }

    /// Install a session's outbound half and replay every retained room.
    fn attach(&self, session: &PushSession) {
        let mut subs = self.subscriptions.lock();
        for job_id in &subs.rooms {
            let _ = session.outbound.send(ClientMessage::JoinAnalysis {
                analysis_id: job_id.clone(),
            });
        }
        tracing::info!(
            client_id = %session.client_id,
            rooms = subs.rooms.len(),
            "Push session ready, rooms resubscribed",
        );
        subs.outbound = Some(session.outbound.clone());
    }

    fn detach(&self) {
        self.subscriptions.lock().outbound = None;
    }

    /// Set the state, returning the previous one.
    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.lock();
        let previous = *state;
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Push connection state changed");
        }
        *state = next;
        previous
    }

    fn handle_server_message(&self, msg: ServerMessage) {
        let event = interpret(msg);
        if is_stale(&event, |id| self.is_subscribed(id)) {
            tracing::debug!(job_id = ?event.job_id(), "Dropping event for unsubscribed room");
            return;
        }
        self.emit(&event);
    }

    /// Invoke every handler registered for the event's name.
    ///
    /// A handler that errors or panics is logged and skipped; the rest
    /// still run.
    fn emit(&self, event: &PushEvent) {
        let name = event.name();
        let handlers: Vec<(HandlerId, Handler)> = match self.handlers.read().get(name) {
            Some(list) => list.clone(),
            None => return,
        };

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = name, handler = id.0, error = %e, "Push handler failed");
                }
                Err(_) => {
                    tracing::error!(event = name, handler = id.0, "Push handler panicked");
                }
            }
        }
    }
}
