//! In-process push transport.
//!
//! [`loopback`] returns a [`LoopbackTransport`] for the connection
//! manager and a [`LoopbackServer`] that plays the server side: it can
//! refuse connections, observe control messages, push events, and drop
//! a session to simulate a network failure. Useful for embedding the
//! tracker without a network and for exercising reconnect behavior.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::client::{ClientError, PushSession, PushTransport};
use crate::messages::{ClientMessage, ServerMessage};

#[derive(Default)]
struct Shared {
    supported: bool,
    refuse_all: bool,
    refuse_next: u32,
    connect_attempts: u32,
    next_session: u64,
    latency: Duration,
}

/// Client half handed to the connection manager.
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
    accepted_tx: mpsc::UnboundedSender<ServerSession>,
}

/// Server half driven by the embedding application or a test.
pub struct LoopbackServer {
    shared: Arc<Mutex<Shared>>,
    accepted_rx: mpsc::UnboundedReceiver<ServerSession>,
}

/// Server side of one accepted session. Dropping it closes the
/// session from the server end.
pub struct ServerSession {
    pub session_no: u64,
    pub to_client: mpsc::UnboundedSender<ServerMessage>,
    pub from_client: mpsc::UnboundedReceiver<ClientMessage>,
}

/// Create a connected transport/server pair.
pub fn loopback() -> (LoopbackTransport, LoopbackServer) {
    let shared = Arc::new(Mutex::new(Shared {
        supported: true,
        ..Default::default()
    }));
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            shared: Arc::clone(&shared),
            accepted_tx,
        },
        LoopbackServer {
            shared,
            accepted_rx,
        },
    )
}

#[async_trait]
impl PushTransport for LoopbackTransport {
    fn is_supported(&self) -> bool {
        self.shared.lock().supported
    }

    async fn connect(&self) -> Result<PushSession, ClientError> {
        let latency = {
            let mut shared = self.shared.lock();
            shared.connect_attempts += 1;
            shared.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let session_no = {
            let mut shared = self.shared.lock();
            if shared.refuse_all {
                return Err(ClientError::Connection("loopback refused".into()));
            }
            if shared.refuse_next > 0 {
                shared.refuse_next -= 1;
                return Err(ClientError::Connection("loopback refused".into()));
            }
            shared.next_session += 1;
            shared.next_session
        };

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        self.accepted_tx
            .send(ServerSession {
                session_no,
                to_client,
                from_client,
            })
            .map_err(|_| ClientError::Connection("loopback server dropped".into()))?;

        Ok(PushSession {
            client_id: format!("loopback-{session_no}"),
            outbound,
            inbound,
        })
    }
}

impl LoopbackServer {
    /// Wait for the next accepted session.
    pub async fn accept(&mut self) -> Option<ServerSession> {
        self.accepted_rx.recv().await
    }

    /// Refuse every connection attempt until called again with `false`.
    pub fn refuse_all(&self, refuse: bool) {
        self.shared.lock().refuse_all = refuse;
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: u32) {
        self.shared.lock().refuse_next = n;
    }

    /// Report the transport as unavailable to the runtime.
    pub fn set_supported(&self, supported: bool) {
        self.shared.lock().supported = supported;
    }

    /// Delay every handshake by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.shared.lock().latency = latency;
    }

    /// Total connection attempts, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.shared.lock().connect_attempts
    }
}

impl ServerSession {
    /// Push a message to the client. Returns `false` if the client
    /// already closed the session.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.to_client.send(msg).is_ok()
    }

    /// Next control message from the client, or `None` once the client
    /// closed the session.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.from_client.recv().await
    }
}
