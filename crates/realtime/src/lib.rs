//! Realtime update sources for analysis progress.
//!
//! Provides typed push-channel message parsing, the transport seam with
//! a WebSocket implementation, reconnect backoff, the room-scoped
//! [`ConnectionManager`](manager::ConnectionManager), the status
//! endpoint client, and the polling fallback driver.

pub mod api;
pub mod client;
pub mod events;
pub mod loopback;
pub mod manager;
pub mod messages;
pub mod poller;
pub mod processor;
pub mod reconnect;
