//! Event name constants for the push channel.
//!
//! Server-emitted names arrive inside the `"event"` field of a
//! WebSocket frame. Lifecycle names are synthesized locally by the
//! connection manager and go through the same handler registry.

/// Progress update during analysis (percentage + current step).
pub const EVENT_ANALYSIS_PROGRESS: &str = "analysis_progress";

/// Analysis completed successfully.
pub const EVENT_ANALYSIS_COMPLETE: &str = "analysis_complete";

/// Analysis failed with an error.
pub const EVENT_ANALYSIS_ERROR: &str = "analysis_error";

/// Server greeting after the socket opens.
pub const EVENT_CONNECTED: &str = "connected";

/// Server acknowledgement of a room join.
pub const EVENT_JOINED_ANALYSIS: &str = "joined_analysis";

/// Server acknowledgement of a room leave.
pub const EVENT_LEFT_ANALYSIS: &str = "left_analysis";

/// Client -> server: subscribe to a job room.
pub const MSG_JOIN_ANALYSIS: &str = "join_analysis";

/// Client -> server: unsubscribe from a job room.
pub const MSG_LEAVE_ANALYSIS: &str = "leave_analysis";

/// First successful connection.
pub const EVENT_CONNECT: &str = "connect";

/// An established connection dropped.
pub const EVENT_DISCONNECT: &str = "disconnect";

/// The initial connection attempt failed.
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// The connection was restored after a drop.
pub const EVENT_RECONNECT: &str = "reconnect";

/// Every reconnect attempt failed; the manager gave up.
pub const EVENT_RECONNECT_FAILED: &str = "reconnect_failed";
