//! Events fanned out by the connection manager to local handlers.
//!
//! Job events come from interpreted [`ServerMessage`](crate::messages::ServerMessage)s;
//! lifecycle events are synthesized by the manager on state transitions.

use pulse_core::job_events::{
    EVENT_ANALYSIS_COMPLETE, EVENT_ANALYSIS_ERROR, EVENT_ANALYSIS_PROGRESS, EVENT_CONNECT,
    EVENT_CONNECTED, EVENT_CONNECT_ERROR, EVENT_DISCONNECT, EVENT_JOINED_ANALYSIS,
    EVENT_LEFT_ANALYSIS, EVENT_RECONNECT, EVENT_RECONNECT_FAILED,
};
use pulse_core::{JobId, JobStatus, ProgressEvent};

/// A push-channel event delivered to handlers registered with
/// [`ConnectionManager::on`](crate::manager::ConnectionManager::on).
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// First successful connection.
    Connect,

    /// An established connection dropped.
    Disconnect,

    /// The initial connection attempt failed.
    ConnectError { error: String },

    /// The connection was restored and rooms were replayed.
    Reconnect { attempts: u32 },

    /// Reconnect attempts are exhausted. Emitted once.
    ReconnectFailed { attempts: u32 },

    /// Server greeting.
    ServerHello { message: Option<String> },

    /// Server acknowledged a room join.
    RoomJoined { job_id: JobId },

    /// Server acknowledged a room leave.
    RoomLeft { job_id: JobId },

    /// A progress, completion or error event for a subscribed job.
    Job(ProgressEvent),
}

impl PushEvent {
    /// Name under which handlers for this event are registered.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => EVENT_CONNECT,
            Self::Disconnect => EVENT_DISCONNECT,
            Self::ConnectError { .. } => EVENT_CONNECT_ERROR,
            Self::Reconnect { .. } => EVENT_RECONNECT,
            Self::ReconnectFailed { .. } => EVENT_RECONNECT_FAILED,
            Self::ServerHello { .. } => EVENT_CONNECTED,
            Self::RoomJoined { .. } => EVENT_JOINED_ANALYSIS,
            Self::RoomLeft { .. } => EVENT_LEFT_ANALYSIS,
            Self::Job(event) => match event.status {
                JobStatus::Completed => EVENT_ANALYSIS_COMPLETE,
                JobStatus::Error => EVENT_ANALYSIS_ERROR,
                JobStatus::Queued | JobStatus::Processing => EVENT_ANALYSIS_PROGRESS,
            },
        }
    }

    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::RoomJoined { job_id } | Self::RoomLeft { job_id } => Some(job_id),
            Self::Job(event) => Some(&event.job_id),
            _ => None,
        }
    }
}
