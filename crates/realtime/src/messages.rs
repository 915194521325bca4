//! Push-channel message types and parser.
//!
//! Every WebSocket text frame carries a JSON envelope with the shape
//! `{"event": "<name>", "data": {...}}`. Inbound frames deserialize into
//! [`ServerMessage`]; outbound control messages serialize from
//! [`ClientMessage`].

use pulse_core::job_events::{MSG_JOIN_ANALYSIS, MSG_LEAVE_ANALYSIS};
use pulse_core::JobId;
use serde::{Deserialize, Serialize};

/// All known server -> client push messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Greeting sent as soon as the socket is accepted.
    #[serde(rename = "connected")]
    Connected(ConnectedData),

    /// A `join_analysis` request was accepted.
    #[serde(rename = "joined_analysis")]
    JoinedAnalysis(RoomData),

    /// A `leave_analysis` request was accepted.
    #[serde(rename = "left_analysis")]
    LeftAnalysis(RoomData),

    /// The pipeline advanced.
    #[serde(rename = "analysis_progress")]
    AnalysisProgress(ProgressData),

    /// The pipeline finished and the report is available.
    #[serde(rename = "analysis_complete")]
    AnalysisComplete(CompleteData),

    /// The pipeline failed.
    #[serde(rename = "analysis_error")]
    AnalysisError(ErrorData),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectedData {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomData {
    pub analysis_id: JobId,
}

/// Payload for `analysis_progress`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressData {
    pub analysis_id: JobId,
    /// Cumulative percentage; may arrive as a float.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Step key or status line, depending on the server version.
    #[serde(default)]
    pub current_step: Option<String>,
    /// Structured step key.
    #[serde(default)]
    pub step: Option<String>,
    /// Human-readable status line.
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload for `analysis_complete`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompleteData {
    pub analysis_id: JobId,
    #[serde(default)]
    pub report_word_count: Option<u64>,
}

/// Payload for `analysis_error`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorData {
    pub analysis_id: JobId,
    pub error: String,
}

/// Client -> server control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "join_analysis")]
    JoinAnalysis { analysis_id: JobId },

    #[serde(rename = "leave_analysis")]
    LeaveAnalysis { analysis_id: JobId },
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinAnalysis { .. } => MSG_JOIN_ANALYSIS,
            Self::LeaveAnalysis { .. } => MSG_LEAVE_ANALYSIS,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parse a push-channel text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `event` values.
/// Callers should log and continue.
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
