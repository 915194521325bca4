//! The unit exchanged by both update sources.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::JobId;

/// Server-reported lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[serde(alias = "pending")]
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// `completed` and `error` end a job; nothing after them is meaningful.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Which update source produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Push,
    Poll,
}

/// A progress report for one job, normalized from either source.
///
/// Two copies of the same logical state may arrive (one per source),
/// and minor out-of-order fluctuations are expected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Completion percentage (0-100). Optional on terminal events.
    pub progress: Option<u8>,
    /// Structured stage key, when the server sends one.
    pub stage_key: Option<String>,
    /// Free-text status line (e.g. `"Gerando relatório final..."`).
    pub stage_label: Option<String>,
    /// Word count of the finished report (`completed` only).
    pub report_word_count: Option<u64>,
    /// Error text (`error` only).
    pub error_message: Option<String>,
    pub source: EventSource,
}

impl ProgressEvent {
    pub fn processing(job_id: JobId, progress: u8, source: EventSource) -> Self {
        Self {
            job_id,
            status: JobStatus::Processing,
            progress: Some(progress.min(100)),
            stage_key: None,
            stage_label: None,
            report_word_count: None,
            error_message: None,
            source,
        }
    }

    pub fn completed(job_id: JobId, report_word_count: Option<u64>, source: EventSource) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            progress: Some(100),
            stage_key: None,
            stage_label: None,
            report_word_count,
            error_message: None,
            source,
        }
    }

    pub fn error(job_id: JobId, message: impl Into<String>, source: EventSource) -> Self {
        Self {
            job_id,
            status: JobStatus::Error,
            progress: None,
            stage_key: None,
            stage_label: None,
            report_word_count: None,
            error_message: Some(message.into()),
            source,
        }
    }

    pub fn with_stage_key(mut self, key: impl Into<String>) -> Self {
        self.stage_key = Some(key.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.stage_label = Some(label.into());
        self
    }
}

/// Convert a wire progress number into a percentage.
///
/// Fractional values are truncated; anything outside `0..=100` is
/// rejected rather than clamped so a corrupt payload cannot jump the
/// bar to 100.
pub fn percent_from_wire(raw: f64) -> Result<u8, CoreError> {
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(CoreError::InvalidProgress(raw as i64));
    }
    Ok(raw as u8)
}
