//! The rendering-adapter seam.
//!
//! The tracker never talks to a UI directly. It calls a
//! [`ProgressObserver`] after every state change; implementors render.

use serde::Serialize;

use crate::completion::{CompletionSummary, FailureNotice};
use crate::effect::{FeedEntry, StageStep, Timing};

/// Push-channel status as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnected { attempts: u32 },
    Error { message: String },
    /// Reconnect attempts are exhausted. Polling keeps running.
    ReconnectFailed,
}

/// Receives UI-facing updates.
///
/// Called from the tracker's event task, never while internal locks are
/// held, so implementations may call back into the tracker.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percentage: u8, message: &str, stage_key: Option<&str>);

    fn on_error(&self, notice: &FailureNotice);

    fn on_complete(&self, summary: &CompletionSummary);

    fn on_stage(&self, _previous: Option<&str>, _current: &str, _step: StageStep) {}

    fn on_feed(&self, _entry: &FeedEntry) {}

    fn on_timing(&self, _timing: &Timing) {}

    fn on_connection(&self, _status: &ConnectionStatus) {}
}

/// Logs every callback through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, percentage: u8, message: &str, stage_key: Option<&str>) {
        tracing::info!(percentage, stage_key, "{message}");
    }

    fn on_error(&self, notice: &FailureNotice) {
        tracing::error!(job_id = %notice.job_id, "Analysis failed: {}", notice.message);
    }

    fn on_complete(&self, summary: &CompletionSummary) {
        tracing::info!(
            job_id = %summary.job_id,
            report_word_count = ?summary.report_word_count,
            elapsed = %summary.elapsed,
            report_url = %summary.report_url,
            "Analysis complete",
        );
    }

    fn on_stage(&self, previous: Option<&str>, current: &str, step: StageStep) {
        tracing::info!(previous, current, "Stage changed ({})", step.display());
    }

    fn on_timing(&self, timing: &Timing) {
        tracing::debug!(
            elapsed = %timing.elapsed_display(),
            remaining = ?timing.remaining_display(),
            "Timing",
        );
    }

    fn on_connection(&self, status: &ConnectionStatus) {
        match status {
            ConnectionStatus::ReconnectFailed => {
                tracing::warn!("Live updates unavailable, continuing with polling")
            }
            ConnectionStatus::Error { message } => {
                tracing::warn!(error = %message, "Push channel error")
            }
            other => tracing::info!(status = ?other, "Push channel status"),
        }
    }
}
