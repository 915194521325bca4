//! Polling fallback driver.
//!
//! Requests a job's status and forwards each result as a
//! [`ProgressEvent`] tagged with the caller's generation number. The
//! next request is scheduled one interval after the previous one has
//! resolved, so requests never overlap. The loop ends by itself on a
//! terminal status or once the failure budget is spent.

use std::sync::Arc;
use std::time::Duration;

use pulse_core::{EventSource, JobId, ProgressEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::StatusSource;

/// Polling cadence and failure tolerance.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Consecutive failed requests before an error event is emitted and
    /// polling stops. A successful request resets the count.
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_consecutive_failures: 1,
        }
    }
}

/// An event produced by one polling run.
#[derive(Debug, Clone)]
pub struct PolledEvent {
    /// Generation tag given to [`start`], so late results from a
    /// superseded run can be recognized and discarded.
    pub tag: u64,
    pub event: ProgressEvent,
}

/// Why a polling run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Terminal,
    Failed,
    Cancelled,
    /// The event sink was dropped.
    SinkClosed,
}

/// Handle to a running poller. Dropping it does not stop the task;
/// call [`PollHandle::stop`].
pub struct PollHandle {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<PollExit>,
}

impl PollHandle {
    /// Stop polling. Any request in flight is abandoned and its result
    /// is never delivered. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    pub async fn join(self) -> PollExit {
        self.task.await.unwrap_or(PollExit::Cancelled)
    }
}

/// Start polling `job_id`; the first request is issued immediately.
pub fn start(
    job_id: JobId,
    tag: u64,
    source: Arc<dyn StatusSource>,
    config: PollConfig,
    sink: mpsc::UnboundedSender<PolledEvent>,
) -> PollHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(job_id, tag, source, config, sink, cancel.clone()));
    PollHandle { cancel, task }
}

async fn run(
    job_id: JobId,
    tag: u64,
    source: Arc<dyn StatusSource>,
    config: PollConfig,
    sink: mpsc::UnboundedSender<PolledEvent>,
    cancel: CancellationToken,
) -> PollExit {
    tracing::info!(
        job_id = %job_id,
        interval_ms = config.interval.as_millis() as u64,
        "Polling started",
    );

    let mut failures = 0u32;
    let mut first = true;

    let exit = loop {
        if !first {
            tokio::select! {
                _ = cancel.cancelled() => break PollExit::Cancelled,
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
        first = false;

        let result = tokio::select! {
            _ = cancel.cancelled() => break PollExit::Cancelled,
            result = source.fetch_status(&job_id) => result,
        };

        if cancel.is_cancelled() {
            break PollExit::Cancelled;
        }

        let event = match result {
            Ok(response) => {
                failures = 0;
                response.into_event(job_id.clone())
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    failures,
                    max_failures = config.max_consecutive_failures,
                    "Status request failed",
                );
                if failures < config.max_consecutive_failures {
                    continue;
                }
                ProgressEvent::error(
                    job_id.clone(),
                    format!("Failed to fetch analysis status: {e}"),
                    EventSource::Poll,
                )
            }
        };

        let terminal = event.status.is_terminal();
        if sink.send(PolledEvent { tag, event }).is_err() {
            break PollExit::SinkClosed;
        }
        if terminal {
            break if failures > 0 {
                PollExit::Failed
            } else {
                PollExit::Terminal
            };
        }
    };

    tracing::info!(job_id = %job_id, ?exit, "Polling stopped");
    exit
}
