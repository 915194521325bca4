//! Shared fakes for tracker integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_core::{JobId, JobStatus};
use pulse_realtime::api::{StatusApiError, StatusResponse, StatusSource};
use pulse_tracker::completion::{CompletionSummary, FailureNotice};
use pulse_tracker::effect::StageStep;
use pulse_tracker::observer::{ConnectionStatus, ProgressObserver};
use tokio::sync::mpsc;

/// Status source with a per-job script of responses.
///
/// Once a job's script is exhausted it keeps reporting `processing` at
/// the fallback percentage.
pub struct FakeStatus {
    scripts: Mutex<HashMap<String, VecDeque<Result<StatusResponse, u16>>>>,
    requests: Mutex<HashMap<String, u32>>,
    delays: Mutex<HashMap<String, Duration>>,
    fallback_progress: f64,
}

impl FakeStatus {
    pub fn new(fallback_progress: f64) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            fallback_progress,
        })
    }

    pub fn script(&self, job: &str, responses: Vec<Result<StatusResponse, u16>>) {
        self.scripts
            .lock()
            .insert(job.to_string(), responses.into_iter().collect());
    }

    pub fn delay(&self, job: &str, delay: Duration) {
        self.delays.lock().insert(job.to_string(), delay);
    }

    pub fn requests(&self, job: &str) -> u32 {
        self.requests.lock().get(job).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StatusSource for FakeStatus {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, StatusApiError> {
        *self
            .requests
            .lock()
            .entry(job_id.to_string())
            .or_default() += 1;

        let delay = self.delays.lock().get(job_id.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .scripts
            .lock()
            .get_mut(job_id.as_str())
            .and_then(|script| script.pop_front());
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(StatusApiError::ApiError {
                status,
                body: "scripted failure".into(),
            }),
            None => Ok(status(JobStatus::Processing, Some(self.fallback_progress))),
        }
    }
}

pub fn status(status: JobStatus, progress: Option<f64>) -> StatusResponse {
    StatusResponse {
        status,
        progress,
        current_step: None,
        error_message: None,
        report_word_count: None,
    }
}

pub fn completed(report_word_count: u64) -> StatusResponse {
    StatusResponse {
        report_word_count: Some(report_word_count),
        ..status(JobStatus::Completed, Some(100.0))
    }
}

/// What the rendering layer was told.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Progress {
        percentage: u8,
        message: String,
        stage_key: Option<String>,
    },
    Stage {
        current: String,
        step: StageStep,
    },
    Error(FailureNotice),
    Complete(CompletionSummary),
    Connection(ConnectionStatus),
}

pub struct Recorder {
    tx: mpsc::UnboundedSender<Observed>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ProgressObserver for Recorder {
    fn on_progress(&self, percentage: u8, message: &str, stage_key: Option<&str>) {
        let _ = self.tx.send(Observed::Progress {
            percentage,
            message: message.to_string(),
            stage_key: stage_key.map(str::to_string),
        });
    }

    fn on_stage(&self, _previous: Option<&str>, current: &str, step: StageStep) {
        let _ = self.tx.send(Observed::Stage {
            current: current.to_string(),
            step,
        });
    }

    fn on_error(&self, notice: &FailureNotice) {
        let _ = self.tx.send(Observed::Error(notice.clone()));
    }

    fn on_complete(&self, summary: &CompletionSummary) {
        let _ = self.tx.send(Observed::Complete(summary.clone()));
    }

    fn on_connection(&self, status: &ConnectionStatus) {
        let _ = self.tx.send(Observed::Connection(status.clone()));
    }
}

/// Receive until `pred` matches, returning everything seen including
/// the match.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<Observed>,
    pred: impl Fn(&Observed) -> bool,
) -> Vec<Observed> {
    let mut seen = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("timed out waiting for observer callback")
            .expect("observer channel closed");
        let done = pred(&next);
        seen.push(next);
        if done {
            return seen;
        }
    }
}

/// Everything already delivered, without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Vec<Observed> {
    let mut seen = Vec::new();
    while let Ok(next) = rx.try_recv() {
        seen.push(next);
    }
    seen
}

pub fn percentages(seen: &[Observed]) -> Vec<u8> {
    seen.iter()
        .filter_map(|o| match o {
            Observed::Progress { percentage, .. } => Some(*percentage),
            _ => None,
        })
        .collect()
}
