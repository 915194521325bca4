//! Terminal-state presentation.
//!
//! Turns the reconciler's terminal effects into what the rendering layer
//! shows: a report link on success, an error message plus a retry action
//! on failure.

use pulse_core::time_format::format_mm_ss;
use pulse_core::JobId;
use pulse_realtime::api::report_url;
use serde::Serialize;

use crate::effect::Completion;

/// Everything the UI needs to reveal a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub job_id: JobId,
    pub report_word_count: Option<u64>,
    /// `MM:SS` total duration.
    pub elapsed: String,
    /// Stable link to the finished report.
    pub report_url: String,
}

/// Re-arms tracking from a clean state when invoked through
/// [`Tracker::restart`](crate::session::Tracker::restart).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryAction {
    pub job_id: JobId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureNotice {
    pub job_id: JobId,
    pub message: String,
    pub retry: RetryAction,
}

#[derive(Debug, Clone)]
pub struct CompletionHandler {
    api_url: String,
}

impl CompletionHandler {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }

    pub fn summarize(&self, completion: Completion) -> CompletionSummary {
        CompletionSummary {
            report_url: report_url(&self.api_url, &completion.job_id),
            elapsed: format_mm_ss(completion.elapsed_secs),
            report_word_count: completion.report_word_count,
            job_id: completion.job_id,
        }
    }

    pub fn failure(&self, job_id: JobId, message: String) -> FailureNotice {
        FailureNotice {
            retry: RetryAction {
                job_id: job_id.clone(),
            },
            job_id,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_carries_report_link() {
        let handler = CompletionHandler::new("http://localhost:5000");
        let summary = handler.summarize(Completion {
            job_id: JobId::parse("abc").unwrap(),
            report_word_count: Some(12345),
            elapsed_secs: 1865,
        });
        assert_eq!(
            summary.report_url,
            "http://localhost:5000/api/download_report/abc"
        );
        assert_eq!(summary.elapsed, "31:05");
        assert_eq!(summary.report_word_count, Some(12345));
    }

    #[test]
    fn failure_offers_retry_for_same_job() {
        let handler = CompletionHandler::new("http://localhost:5000");
        let job = JobId::parse("abc").unwrap();
        let notice = handler.failure(job.clone(), "timeout".into());
        assert_eq!(notice.message, "timeout");
        assert_eq!(notice.retry.job_id, job);
    }
}
