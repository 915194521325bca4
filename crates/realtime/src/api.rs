//! REST client for the job status endpoint.
//!
//! Wraps `GET /api/analysis_status/{id}` using [`reqwest`] and exposes it
//! through the [`StatusSource`] seam the polling driver depends on.

use async_trait::async_trait;
use pulse_core::progress::percent_from_wire;
use pulse_core::{EventSource, JobId, JobStatus, ProgressEvent};
use serde::Deserialize;

/// Message used when a job fails without server-provided detail.
pub const DEFAULT_ERROR_MESSAGE: &str = "Analysis failed";

/// HTTP client for the status API.
pub struct StatusApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body returned by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub report_word_count: Option<u64>,
}

/// Errors from the status API layer.
#[derive(Debug, thiserror::Error)]
pub enum StatusApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Status API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Something that can report the current status of a job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, StatusApiError>;
}

impl StatusResponse {
    /// Normalize into the event shape shared with the push channel.
    ///
    /// `current_step` is a stage key when it names one, and otherwise
    /// only a label; the reconciler resolves both the same way.
    pub fn into_event(self, job_id: JobId) -> ProgressEvent {
        match self.status {
            JobStatus::Completed => {
                ProgressEvent::completed(job_id, self.report_word_count, EventSource::Poll)
            }
            JobStatus::Error => ProgressEvent::error(
                job_id,
                self.error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                EventSource::Poll,
            ),
            status @ (JobStatus::Queued | JobStatus::Processing) => {
                let progress = self.progress.and_then(|raw| match percent_from_wire(raw) {
                    Ok(pct) => Some(pct),
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Ignoring polled progress value");
                        None
                    }
                });
                ProgressEvent {
                    job_id,
                    status,
                    progress,
                    stage_key: self.current_step.clone(),
                    stage_label: self.current_step,
                    report_word_count: None,
                    error_message: None,
                    source: EventSource::Poll,
                }
            }
        }
    }
}

impl StatusApi {
    /// Create a new client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:5000`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Retrieve the current status of a job.
    pub async fn get_status(&self, job_id: &JobId) -> Result<StatusResponse, StatusApiError> {
        let response = self
            .client
            .get(format!("{}/api/analysis_status/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or return a
    /// [`StatusApiError::ApiError`] carrying the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StatusApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StatusApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StatusApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl StatusSource for StatusApi {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse, StatusApiError> {
        self.get_status(job_id).await
    }
}

/// Build the report download link for a base API URL.
pub fn report_url(api_url: &str, job_id: &JobId) -> String {
    format!(
        "{}/api/download_report/{}",
        api_url.trim_end_matches('/'),
        job_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn job() -> JobId {
        JobId::parse("a1").unwrap()
    }

    fn parse(json: &str) -> StatusResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn processing_status_keeps_step_as_key_and_label() {
        let event = parse(
            r#"{"status":"processing","progress":45,"current_step":"psychology_analysis","estimated_completion":null,"error_message":null,"completed_at":null}"#,
        )
        .into_event(job());

        assert_eq!(event.status, JobStatus::Processing);
        assert_eq!(event.progress, Some(45));
        assert_eq!(event.stage_key.as_deref(), Some("psychology_analysis"));
        assert_eq!(event.source, EventSource::Poll);
    }

    #[test]
    fn pending_is_queued() {
        let event = parse(r#"{"status":"pending","progress":0}"#).into_event(job());
        assert_eq!(event.status, JobStatus::Queued);
        assert_eq!(event.progress, Some(0));
    }

    #[test]
    fn error_without_message_uses_default() {
        let event = parse(r#"{"status":"error","error_message":null}"#).into_event(job());
        assert_eq!(event.error_message.as_deref(), Some(DEFAULT_ERROR_MESSAGE));

        let event = parse(r#"{"status":"error","error_message":"model timeout"}"#).into_event(job());
        assert_eq!(event.error_message.as_deref(), Some("model timeout"));
    }

    #[test]
    fn completed_reports_full_progress() {
        let event = parse(r#"{"status":"completed","progress":100,"report_word_count":20110}"#)
            .into_event(job());
        assert_eq!(event.progress, Some(100));
        assert_eq!(event.report_word_count, Some(20110));
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let result: Result<StatusResponse, _> = serde_json::from_str(r#"{"status":"exploded"}"#);
        assert_matches!(result, Err(_));
    }

    #[test]
    fn report_url_trims_trailing_slash() {
        assert_eq!(
            report_url("http://localhost:5000/", &job()),
            "http://localhost:5000/api/download_report/a1"
        );
    }
}
