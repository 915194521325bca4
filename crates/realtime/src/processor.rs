//! Interpretation of inbound push messages.
//!
//! Turns a parsed [`ServerMessage`] into the [`PushEvent`] handlers see,
//! normalizing job payloads into the shared [`ProgressEvent`] shape so
//! the reconciler cannot tell which source produced them.

use pulse_core::progress::percent_from_wire;
use pulse_core::{EventSource, JobId, JobStatus, ProgressEvent};

use crate::events::PushEvent;
use crate::messages::{CompleteData, ErrorData, ProgressData, ServerMessage};

/// Convert a server message into a handler-facing event.
pub fn interpret(msg: ServerMessage) -> PushEvent {
    match msg {
        ServerMessage::Connected(data) => PushEvent::ServerHello {
            message: data.message,
        },
        ServerMessage::JoinedAnalysis(data) => PushEvent::RoomJoined {
            job_id: data.analysis_id,
        },
        ServerMessage::LeftAnalysis(data) => PushEvent::RoomLeft {
            job_id: data.analysis_id,
        },
        ServerMessage::AnalysisProgress(data) => PushEvent::Job(progress_event(data)),
        ServerMessage::AnalysisComplete(data) => PushEvent::Job(complete_event(data)),
        ServerMessage::AnalysisError(data) => PushEvent::Job(error_event(data)),
    }
}

fn progress_event(data: ProgressData) -> ProgressEvent {
    let progress = data.progress.and_then(|raw| match percent_from_wire(raw) {
        Ok(pct) => Some(pct),
        Err(e) => {
            tracing::warn!(job_id = %data.analysis_id, error = %e, "Ignoring progress value");
            None
        }
    });

    ProgressEvent {
        job_id: data.analysis_id,
        status: JobStatus::Processing,
        progress,
        stage_key: data.step,
        stage_label: data.message.or(data.current_step),
        report_word_count: None,
        error_message: None,
        source: EventSource::Push,
    }
}

fn complete_event(data: CompleteData) -> ProgressEvent {
    ProgressEvent::completed(data.analysis_id, data.report_word_count, EventSource::Push)
}

fn error_event(data: ErrorData) -> ProgressEvent {
    ProgressEvent::error(data.analysis_id, data.error, EventSource::Push)
}

/// Whether an event must be dropped because its job is no longer
/// subscribed.
pub fn is_stale(event: &PushEvent, is_subscribed: impl Fn(&JobId) -> bool) -> bool {
    match event {
        PushEvent::Job(job) => !is_subscribed(&job.job_id),
        _ => false,
    }
}
