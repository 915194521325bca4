//! State-change descriptions emitted by the reconciler.

use pulse_core::time_format::format_mm_ss;
use pulse_core::{JobId, Timestamp};
use serde::Serialize;

/// One line of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub at: Timestamp,
    pub message: String,
}

/// Elapsed and estimated-remaining time, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub elapsed_secs: u64,
    /// `None` when there is not enough signal to extrapolate.
    pub remaining_secs: Option<u64>,
}

impl Timing {
    pub fn elapsed_display(&self) -> String {
        format_mm_ss(self.elapsed_secs)
    }

    pub fn remaining_display(&self) -> Option<String> {
        self.remaining_secs.map(format_mm_ss)
    }
}

/// Where a stage sits in the timeline, zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageStep {
    pub index: usize,
    pub total: usize,
}

impl StageStep {
    /// "step N of M"
    pub fn display(&self) -> String {
        format!("step {} of {}", self.index + 1, self.total)
    }
}

/// What the reconciler knows about a successfully finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub job_id: JobId,
    pub report_word_count: Option<u64>,
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Displayed progress changed.
    Progress {
        percentage: u8,
        message: String,
        stage_key: Option<&'static str>,
    },
    /// The resolved stage crossed a boundary.
    StageChanged {
        previous: Option<&'static str>,
        current: &'static str,
        step: StageStep,
    },
    FeedAppended(FeedEntry),
    Timing(Timing),
    /// Emitted at most once per tracking session.
    Completed(Completion),
    /// Emitted at most once per tracking session.
    Failed { message: String },
    /// Both update sources must be torn down.
    StopSources,
}
