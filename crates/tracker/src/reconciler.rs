//! Progress state reconciliation.
//!
//! [`ReconcilerState`] is the single owner of what the UI believes
//! about one job. It consumes [`ProgressEvent`]s from either update
//! source, in any interleaving, and returns the [`Effect`]s the caller
//! should render. It performs no I/O and never reads the clock; every
//! operation takes `now`.
//!
//! Rules enforced here:
//!
//! - displayed progress never decreases while the job is running;
//! - once terminal, nothing but [`ReconcilerState::restart`] changes state;
//! - a repeated report of the same progress and message is ignored, so
//!   two sources echoing each other do not double the feed;
//! - the feed keeps only the most recent entries.

use std::collections::VecDeque;

use pulse_core::steps::{self, StageDescriptor};
use pulse_core::{JobId, JobStatus, ProgressEvent, Timestamp};

use crate::effect::{Completion, Effect, FeedEntry, StageStep, Timing};

pub const DEFAULT_FEED_CAPACITY: usize = 50;

const COMPLETED_MESSAGE: &str = "Analysis complete";
const RESTART_MESSAGE: &str = "Restarting analysis...";
const FALLBACK_MESSAGE: &str = "Processing...";

/// How a tracking session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

/// Reconciled view of one job.
#[derive(Debug, Clone)]
pub struct ReconcilerState {
    job_id: JobId,
    last_progress: u8,
    last_stage: Option<&'static StageDescriptor>,
    last_message: Option<String>,
    started_at: Timestamp,
    /// Progress reports applied since the last (re)start.
    samples: u32,
    feed: VecDeque<FeedEntry>,
    feed_capacity: usize,
    outcome: Option<Outcome>,
}

impl ReconcilerState {
    pub fn new(job_id: JobId, now: Timestamp) -> Self {
        Self::with_feed_capacity(job_id, now, DEFAULT_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(job_id: JobId, now: Timestamp, feed_capacity: usize) -> Self {
        Self {
            job_id,
            last_progress: 0,
            last_stage: None,
            last_message: None,
            started_at: now,
            samples: 0,
            feed: VecDeque::with_capacity(feed_capacity.min(DEFAULT_FEED_CAPACITY)),
            feed_capacity: feed_capacity.max(1),
            outcome: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn progress(&self) -> u8 {
        self.last_progress
    }

    pub fn stage_key(&self) -> Option<&'static str> {
        self.last_stage.map(|s| s.key)
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Feed entries, oldest first.
    pub fn feed(&self) -> impl Iterator<Item = &FeedEntry> {
        self.feed.iter()
    }

    pub fn feed_len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Merge one event.
    ///
    /// Terminal events are routed to [`mark_complete`](Self::mark_complete)
    /// or [`mark_error`](Self::mark_error). Events for another job, events
    /// after a terminal state, regressions and duplicates produce no
    /// effects.
    pub fn apply_event(&mut self, event: &ProgressEvent, now: Timestamp) -> Vec<Effect> {
        if event.job_id != self.job_id {
            tracing::debug!(
                job_id = %self.job_id,
                event_job_id = %event.job_id,
                "Ignoring event for another job",
            );
            return Vec::new();
        }
        if self.is_terminal() {
            tracing::debug!(job_id = %self.job_id, source = ?event.source, "Ignoring event after terminal state");
            return Vec::new();
        }

        match event.status {
            JobStatus::Completed => self.mark_complete(event.report_word_count, now),
            JobStatus::Error => {
                let message = event.error_message.as_deref().unwrap_or("Analysis failed");
                self.mark_error(message, now)
            }
            JobStatus::Queued | JobStatus::Processing => self.apply_progress(event, now),
        }
    }

    fn apply_progress(&mut self, event: &ProgressEvent, now: Timestamp) -> Vec<Effect> {
        let stage = steps::resolve(event.stage_key.as_deref(), event.stage_label.as_deref());
        let progress = event
            .progress
            .or(stage.map(|s| s.expected_progress))
            .unwrap_or(self.last_progress)
            .min(100);

        if progress < self.last_progress {
            tracing::debug!(
                job_id = %self.job_id,
                progress,
                current = self.last_progress,
                source = ?event.source,
                "Discarding out-of-order progress",
            );
            return Vec::new();
        }

        let message = event
            .stage_label
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| stage.map(|s| s.display_name.to_string()))
            .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());

        if progress == self.last_progress && self.last_message.as_deref() == Some(message.as_str())
        {
            tracing::debug!(job_id = %self.job_id, progress, "Dropping duplicate progress report");
            return Vec::new();
        }

        let mut effects = Vec::with_capacity(4);

        if let Some(stage) = stage {
            if self.last_stage.map(|s| s.key) != Some(stage.key) {
                if let Some(index) = steps::position(stage.key) {
                    effects.push(Effect::StageChanged {
                        previous: self.stage_key(),
                        current: stage.key,
                        step: StageStep {
                            index,
                            total: steps::STEP_CATALOG.len(),
                        },
                    });
                }
                self.last_stage = Some(stage);
            }
        }

        self.last_progress = progress;
        self.last_message = Some(message.clone());
        self.samples += 1;

        effects.push(Effect::Progress {
            percentage: progress,
            message: message.clone(),
            stage_key: self.stage_key(),
        });
        effects.push(Effect::FeedAppended(self.append_feed(message, now)));
        effects.push(Effect::Timing(self.timing(now)));
        effects
    }

    /// Terminal success. Idempotent: only the first call has effects.
    pub fn mark_complete(&mut self, report_word_count: Option<u64>, now: Timestamp) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.outcome = Some(Outcome::Completed);
        self.last_progress = 100;
        self.last_stage = steps::by_key("completed");
        self.last_message = Some(COMPLETED_MESSAGE.to_string());

        tracing::info!(job_id = %self.job_id, ?report_word_count, "Job completed");

        let timing = self.timing(now);
        vec![
            Effect::StopSources,
            Effect::Progress {
                percentage: 100,
                message: COMPLETED_MESSAGE.to_string(),
                stage_key: self.stage_key(),
            },
            Effect::FeedAppended(self.append_feed(COMPLETED_MESSAGE.to_string(), now)),
            Effect::Timing(timing),
            Effect::Completed(Completion {
                job_id: self.job_id.clone(),
                report_word_count,
                elapsed_secs: timing.elapsed_secs,
            }),
        ]
    }

    /// Terminal failure. Idempotent: only the first call has effects.
    pub fn mark_error(&mut self, message: &str, now: Timestamp) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.outcome = Some(Outcome::Failed);
        self.last_message = Some(message.to_string());

        tracing::warn!(job_id = %self.job_id, error = message, "Job failed");

        vec![
            Effect::StopSources,
            Effect::FeedAppended(self.append_feed(format!("Error: {message}"), now)),
            Effect::Failed {
                message: message.to_string(),
            },
        ]
    }

    /// Clear everything and start over, optionally for a new job.
    pub fn restart(&mut self, job_id: JobId, now: Timestamp) -> Vec<Effect> {
        tracing::info!(previous = %self.job_id, job_id = %job_id, "Restarting tracking");
        *self = Self::with_feed_capacity(job_id, now, self.feed_capacity);
        vec![
            Effect::Progress {
                percentage: 0,
                message: RESTART_MESSAGE.to_string(),
                stage_key: None,
            },
            Effect::Timing(self.timing(now)),
        ]
    }

    /// Refresh the time display. Nothing to do once terminal.
    pub fn tick(&self, now: Timestamp) -> Option<Effect> {
        (!self.is_terminal()).then(|| Effect::Timing(self.timing(now)))
    }

    /// Linear extrapolation from elapsed time and current progress.
    ///
    /// The first report after a (re)start carries no rate information,
    /// so nothing is estimated until a second one has been applied.
    pub fn timing(&self, now: Timestamp) -> Timing {
        let elapsed_secs = (now - self.started_at).num_seconds().max(0) as u64;
        let remaining_secs = if self.is_terminal() || self.samples < 2 {
            None
        } else {
            estimate_remaining(elapsed_secs, self.last_progress)
        };
        Timing {
            elapsed_secs,
            remaining_secs,
        }
    }

    fn append_feed(&mut self, message: String, now: Timestamp) -> FeedEntry {
        let entry = FeedEntry { at: now, message };
        while self.feed.len() >= self.feed_capacity {
            self.feed.pop_front();
        }
        self.feed.push_back(entry.clone());
        entry
    }
}

/// `remaining = elapsed / (progress / 100) - elapsed`, only for
/// `0 < progress < 100` and once some time has passed.
fn estimate_remaining(elapsed_secs: u64, progress: u8) -> Option<u64> {
    if progress == 0 || progress >= 100 || elapsed_secs == 0 {
        return None;
    }
    let elapsed = elapsed_secs as f64;
    let total = elapsed / (f64::from(progress) / 100.0);
    Some((total - elapsed).max(0.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};
    use pulse_core::EventSource;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> Timestamp {
        t0() + Duration::seconds(secs)
    }

    fn job() -> JobId {
        JobId::parse("job-1").unwrap()
    }

    fn progress(pct: u8) -> ProgressEvent {
        ProgressEvent::processing(job(), pct, EventSource::Push)
    }

    fn state() -> ReconcilerState {
        ReconcilerState::new(job(), t0())
    }

    #[test]
    fn out_of_order_progress_is_discarded() {
        let mut state = state();
        assert!(!state.apply_event(&progress(10), at(5)).is_empty());
        assert!(state.apply_event(&progress(5), at(6)).is_empty());
        assert_eq!(state.progress(), 10);
        assert_eq!(state.feed_len(), 1);
    }

    #[test]
    fn progress_is_monotonic_across_interleaved_sources() {
        let mut state = state();
        let reports = [
            (10, EventSource::Push),
            (8, EventSource::Poll),
            (30, EventSource::Poll),
            (25, EventSource::Push),
            (30, EventSource::Push),
            (45, EventSource::Push),
            (40, EventSource::Poll),
        ];
        let mut shown = Vec::new();
        for (i, (pct, source)) in reports.into_iter().enumerate() {
            let event = ProgressEvent::processing(job(), pct, source);
            for effect in state.apply_event(&event, at(i as i64)) {
                if let Effect::Progress { percentage, .. } = effect {
                    shown.push(percentage);
                }
            }
        }
        assert_eq!(shown, vec![10, 30, 45]);
        assert!(shown.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn same_progress_and_message_is_a_duplicate() {
        let mut state = state();
        let push = progress(30).with_label("Coletando dados...");
        let poll = ProgressEvent::processing(job(), 30, EventSource::Poll).with_label("Coletando dados...");
        assert!(!state.apply_event(&push, at(1)).is_empty());
        assert!(state.apply_event(&poll, at(2)).is_empty());

        // Same percentage with a new message still lands in the feed.
        let next = progress(30).with_label("Analisando concorrentes...");
        assert!(!state.apply_event(&next, at(3)).is_empty());
        assert_eq!(state.feed_len(), 2);
    }

    #[test]
    fn stage_resolves_from_key_then_label() {
        let mut state = state();
        let effects = state.apply_event(&progress(45).with_stage_key("psychology_analysis"), at(60));
        assert_matches!(
            effects.first(),
            Some(Effect::StageChanged { previous: None, current: "psychology_analysis", step }) => {
                assert_eq!(step.index, steps::position("psychology_analysis").unwrap());
                assert_eq!(step.total, steps::STEP_CATALOG.len());
            }
        );
        assert_eq!(state.stage_key(), Some("psychology_analysis"));

        let effects = state.apply_event(&progress(80).with_label("Gerando relatório final..."), at(90));
        assert_matches!(
            effects.first(),
            Some(Effect::StageChanged {
                previous: Some("psychology_analysis"),
                current: "report_generation",
                ..
            })
        );
    }

    #[test]
    fn unknown_stage_keeps_previous_stage() {
        let mut state = state();
        state.apply_event(&progress(30).with_stage_key("data_collection"), at(1));
        let effects = state.apply_event(&progress(35).with_label("Something unrelated"), at(2));
        assert!(!effects.iter().any(|e| matches!(e, Effect::StageChanged { .. })));
        assert_eq!(state.stage_key(), Some("data_collection"));
        assert_matches!(
            effects.first(),
            Some(Effect::Progress { percentage: 35, message, .. }) => {
                assert_eq!(message, "Something unrelated");
            }
        );
    }

    #[test]
    fn missing_progress_uses_stage_threshold() {
        let mut state = state();
        let mut event = progress(0).with_label("Processando dados coletados");
        event.progress = None;
        state.apply_event(&event, at(1));
        assert_eq!(state.progress(), 60);
        assert_eq!(state.stage_key(), Some("analysis_processing"));
    }

    #[test]
    fn feed_keeps_most_recent_fifty() {
        let mut state = state();
        for pct in 0..=50u8 {
            state.apply_event(&progress(pct).with_label(format!("step {pct}")), at(i64::from(pct)));
        }
        assert_eq!(state.feed_len(), DEFAULT_FEED_CAPACITY);
        let first = state.feed().next().unwrap();
        assert_eq!(first.message, "step 1");
        let last = state.feed().last().unwrap();
        assert_eq!(last.message, "step 50");
    }

    #[test]
    fn remaining_time_is_linear_extrapolation() {
        let mut state = state();
        state.apply_event(&progress(10), at(120));
        state.apply_event(&progress(25), at(300));
        let timing = state.timing(at(300));
        assert_eq!(timing.elapsed_secs, 300);
        assert_eq!(timing.remaining_secs, Some(900));
        assert_eq!(timing.elapsed_display(), "05:00");
        assert_eq!(timing.remaining_display().as_deref(), Some("15:00"));
    }

    #[test]
    fn no_estimate_without_signal() {
        let mut state = state();
        assert_eq!(state.timing(at(30)).remaining_secs, None);

        state.apply_event(&progress(10), t0());
        assert_eq!(state.timing(t0()).remaining_secs, None);
    }

    #[test]
    fn first_report_is_not_extrapolated() {
        let mut state = state();
        let effects = state.apply_event(&progress(25), at(300));
        assert_eq!(
            effects.last(),
            Some(&Effect::Timing(Timing {
                elapsed_secs: 300,
                remaining_secs: None,
            }))
        );
        assert_eq!(state.timing(at(310)).remaining_secs, None);

        let effects = state.apply_event(&progress(50), at(600));
        assert_matches!(
            effects.last(),
            Some(Effect::Timing(Timing { remaining_secs: Some(600), .. }))
        );
    }

    #[test]
    fn restart_resets_the_estimate() {
        let mut state = state();
        state.apply_event(&progress(10), at(10));
        state.apply_event(&progress(20), at(20));
        assert!(state.timing(at(20)).remaining_secs.is_some());

        state.restart(job(), at(30));
        state.apply_event(&progress(40), at(90));
        assert_eq!(state.timing(at(90)).remaining_secs, None);
    }

    #[test]
    fn completion_fires_once_and_freezes_state() {
        let mut state = state();
        state.apply_event(&progress(60), at(100));

        let done = ProgressEvent::completed(job(), Some(12345), EventSource::Poll);
        let effects = state.apply_event(&done, at(200));
        assert_matches!(effects.first(), Some(Effect::StopSources));
        let completions: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Completed(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].report_word_count, Some(12345));
        assert_eq!(completions[0].elapsed_secs, 200);
        assert_eq!(state.progress(), 100);

        let again = ProgressEvent::completed(job(), Some(1), EventSource::Push);
        assert!(state.apply_event(&again, at(201)).is_empty());
        assert!(state.mark_complete(None, at(202)).is_empty());
        assert!(state.apply_event(&progress(99), at(203)).is_empty());
        assert!(state.tick(at(204)).is_none());
        assert_eq!(state.outcome(), Some(Outcome::Completed));
    }

    #[test]
    fn error_fires_once_and_blocks_completion() {
        let mut state = state();
        let failed = ProgressEvent::error(job(), "timeout", EventSource::Push);
        let effects = state.apply_event(&failed, at(10));
        assert_eq!(
            effects.last(),
            Some(&Effect::Failed {
                message: "timeout".into()
            })
        );
        assert!(state.mark_error("again", at(11)).is_empty());

        let done = ProgressEvent::completed(job(), None, EventSource::Poll);
        assert!(state.apply_event(&done, at(12)).is_empty());
        assert_eq!(state.outcome(), Some(Outcome::Failed));
        assert_eq!(state.progress(), 0);
    }

    #[test]
    fn restart_clears_everything() {
        let mut state = state();
        state.apply_event(&progress(70).with_stage_key("mental_drivers"), at(10));
        state.mark_error("boom", at(20));

        let new_job = JobId::parse("job-2").unwrap();
        let effects = state.restart(new_job.clone(), at(30));
        assert_matches!(effects.first(), Some(Effect::Progress { percentage: 0, .. }));
        assert_eq!(state.job_id(), &new_job);
        assert_eq!(state.progress(), 0);
        assert_eq!(state.feed_len(), 0);
        assert!(!state.is_terminal());
        assert_eq!(state.stage_key(), None);
        assert_eq!(state.started_at(), at(30));

        // Events for the superseded job no longer apply.
        assert!(state.apply_event(&progress(90), at(31)).is_empty());
    }
}
