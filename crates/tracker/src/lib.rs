//! Progress tracking for long-running analysis jobs.
//!
//! [`ReconcilerState`](reconciler::ReconcilerState) merges events from
//! the push channel and the polling driver into one view of a job and
//! describes every change as an [`Effect`](effect::Effect).
//! [`Tracker`](session::Tracker) wires both sources to it and renders
//! the effects through a [`ProgressObserver`](observer::ProgressObserver).

pub mod completion;
pub mod config;
pub mod effect;
pub mod observer;
pub mod reconciler;
pub mod session;

use pulse_core::CoreError;

use crate::config::ConfigError;

/// Top-level error type for the tracker crate.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
