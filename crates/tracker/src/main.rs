//! `pulse-tracker` -- follow one analysis job from the command line.
//!
//! Logs every progress, stage, and connection update, then exits with
//! status 0 when the job completes and 1 when it fails.
//!
//! ```text
//! pulse-tracker <job-id>
//! ```
//!
//! Configuration is read from the environment (and `.env`); see
//! [`TrackerConfig::from_env`](pulse_tracker::config::TrackerConfig::from_env).

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_tracker::completion::{CompletionSummary, FailureNotice};
use pulse_tracker::config::TrackerConfig;
use pulse_tracker::effect::{FeedEntry, StageStep, Timing};
use pulse_tracker::observer::{ConnectionStatus, LogObserver, ProgressObserver};
use pulse_tracker::reconciler::Outcome;
use pulse_tracker::session::Tracker;

/// Logs through [`LogObserver`] and reports the terminal outcome.
struct CliObserver {
    log: LogObserver,
    outcome: mpsc::UnboundedSender<Outcome>,
}

impl ProgressObserver for CliObserver {
    fn on_progress(&self, percentage: u8, message: &str, stage_key: Option<&str>) {
        self.log.on_progress(percentage, message, stage_key);
    }

    fn on_error(&self, notice: &FailureNotice) {
        self.log.on_error(notice);
        let _ = self.outcome.send(Outcome::Failed);
    }

    fn on_complete(&self, summary: &CompletionSummary) {
        self.log.on_complete(summary);
        let _ = self.outcome.send(Outcome::Completed);
    }

    fn on_stage(&self, previous: Option<&str>, current: &str, step: StageStep) {
        self.log.on_stage(previous, current, step);
    }

    fn on_feed(&self, entry: &FeedEntry) {
        self.log.on_feed(entry);
    }

    fn on_timing(&self, timing: &Timing) {
        self.log.on_timing(timing);
    }

    fn on_connection(&self, status: &ConnectionStatus) {
        self.log.on_connection(status);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_tracker=info,pulse_realtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let job_id = std::env::args()
        .nth(1)
        .context("usage: pulse-tracker <job-id>")?;

    let config = TrackerConfig::from_env()?;
    tracing::info!(
        api_url = %config.api_url,
        ws_url = ?config.ws_url,
        poll_interval_ms = config.poll.interval.as_millis() as u64,
        "Loaded tracker configuration",
    );

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let observer = Arc::new(CliObserver {
        log: LogObserver,
        outcome: outcome_tx,
    });

    let tracker = Tracker::from_config(&config, observer);
    let job_id = tracker.start_tracking(&job_id).await?;

    let outcome = tokio::select! {
        outcome = outcome_rx.recv() => outcome,
        () = shutdown_signal() => None,
    };

    tracker.shutdown().await;

    match outcome {
        Some(Outcome::Completed) => {
            tracing::info!(job_id = %job_id, "Done");
            Ok(())
        }
        Some(Outcome::Failed) => std::process::exit(1),
        None => {
            tracing::info!(job_id = %job_id, "Tracking interrupted");
            Ok(())
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
