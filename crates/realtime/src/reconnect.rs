//! Bounded exponential-backoff reconnection for the push channel.
//!
//! When an established session drops, the connection manager calls
//! [`reconnect_loop`], which waits, retries, and grows the delay until a
//! session is restored, the attempt budget runs out, or the
//! [`CancellationToken`] is triggered.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{PushSession, PushTransport};

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Attempts before giving up and reporting failure.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// How a reconnect loop ended.
#[derive(Debug)]
pub enum ReconnectOutcome {
    /// A new session is up after `attempts` tries.
    Connected { session: PushSession, attempts: u32 },
    /// Every attempt failed.
    Exhausted { attempts: u32 },
    /// The token fired first.
    Cancelled,
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Reconnect with bounded exponential backoff.
///
/// Each call starts counting from zero, so a successful reconnect
/// resets the budget for the next drop.
pub async fn reconnect_loop(
    transport: &dyn PushTransport,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> ReconnectOutcome {
    let mut delay = config.initial_delay.min(config.max_delay);
    let mut attempt = 0u32;

    while attempt < config.max_attempts {
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        tracing::info!(
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to push channel",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = transport.connect() => {
                match result {
                    Ok(session) => {
                        tracing::info!(attempt, "Reconnected to push channel");
                        return ReconnectOutcome::Connected { session, attempts: attempt };
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconnect attempt {attempt} failed");
                    }
                }
            }
        }

        delay = next_delay(delay, config);
    }

    tracing::error!(attempts = attempt, "Giving up on push channel");
    ReconnectOutcome::Exhausted { attempts: attempt }
}
