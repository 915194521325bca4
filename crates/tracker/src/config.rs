use std::time::Duration;

use pulse_realtime::poller::PollConfig;
use pulse_realtime::reconnect::ReconnectConfig;

use crate::reconciler::DEFAULT_FEED_CAPACITY;

/// Tracker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend on port 5000.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Base URL of the HTTP API.
    pub api_url: String,
    /// Push-channel endpoint. `None` disables the push channel and
    /// leaves polling as the only source.
    pub ws_url: Option<String>,
    pub poll: PollConfig,
    pub reconnect: ReconnectConfig,
    pub feed_capacity: usize,
    /// Cadence of the elapsed/remaining time refresh.
    pub tick_interval: Duration,
}

/// Errors from reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".into(),
            ws_url: None,
            poll: PollConfig::default(),
            reconnect: ReconnectConfig::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            tick_interval: Duration::from_millis(1000),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `PULSE_API_URL`                | `http://localhost:5000`  |
    /// | `PULSE_WS_URL`                 | unset (push disabled)    |
    /// | `PULSE_POLL_INTERVAL_MS`       | `2000`                   |
    /// | `PULSE_MAX_POLL_FAILURES`      | `1`                      |
    /// | `PULSE_RECONNECT_ATTEMPTS`     | `5`                      |
    /// | `PULSE_RECONNECT_DELAY_MS`     | `1000`                   |
    /// | `PULSE_RECONNECT_MAX_DELAY_MS` | `5000`                   |
    /// | `PULSE_FEED_CAPACITY`          | `50`                     |
    /// | `PULSE_TICK_INTERVAL_MS`       | `1000`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = get("PULSE_API_URL")
            .unwrap_or(defaults.api_url)
            .trim_end_matches('/')
            .to_string();
        let ws_url = get("PULSE_WS_URL");

        let poll = PollConfig {
            interval: millis(&get, "PULSE_POLL_INTERVAL_MS", defaults.poll.interval)?,
            max_consecutive_failures: positive(
                &get,
                "PULSE_MAX_POLL_FAILURES",
                defaults.poll.max_consecutive_failures,
            )?,
        };

        let reconnect = ReconnectConfig {
            max_attempts: positive(
                &get,
                "PULSE_RECONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            )?,
            initial_delay: millis(
                &get,
                "PULSE_RECONNECT_DELAY_MS",
                defaults.reconnect.initial_delay,
            )?,
            max_delay: millis(
                &get,
                "PULSE_RECONNECT_MAX_DELAY_MS",
                defaults.reconnect.max_delay,
            )?,
            ..defaults.reconnect
        };

        let feed_capacity = positive(&get, "PULSE_FEED_CAPACITY", defaults.feed_capacity as u32)?
            as usize;
        let tick_interval = millis(&get, "PULSE_TICK_INTERVAL_MS", defaults.tick_interval)?;

        Ok(Self {
            api_url,
            ws_url,
            poll,
            reconnect,
            feed_capacity,
            tick_interval,
        })
    }
}

fn millis(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(u64::from(positive(
        get,
        var,
        default.as_millis() as u32,
    )?)))
}

fn positive(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    let Some(value) = get(var) else {
        return Ok(default);
    };
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            expected: "a positive integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<TrackerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TrackerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api_url, "http://localhost:5000");
        assert!(config.ws_url.is_none());
        assert_eq!(config.poll.interval, Duration::from_millis(2000));
        assert_eq!(config.poll.max_consecutive_failures, 1);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(5));
        assert_eq!(config.feed_capacity, 50);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("PULSE_API_URL", "https://analysis.example.com/"),
            ("PULSE_WS_URL", "wss://analysis.example.com/ws"),
            ("PULSE_POLL_INTERVAL_MS", "500"),
            ("PULSE_MAX_POLL_FAILURES", "3"),
            ("PULSE_RECONNECT_ATTEMPTS", "2"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "https://analysis.example.com");
        assert_eq!(config.ws_url.as_deref(), Some("wss://analysis.example.com/ws"));
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.max_consecutive_failures, 3);
        assert_eq!(config.reconnect.max_attempts, 2);
    }

    #[test]
    fn blank_ws_url_means_disabled() {
        let config = load(&[("PULSE_WS_URL", "  ")]).unwrap();
        assert!(config.ws_url.is_none());
    }

    #[test]
    fn invalid_values_are_errors() {
        assert_matches!(
            load(&[("PULSE_POLL_INTERVAL_MS", "fast")]),
            Err(ConfigError::Invalid { var: "PULSE_POLL_INTERVAL_MS", .. })
        );
        assert_matches!(
            load(&[("PULSE_FEED_CAPACITY", "0")]),
            Err(ConfigError::Invalid { var: "PULSE_FEED_CAPACITY", .. })
        );
    }
}
