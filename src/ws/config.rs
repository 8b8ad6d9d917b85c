#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

/// Environment variable overriding [`Config::url`] in [`Config::from_env`].
pub const URL_VAR: &str = "REALTIME_WS_URL";
/// Environment variable enabling [`Config::debug`] in [`Config::from_env`].
pub const DEBUG_VAR: &str = "REALTIME_DEBUG";

const DEFAULT_URL: &str = "ws://127.0.0.1:6001/app";
const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_millis(3000);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_millis(30_000);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Configuration for the realtime connection.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint the transport connects to
    pub url: String,
    /// Interval between heartbeat pings while connected
    pub heartbeat_interval: Duration,
    /// When set, a connection with no inbound frame for this long is treated as dead
    pub heartbeat_timeout: Option<Duration>,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
    /// Emit diagnostic logging for envelopes and state transitions
    pub debug: bool,
    /// Replay subscriptions before draining queued messages on open
    pub replay_before_drain: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            heartbeat_timeout: None,
            reconnect: ReconnectConfig::default(),
            debug: false,
            replay_before_drain: false,
        }
    }
}

impl Config {
    /// Default configuration pointed at `url`.
    #[must_use]
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Default configuration with [`URL_VAR`] and [`DEBUG_VAR`] applied when present.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(URL_VAR) {
            config.url = url;
        }
        if let Ok(debug) = std::env::var(DEBUG_VAR) {
            config.debug = matches!(debug.trim(), "1" | "true" | "TRUE" | "yes");
        }
        config
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay, doubled for every consecutive failed attempt
    pub interval: Duration,
    /// Number of scheduled retries before giving up
    pub max_attempts: u32,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL_DURATION,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (zero-based): `min(interval * 2^attempt, max_backoff)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.interval.saturating_mul(factor).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_doubles() {
        let config = ReconnectConfig {
            interval: Duration::from_millis(1000),
            ..ReconnectConfig::default()
        };

        let delays: Vec<_> = (0..3).map(|n| config.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[test]
    fn backoff_respects_max() {
        let config = ReconnectConfig::default();

        assert_eq!(config.delay_for(3), Duration::from_millis(24_000));
        assert_eq!(config.delay_for(4), Duration::from_millis(30_000));
        assert_eq!(config.delay_for(40), Duration::from_millis(30_000));
    }

    #[test]
    fn backoff_is_non_decreasing() {
        let config = ReconnectConfig::default();

        let delays: Vec<_> = (0..16).map(|n| config.delay_for(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect.interval, Duration::from_millis(3000));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert!(config.heartbeat_timeout.is_none());
        assert!(!config.debug);
    }
}
