use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use util::mb_to_bytes;

/// Default mitigation threshold, in MiB.
pub const DEFAULT_THRESHOLD_MB: u64 = 500;
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Settings for one watchdog run. Fixed once the watchdog starts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MonitorConfig {
    threshold_bytes: u64,
    check_interval: Duration,
    idle_timeout: Duration,
}

impl MonitorConfig {
    /// Creates a config, rejecting a zero threshold, interval or timeout.
    pub fn new(
        threshold_bytes: u64,
        check_interval: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if threshold_bytes == 0 {
            return Err(ConfigError::Zero("threshold_bytes"));
        }
        if check_interval.is_zero() {
            return Err(ConfigError::Zero("check_interval"));
        }
        if idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle_timeout"));
        }

        Ok(Self {
            threshold_bytes,
            check_interval,
            idle_timeout,
        })
    }

    /// Usage strictly above this many bytes triggers mitigation.
    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_bytes
    }

    /// Returns the time between ticks.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Views untouched for strictly longer than this are closed.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: mb_to_bytes(DEFAULT_THRESHOLD_MB),
            check_interval: DEFAULT_CHECK_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// On-disk form of [`MonitorConfig`]. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfigFile {
    pub threshold_mb: Option<u64>,
    /// Takes precedence over `threshold_mb`.
    pub threshold_bytes: Option<u64>,
    pub check_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

impl MonitorConfigFile {
    /// Fills missing keys from the defaults and validates the result.
    pub fn resolve(&self) -> Result<MonitorConfig, ConfigError> {
        let defaults = MonitorConfig::default();
        let threshold_bytes = self
            .threshold_bytes
            .or(self.threshold_mb.map(mb_to_bytes))
            .unwrap_or(defaults.threshold_bytes);
        let check_interval = self
            .check_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.check_interval);
        let idle_timeout = self
            .idle_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);

        MonitorConfig::new(threshold_bytes, check_interval, idle_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shell_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.threshold_bytes(), 500 * 1024 * 1024);
        assert_eq!(config.check_interval(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn rejects_zero_values() {
        let second = Duration::from_secs(1);
        assert!(matches!(
            MonitorConfig::new(0, second, second),
            Err(ConfigError::Zero("threshold_bytes"))
        ));
        assert!(matches!(
            MonitorConfig::new(1, Duration::ZERO, second),
            Err(ConfigError::Zero("check_interval"))
        ));
        assert!(matches!(
            MonitorConfig::new(1, second, Duration::ZERO),
            Err(ConfigError::Zero("idle_timeout"))
        ));
    }

    fn parse(input: &str) -> Result<MonitorConfig, ConfigError> {
        toml::from_str::<MonitorConfigFile>(input)
            .expect("valid watchdog table")
            .resolve()
    }

    #[test]
    fn empty_table_uses_defaults() {
        assert_eq!(parse("").unwrap(), MonitorConfig::default());
    }

    #[test]
    fn reads_watchdog_table() {
        let config = parse(
            r#"
            threshold_mb = 256
            check_interval_secs = 10
            idle_timeout_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.threshold_bytes(), 256 * 1024 * 1024);
        assert_eq!(config.check_interval(), Duration::from_secs(10));
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn threshold_bytes_wins_over_megabytes() {
        let config = parse("threshold_mb = 256\nthreshold_bytes = 1000\n").unwrap();
        assert_eq!(config.threshold_bytes(), 1000);
        assert_eq!(config.check_interval(), DEFAULT_CHECK_INTERVAL);
    }

    #[test]
    fn rejects_unknown_and_zero_keys() {
        assert!(toml::from_str::<MonitorConfigFile>("threshold = 5\n").is_err());
        assert!(matches!(
            parse("idle_timeout_secs = 0\n"),
            Err(ConfigError::Zero("idle_timeout"))
        ));
    }
}
