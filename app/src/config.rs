use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;
use watchdog::{MonitorConfig, MonitorConfigFile};

use crate::error::ShellError;

const CONFIG_ENV: &str = "VIGIL_CONFIG";
const CONFIG_DIR: &str = "vigil-shell";
const CONFIG_FILE: &str = "watchdog.toml";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Contents of `watchdog.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    log_level: Option<String>,
    watchdog: MonitorConfigFile,
}

impl ShellConfig {
    /// `$VIGIL_CONFIG`, else `<config dir>/vigil-shell/watchdog.toml`.
    pub fn locate() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ShellError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ShellError::ReadConfig {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ShellError> {
        let config: Self = toml::from_str(input)?;
        // Validate eagerly so a bad file is reported as a whole.
        config.watchdog.resolve()?;
        Ok(config)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        self.watchdog.resolve().unwrap_or_else(|err| {
            warn!(error = %err, "invalid watchdog settings, using defaults");
            MonitorConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_when_empty() {
        let config = ShellConfig::from_toml_str("").unwrap();
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.monitor_config(), MonitorConfig::default());
    }

    #[test]
    fn reads_log_level_and_watchdog() {
        let config = ShellConfig::from_toml_str(
            r#"
            log_level = "debug"

            [watchdog]
            threshold_mb = 300
            idle_timeout_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level(), "debug");
        let monitor = config.monitor_config();
        assert_eq!(monitor.threshold_bytes(), 300 * 1024 * 1024);
        assert_eq!(monitor.idle_timeout(), Duration::from_secs(120));
        assert_eq!(monitor.check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            ShellConfig::from_toml_str("[watchdog]\ncheck_interval_secs = 0\n"),
            Err(ShellError::Watchdog(_))
        ));
        assert!(matches!(
            ShellConfig::from_toml_str("colour = \"blue\"\n"),
            Err(ShellError::ParseConfig(_))
        ));
    }

    #[test]
    fn missing_file_means_defaults() {
        let path = std::env::temp_dir().join("vigil-shell-does-not-exist.toml");
        let config = ShellConfig::load(&path).unwrap();
        assert_eq!(config.log_level(), "info");
    }
}
