use std::io;
use std::path::PathBuf;

use thiserror::Error;
use watchdog::ConfigError;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid shell config: {0}")]
    ParseConfig(#[from] toml::de::Error),
    #[error(transparent)]
    Watchdog(#[from] ConfigError),
    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}
