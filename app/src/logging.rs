use tracing_subscriber::EnvFilter;

use crate::error::ShellError;

/// Installs the global fmt subscriber. `RUST_LOG` overrides `level`.
pub fn init(level: &str) -> Result<(), ShellError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| ShellError::Logging(err.to_string()))
}
