use gtk::glib;
use tracing::warn;

mod app;
mod assets;
mod config;
mod error;
mod logging;

use config::ShellConfig;

fn main() -> glib::ExitCode {
    let (shell_config, load_error) = match ShellConfig::locate() {
        Some(path) => match ShellConfig::load(&path) {
            Ok(config) => (config, None),
            Err(err) => (ShellConfig::default(), Some(err)),
        },
        None => (ShellConfig::default(), None),
    };

    if let Err(err) = logging::init(shell_config.log_level()) {
        eprintln!("Failed to initialise logging: {err}");
    }
    if let Some(err) = load_error {
        warn!(error = %err, "ignoring shell config, using defaults");
    }

    let monitor_config = shell_config.monitor_config();
    app::run(monitor_config)
}
