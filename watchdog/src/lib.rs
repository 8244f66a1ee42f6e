//! Memory watchdog for the shell process.
//!
//! A [`MemoryWatchdog`] samples the process's private memory on a repeating
//! tick. Over the configured threshold it runs the optional GC hook and asks
//! every live view to clear its cache and release renderer memory. Every
//! tick, over threshold or not, it also closes views idle for longer than the
//! idle timeout.

mod acks;
mod config;
mod monitor;
mod ticker;

pub use acks::{ack_channel, AckReceiver, AckSender, ReleaseAck};
pub use config::{
    ConfigError, MonitorConfig, MonitorConfigFile, DEFAULT_CHECK_INTERVAL, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_THRESHOLD_MB,
};
pub use monitor::{
    GcOutcome, MemoryWatchdog, TickOutcome, TickReport, WatchdogBuilder, WatchdogError,
    WatchdogState,
};
pub use ticker::{ManualTicker, TickCallback, TickHandle, TickSource};
