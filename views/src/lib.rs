use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

mod registry;

pub use registry::{LiveView, RegistryError, ViewRegistry};

/// Stable identifier for an open view. Never reused within a process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ViewId(u64);

impl ViewId {
    /// Creates a new `ViewId` from a raw numeric value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure reported by a view's cache-clear operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheClearError {
    /// The view has no content session to clear.
    #[error("view has no content session")]
    NoSession,
    /// The view was destroyed before the clear ran.
    #[error("view is no longer alive")]
    Destroyed,
    /// The engine reported an error.
    #[error("engine failed to clear cache: {0}")]
    Engine(String),
}

/// Completion callback for [`ViewHandle::clear_cache`]. Called exactly once.
pub type CacheClearCallback = Box<dyn FnOnce(Result<(), CacheClearError>) + 'static>;

/// One open window or surface, as seen by the watchdog.
///
/// Rendering is not the watchdog's concern; it only needs to ask a view to
/// drop caches, nudge its renderer, or go away.
pub trait ViewHandle {
    /// Returns the id this handle was registered under.
    fn id(&self) -> ViewId;

    /// False once the underlying window has been destroyed.
    fn is_alive(&self) -> bool;

    /// Requests that the window close. Completion is signalled by the
    /// window's close event, not by this call returning.
    fn close(&self);

    /// Clears the content session's caches, reporting the result via `done`.
    fn clear_cache(&self, done: CacheClearCallback);

    /// Sends a one-way named signal to the view's renderer.
    fn send_signal(&self, name: &str);
}

/// Returns true if a view last touched at `last_interaction` has been idle
/// for strictly longer than `idle_timeout` at `now`.
pub fn is_idle(last_interaction: Instant, now: Instant, idle_timeout: Duration) -> bool {
    now.saturating_duration_since(last_interaction) > idle_timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_requires_strictly_more_than_timeout() {
        let start = Instant::now();
        let timeout = Duration::from_secs(300);

        assert!(!is_idle(start, start, timeout));
        assert!(!is_idle(start, start + timeout, timeout));
        assert!(is_idle(start, start + timeout + Duration::from_millis(1), timeout));
    }

    #[test]
    fn interaction_in_the_future_is_not_idle() {
        let now = Instant::now();
        let later = now + Duration::from_secs(10);
        assert!(!is_idle(later, now, Duration::ZERO));
    }
}
