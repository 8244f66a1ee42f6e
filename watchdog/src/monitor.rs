use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ipc::RELEASE_MEMORY_SIGNAL;
use memory::{platform_gc_hook, GcHook, MemorySampler, ProcSelfSampler, SampleError};
use thiserror::Error;
use tracing::{debug, info, warn};
use util::{format_mb, Clock, SystemClock};
use views::{is_idle, ViewRegistry};

use crate::acks::AckReceiver;
use crate::config::MonitorConfig;
use crate::ticker::{TickHandle, TickSource};

/// Timer fires that may find cache clears still outstanding, counting the
/// one that gives up on them and mitigates again.
const STALLED_CLEAR_LIMIT: u32 = 3;

/// Misuse of the watchdog's lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchdogError {
    #[error("memory watchdog is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WatchdogState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GcOutcome {
    /// Usage was under threshold, or the sample failed.
    NotNeeded,
    Invoked,
    /// Over threshold but no hook exists in this build.
    Unavailable,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TickOutcome {
    /// Sampled, mitigated if needed, and reclaimed idle views.
    Completed,
    /// The previous tick's cache clears were still outstanding, so sampling
    /// and mitigation were skipped. Idle views were still reclaimed.
    ReclaimOnly,
    /// Fired re-entrantly while another tick was running; nothing ran.
    Skipped,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    /// `None` when sampling failed or did not run.
    pub used_bytes: Option<u64>,
    pub over_threshold: bool,
    pub gc: GcOutcome,
    pub cache_clears_requested: usize,
    pub signals_sent: usize,
    pub idle_closed: usize,
    pub acks_drained: usize,
}

impl TickReport {
    fn new(outcome: TickOutcome) -> Self {
        Self {
            outcome,
            used_bytes: None,
            over_threshold: false,
            gc: GcOutcome::NotNeeded,
            cache_clears_requested: 0,
            signals_sent: 0,
            idle_closed: 0,
            acks_drained: 0,
        }
    }
}

/// Cache clears issued by the latest mitigation pass.
///
/// Completions from an abandoned generation are ignored.
#[derive(Debug, Default)]
struct InFlight {
    generation: u64,
    outstanding: usize,
    skipped_fires: u32,
}

struct Running {
    config: MonitorConfig,
    handle: Box<dyn TickHandle>,
}

struct Inner {
    registry: Rc<ViewRegistry>,
    sampler: RefCell<Box<dyn MemorySampler>>,
    gc_hook: Option<Box<dyn GcHook>>,
    clock: Rc<dyn Clock>,
    acks: Option<AckReceiver>,
    running: RefCell<Option<Running>>,
    ticking: Cell<bool>,
    in_flight: Rc<RefCell<InFlight>>,
    ticks_completed: Cell<u64>,
    acknowledged: Cell<u64>,
    last_report: Cell<Option<TickReport>>,
}

/// Builder for [`MemoryWatchdog`].
///
/// Unset collaborators default to `/proc/self` sampling, the platform GC
/// hook, the system clock, and no acknowledgment channel.
pub struct WatchdogBuilder {
    registry: Rc<ViewRegistry>,
    ticker: Rc<dyn TickSource>,
    sampler: Option<Box<dyn MemorySampler>>,
    gc_hook: Option<Option<Box<dyn GcHook>>>,
    clock: Option<Rc<dyn Clock>>,
    acks: Option<AckReceiver>,
}

impl WatchdogBuilder {
    /// Replaces the `/proc/self` sampler.
    pub fn sampler(mut self, sampler: Box<dyn MemorySampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Pass `None` to run without a GC hook.
    pub fn gc_hook(mut self, hook: Option<Box<dyn GcHook>>) -> Self {
        self.gc_hook = Some(hook);
        self
    }

    /// Replaces the system clock used for idle checks.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Drains renderer acknowledgments from `receiver` on every tick.
    pub fn acks(mut self, receiver: AckReceiver) -> Self {
        self.acks = Some(receiver);
        self
    }

    /// Creates the watchdog in the `Stopped` state.
    pub fn build(self) -> MemoryWatchdog {
        let sampler = self
            .sampler
            .unwrap_or_else(|| Box::new(ProcSelfSampler::new()));
        let gc_hook = self.gc_hook.unwrap_or_else(platform_gc_hook);
        let clock = self.clock.unwrap_or_else(|| Rc::new(SystemClock));

        MemoryWatchdog {
            inner: Rc::new(Inner {
                registry: self.registry,
                sampler: RefCell::new(sampler),
                gc_hook,
                clock,
                acks: self.acks,
                running: RefCell::new(None),
                ticking: Cell::new(false),
                in_flight: Rc::new(RefCell::new(InFlight::default())),
                ticks_completed: Cell::new(0),
                acknowledged: Cell::new(0),
                last_report: Cell::new(None),
            }),
            ticker: self.ticker,
        }
    }
}

/// Samples process memory on a timer and reacts to pressure and idleness.
///
/// Starts `Stopped`. [`start`](Self::start) schedules a repeating tick on the
/// ticker; [`stop`](Self::stop) cancels it. Mitigation never overlaps: a
/// timer fire that lands while the previous tick's cache clears are still
/// outstanding only reclaims idle views.
pub struct MemoryWatchdog {
    inner: Rc<Inner>,
    ticker: Rc<dyn TickSource>,
}

impl MemoryWatchdog {
    /// Returns a builder for a watchdog over `registry`, ticking on `ticker`.
    pub fn builder(registry: Rc<ViewRegistry>, ticker: Rc<dyn TickSource>) -> WatchdogBuilder {
        WatchdogBuilder {
            registry,
            ticker,
            sampler: None,
            gc_hook: None,
            clock: None,
            acks: None,
        }
    }

    /// Schedules the repeating tick with `config`.
    ///
    /// Returns [`WatchdogError::AlreadyRunning`] if already started.
    pub fn start(&self, config: MonitorConfig) -> Result<(), WatchdogError> {
        if self.inner.running.borrow().is_some() {
            return Err(WatchdogError::AlreadyRunning);
        }

        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let handle = self.ticker.schedule_repeating(
            config.check_interval(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timer();
                }
            }),
        );

        *self.inner.running.borrow_mut() = Some(Running { config, handle });
        info!(
            threshold = %format_mb(config.threshold_bytes()),
            interval_secs = config.check_interval().as_secs_f64(),
            idle_timeout_secs = config.idle_timeout().as_secs_f64(),
            gc_hook = self.inner.gc_hook.as_ref().map(|hook| hook.name()),
            "memory watchdog started"
        );
        Ok(())
    }

    /// Cancels the timer. Safe to call when already stopped.
    pub fn stop(&self) {
        let running = self.inner.running.borrow_mut().take();
        if let Some(running) = running {
            running.handle.cancel();
            info!(ticks = self.inner.ticks_completed.get(), "memory watchdog stopped");
        }
    }

    /// Returns whether the timer is scheduled.
    pub fn state(&self) -> WatchdogState {
        if self.inner.running.borrow().is_some() {
            WatchdogState::Running
        } else {
            WatchdogState::Stopped
        }
    }

    /// Returns `true` while the watchdog is `Running`.
    pub fn is_running(&self) -> bool {
        self.state() == WatchdogState::Running
    }

    /// Returns the report of the most recent timer fire, skipped or not.
    pub fn last_report(&self) -> Option<TickReport> {
        self.inner.last_report.get()
    }

    /// Returns how many ticks ran the full sample and mitigate sequence.
    pub fn ticks_completed(&self) -> u64 {
        self.inner.ticks_completed.get()
    }

    /// Returns the number of renderer acknowledgments seen so far.
    pub fn acknowledged_releases(&self) -> u64 {
        self.inner.acknowledged.get()
    }
}

impl Drop for MemoryWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears the re-entrancy flag even if a collaborator panics mid-tick.
struct TickGuard<'a>(&'a Cell<bool>);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Inner {
    fn on_timer(&self) {
        let config = match self.running.borrow().as_ref() {
            Some(running) => running.config,
            None => return,
        };

        let report = self.run_tick(&config);
        if report.outcome == TickOutcome::Completed {
            self.ticks_completed.set(self.ticks_completed.get() + 1);
        }
        self.last_report.set(Some(report));
    }

    fn run_tick(&self, config: &MonitorConfig) -> TickReport {
        if self.ticking.get() {
            debug!("tick fired while another tick is running, skipping");
            return TickReport::new(TickOutcome::Skipped);
        }

        self.ticking.set(true);
        let _guard = TickGuard(&self.ticking);

        let pending = self.mitigation_in_flight();
        let outcome = if pending {
            TickOutcome::ReclaimOnly
        } else {
            TickOutcome::Completed
        };
        let mut report = TickReport::new(outcome);
        report.acks_drained = self.drain_acks();

        if !pending {
            self.sample_and_mitigate(config, &mut report);
        }

        report.idle_closed = self.close_idle_views(config);
        report
    }

    fn sample_and_mitigate(&self, config: &MonitorConfig, report: &mut TickReport) {
        match self.sample() {
            Ok(used) => {
                report.used_bytes = Some(used);
                debug!(used = %format_mb(used), "process private memory");

                if used > config.threshold_bytes() {
                    warn!(
                        used = %format_mb(used),
                        threshold = %format_mb(config.threshold_bytes()),
                        "memory usage over threshold"
                    );
                    report.over_threshold = true;
                    report.gc = self.collect_garbage();
                    let (clears, signals) = self.release_view_memory();
                    report.cache_clears_requested = clears;
                    report.signals_sent = signals;
                }
            }
            Err(err) => {
                warn!(error = %err, "memory sample failed, skipping mitigation this tick");
            }
        }
    }

    /// True if cache clears from the last mitigation pass are still pending.
    ///
    /// The [`STALLED_CLEAR_LIMIT`]th fire to find clears pending abandons
    /// them and reports `false`, so a view that never answers cannot stall
    /// mitigation.
    fn mitigation_in_flight(&self) -> bool {
        let mut in_flight = self.in_flight.borrow_mut();
        if in_flight.outstanding == 0 {
            return false;
        }

        in_flight.skipped_fires += 1;
        if in_flight.skipped_fires < STALLED_CLEAR_LIMIT {
            debug!(
                outstanding = in_flight.outstanding,
                "previous mitigation still in flight, only reclaiming idle views"
            );
            return true;
        }

        warn!(
            outstanding = in_flight.outstanding,
            "abandoning cache clears that never completed"
        );
        in_flight.generation += 1;
        in_flight.outstanding = 0;
        in_flight.skipped_fires = 0;
        false
    }

    fn sample(&self) -> Result<u64, SampleError> {
        let info = self.sampler.borrow_mut().sample()?;
        if info.private_bytes == 0 {
            return Err(SampleError::ZeroReading);
        }
        Ok(info.private_bytes)
    }

    fn collect_garbage(&self) -> GcOutcome {
        match &self.gc_hook {
            Some(hook) => {
                info!(hook = hook.name(), "forcing garbage collection");
                hook.collect();
                GcOutcome::Invoked
            }
            None => {
                info!("no garbage collection hook in this build, skipping");
                GcOutcome::Unavailable
            }
        }
    }

    /// Asks every live view to clear its cache and release renderer memory.
    /// Returns `(cache clears requested, signals sent)`.
    fn release_view_memory(&self) -> (usize, usize) {
        let generation = {
            let mut in_flight = self.in_flight.borrow_mut();
            in_flight.generation += 1;
            in_flight.skipped_fires = 0;
            in_flight.generation
        };

        let mut clears = 0;
        let mut signals = 0;
        for view in self.registry.live_views() {
            if !view.handle.is_alive() {
                continue;
            }

            self.in_flight.borrow_mut().outstanding += 1;
            let in_flight = Rc::clone(&self.in_flight);
            let id = view.id;
            view.handle.clear_cache(Box::new(move |result| {
                {
                    let mut in_flight = in_flight.borrow_mut();
                    if in_flight.generation == generation {
                        in_flight.outstanding = in_flight.outstanding.saturating_sub(1);
                    }
                }
                match result {
                    Ok(()) => debug!(view = %id, "view cache cleared"),
                    Err(err) => warn!(view = %id, error = %err, "failed to clear view cache"),
                }
            }));
            clears += 1;

            view.handle.send_signal(RELEASE_MEMORY_SIGNAL);
            signals += 1;
        }

        debug!(views = clears, "release requested from live views");
        (clears, signals)
    }

    fn close_idle_views(&self, config: &MonitorConfig) -> usize {
        let now = self.clock.now();
        let mut closed = 0;

        for view in self.registry.live_views() {
            if !view.handle.is_alive() || !is_idle(view.last_interaction, now, config.idle_timeout()) {
                continue;
            }

            info!(
                view = %view.id,
                idle_secs = view.idle_for(now).as_secs(),
                "closing idle view"
            );
            view.handle.close();
            closed += 1;
        }

        closed
    }

    fn drain_acks(&self) -> usize {
        let Some(acks) = &self.acks else {
            return 0;
        };

        let drained = acks.drain();
        for ack in &drained {
            debug!(view = %ack.view, "renderer reported memory released");
        }
        self.acknowledged
            .set(self.acknowledged.get() + drained.len() as u64);
        drained.len()
    }
}
