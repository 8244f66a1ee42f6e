use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Callback run on every tick.
pub type TickCallback = Box<dyn FnMut() + 'static>;

/// Handle to a scheduled repeating callback.
pub trait TickHandle {
    /// Stops future invocations. A callback already running finishes.
    fn cancel(self: Box<Self>);
}

/// Something that can run a callback on a fixed cadence.
///
/// The shell backs this with the GTK main loop; tests use [`ManualTicker`]
/// and fire ticks by hand.
pub trait TickSource {
    fn schedule_repeating(&self, interval: Duration, callback: TickCallback) -> Box<dyn TickHandle>;
}

struct Slot {
    interval: Duration,
    callback: Option<TickCallback>,
    cancelled: Rc<Cell<bool>>,
}

/// Ticker that only fires when [`ManualTicker::fire`] is called.
#[derive(Default)]
pub struct ManualTicker {
    slots: RefCell<Vec<Slot>>,
}

impl ManualTicker {
    /// Creates a ticker with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every scheduled, uncancelled callback once. Returns how many ran.
    ///
    /// Callbacks may cancel or schedule while running; newly scheduled
    /// callbacks first run on the next call.
    pub fn fire(&self) -> usize {
        let count = self.slots.borrow().len();
        let mut fired = 0;

        for index in 0..count {
            let taken = {
                let mut slots = self.slots.borrow_mut();
                let slot = &mut slots[index];
                if slot.cancelled.get() {
                    None
                } else {
                    slot.callback.take()
                }
            };

            let Some(mut callback) = taken else {
                continue;
            };
            callback();
            fired += 1;

            if let Some(slot) = self.slots.borrow_mut().get_mut(index) {
                slot.callback = Some(callback);
            }
        }

        fired
    }

    /// Number of callbacks that have not been cancelled.
    pub fn active(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| !slot.cancelled.get())
            .count()
    }

    /// Intervals requested by the active callbacks, in scheduling order.
    pub fn intervals(&self) -> Vec<Duration> {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| !slot.cancelled.get())
            .map(|slot| slot.interval)
            .collect()
    }
}

impl TickSource for ManualTicker {
    fn schedule_repeating(&self, interval: Duration, callback: TickCallback) -> Box<dyn TickHandle> {
        let cancelled = Rc::new(Cell::new(false));
        self.slots.borrow_mut().push(Slot {
            interval,
            callback: Some(callback),
            cancelled: Rc::clone(&cancelled),
        });
        Box::new(ManualHandle { cancelled })
    }
}

struct ManualHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TickHandle for ManualHandle {
    fn cancel(self: Box<Self>) {
        self.cancelled.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_until_cancelled() {
        let ticker = ManualTicker::new();
        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        let handle = ticker.schedule_repeating(
            Duration::from_secs(30),
            Box::new(move || counter.set(counter.get() + 1)),
        );

        assert_eq!(ticker.intervals(), vec![Duration::from_secs(30)]);
        assert_eq!(ticker.fire(), 1);
        assert_eq!(ticker.fire(), 1);
        assert_eq!(count.get(), 2);

        handle.cancel();
        assert_eq!(ticker.fire(), 0);
        assert_eq!(count.get(), 2);
        assert_eq!(ticker.active(), 0);
    }

    #[test]
    fn callback_can_cancel_itself() {
        let ticker = ManualTicker::new();
        let handle: Rc<RefCell<Option<Box<dyn TickHandle>>>> = Rc::new(RefCell::new(None));
        let handle_for_tick = Rc::clone(&handle);
        let scheduled = ticker.schedule_repeating(
            Duration::from_secs(1),
            Box::new(move || {
                if let Some(handle) = handle_for_tick.borrow_mut().take() {
                    handle.cancel();
                }
            }),
        );
        *handle.borrow_mut() = Some(scheduled);

        assert_eq!(ticker.fire(), 1);
        assert_eq!(ticker.fire(), 0);
    }
}
