use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use gtk::glib;
use watchdog::{TickCallback, TickHandle, TickSource};

/// Runs watchdog ticks on the GTK main loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlibTicker;

impl TickSource for GlibTicker {
    fn schedule_repeating(&self, interval: Duration, mut callback: TickCallback) -> Box<dyn TickHandle> {
        let cancelled = Rc::new(Cell::new(false));
        let cancelled_for_tick = Rc::clone(&cancelled);
        let source = glib::timeout_add_local(interval, move || {
            if cancelled_for_tick.get() {
                return glib::ControlFlow::Break;
            }
            callback();
            glib::ControlFlow::Continue
        });

        Box::new(GlibTickHandle { source, cancelled })
    }
}

struct GlibTickHandle {
    source: glib::SourceId,
    cancelled: Rc<Cell<bool>>,
}

impl TickHandle for GlibTickHandle {
    fn cancel(self: Box<Self>) {
        // The source only breaks after this flag is set, so it is still
        // attached here.
        self.cancelled.set(true);
        self.source.remove();
    }
}
