use std::rc::Rc;

use adw::prelude::*;
use engine::{GlibTicker, WebKitEngine, WebKitView, WindowOptions};
use gtk::{gio, glib};
use memory::{platform_gc_hook, ProcSelfSampler};
use tracing::{error, info};
use util::{Clock, SystemClock};
use views::{ViewHandle, ViewRegistry};
use watchdog::{ack_channel, MemoryWatchdog, MonitorConfig};

use crate::assets::Assets;

const APP_ID: &str = "com.vigil.shell";
const APP_TITLE: &str = "Vigil Shell";
const WINDOW_WIDTH: i32 = 900;
const WINDOW_HEIGHT: i32 = 700;

pub fn run(config: MonitorConfig) -> glib::ExitCode {
    let app = adw::Application::builder().application_id(APP_ID).build();
    let shell = Rc::new(Shell::new(config));

    let shell_for_activate = Rc::clone(&shell);
    app.connect_activate(move |app| shell_for_activate.activate(app));

    let shell_for_shutdown = Rc::clone(&shell);
    app.connect_shutdown(move |_| shell_for_shutdown.shutdown());

    let new_window = gio::SimpleAction::new("new-window", None);
    let shell_for_action = Rc::clone(&shell);
    let app_for_action = app.clone();
    new_window.connect_activate(move |_, _| shell_for_action.open_window(&app_for_action));
    app.add_action(&new_window);
    app.set_accels_for_action("app.new-window", &["<Primary>n"]);

    app.run()
}

/// Process-wide state: the view registry, the engine and the watchdog.
struct Shell {
    registry: Rc<ViewRegistry>,
    engine: WebKitEngine,
    watchdog: MemoryWatchdog,
    clock: Rc<SystemClock>,
    config: MonitorConfig,
    assets: Assets,
}

impl Shell {
    fn new(config: MonitorConfig) -> Self {
        let registry = Rc::new(ViewRegistry::new());
        let clock = Rc::new(SystemClock);
        let (ack_sender, ack_receiver) = ack_channel();

        let watchdog = MemoryWatchdog::builder(Rc::clone(&registry), Rc::new(GlibTicker))
            .sampler(Box::new(ProcSelfSampler::new()))
            .gc_hook(platform_gc_hook())
            .clock(clock.clone())
            .acks(ack_receiver)
            .build();

        Self {
            registry,
            engine: WebKitEngine::new(ack_sender),
            watchdog,
            clock,
            config,
            assets: Assets::new(),
        }
    }

    fn activate(&self, app: &adw::Application) {
        let style_manager = adw::StyleManager::default();
        style_manager.set_color_scheme(adw::ColorScheme::Default);

        if self.registry.is_empty() {
            self.open_window(app);
        }

        if !self.watchdog.is_running() {
            if let Err(err) = self.watchdog.start(self.config) {
                error!(error = %err, "failed to start memory watchdog");
            }
        }
    }

    fn open_window(&self, app: &adw::Application) {
        let id = self.registry.allocate_id();
        let options = WindowOptions {
            title: APP_TITLE.to_string(),
            uri: self.assets.index_uri.clone(),
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
        };
        let view = self.engine.open_window(app, id, &options);

        let handle: Rc<dyn ViewHandle> = view.clone();
        if let Err(err) = self.registry.register(handle, self.clock.now()) {
            error!(error = %err, "refusing to open window");
            view.close();
            return;
        }
        attach_lifecycle_handlers(&view, &self.registry, &self.clock);

        info!(view = %id, open = self.registry.len(), "window opened");
        view.present();
    }

    fn shutdown(&self) {
        self.watchdog.stop();
        self.registry.clear();
        info!("shell shut down");
    }
}

fn attach_lifecycle_handlers(view: &WebKitView, registry: &Rc<ViewRegistry>, clock: &Rc<SystemClock>) {
    let registry_for_touch = Rc::downgrade(registry);
    let clock_for_touch = Rc::clone(clock);
    view.connect_interaction(move |id| {
        if let Some(registry) = registry_for_touch.upgrade() {
            registry.touch(id, clock_for_touch.now());
        }
    });

    let registry_for_close = Rc::downgrade(registry);
    view.connect_closed(move |id| {
        if let Some(registry) = registry_for_close.upgrade() {
            registry.unregister(id);
            info!(view = %id, open = registry.len(), "window closed");
        }
    });
}
