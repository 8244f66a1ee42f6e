use std::cell::Cell;
use std::rc::Rc;

use adw::prelude::*;
use gtk::{gio, glib};
use ipc::{IncomingMessage, BRIDGE_SCRIPT, MESSAGE_HANDLER};
use tracing::{debug, warn};
use views::{CacheClearCallback, CacheClearError, ViewHandle, ViewId};
use watchdog::AckSender;
use webkit6::prelude::*;

mod ticker;

pub use ticker::GlibTicker;

/// Geometry and content of a new window.
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub uri: String,
    pub width: i32,
    pub height: i32,
}

/// Builds WebKit-backed windows wired to the renderer bridge.
#[derive(Debug)]
pub struct WebKitEngine {
    acks: AckSender,
}

impl WebKitEngine {
    /// `acks` receives "memory released" reports from every view.
    pub fn new(acks: AckSender) -> Self {
        Self { acks }
    }

    fn settings() -> webkit6::Settings {
        webkit6::Settings::builder()
            .allow_file_access_from_file_urls(true)
            .enable_javascript(true)
            .build()
    }

    fn content_manager(&self, id: ViewId) -> webkit6::UserContentManager {
        let manager = webkit6::UserContentManager::new();
        let bridge = webkit6::UserScript::new(
            BRIDGE_SCRIPT,
            webkit6::UserContentInjectedFrames::TopFrame,
            webkit6::UserScriptInjectionTime::Start,
            &[],
            &[],
        );
        manager.add_script(&bridge);

        if !manager.register_script_message_handler(MESSAGE_HANDLER, None) {
            warn!(view = %id, "failed to register script message handler");
        }

        let acks = self.acks.clone();
        manager.connect_script_message_received(Some(MESSAGE_HANDLER), move |_, value| {
            let raw = value.to_str();
            match ipc::parse_incoming(&raw) {
                Ok(message) => handle_message(id, &message, &acks),
                Err(err) => warn!(view = %id, error = %err, "dropping renderer message"),
            }
        });

        manager
    }

    /// Opens a window showing `options.uri`. The window is not presented.
    pub fn open_window(&self, app: &adw::Application, id: ViewId, options: &WindowOptions) -> Rc<WebKitView> {
        let settings = Self::settings();
        let manager = self.content_manager(id);
        let webview = webkit6::WebView::builder()
            .settings(&settings)
            .user_content_manager(&manager)
            .build();
        webview.set_hexpand(true);
        webview.set_vexpand(true);

        let header = adw::HeaderBar::new();
        header.set_show_start_title_buttons(true);
        header.set_show_end_title_buttons(true);

        let root = gtk::Box::new(gtk::Orientation::Vertical, 0);
        root.append(&header);
        root.append(&webview);

        let window = adw::ApplicationWindow::builder()
            .application(app)
            .title(options.title.as_str())
            .default_width(options.width)
            .default_height(options.height)
            .content(&root)
            .build();

        webview.load_uri(&options.uri);

        Rc::new(WebKitView {
            id,
            window,
            webview,
            alive: Rc::new(Cell::new(true)),
        })
    }
}

fn handle_message(id: ViewId, message: &IncomingMessage, acks: &AckSender) {
    if message.is_memory_released() {
        acks.acknowledge(id);
    } else {
        debug!(view = %id, kind = %message.r#type, "ignoring renderer message");
    }
}

/// One shell window hosting a single WebKit view.
#[derive(Debug)]
pub struct WebKitView {
    id: ViewId,
    window: adw::ApplicationWindow,
    webview: webkit6::WebView,
    alive: Rc<Cell<bool>>,
}

impl WebKitView {
    /// Shows the window and gives it focus.
    pub fn present(&self) {
        self.window.present();
    }

    /// Calls `f` whenever the user focuses or interacts with the window.
    pub fn connect_interaction<F: Fn(ViewId) + 'static>(&self, f: F) {
        let id = self.id;
        let f = Rc::new(f);

        let f_for_focus = Rc::clone(&f);
        self.window.connect_is_active_notify(move |window| {
            if window.is_active() {
                f_for_focus(id);
            }
        });

        let key_controller = gtk::EventControllerKey::new();
        let f_for_key = Rc::clone(&f);
        key_controller.connect_key_pressed(move |_, _, _, _| {
            f_for_key(id);
            glib::Propagation::Proceed
        });
        self.webview.add_controller(key_controller);

        let scroll_controller =
            gtk::EventControllerScroll::new(gtk::EventControllerScrollFlags::BOTH_AXES);
        let f_for_scroll = Rc::clone(&f);
        scroll_controller.connect_scroll(move |_, _, _| {
            f_for_scroll(id);
            glib::Propagation::Proceed
        });
        self.webview.add_controller(scroll_controller);

        let click = gtk::GestureClick::new();
        click.connect_pressed(move |_, _, _, _| {
            f(id);
        });
        self.webview.add_controller(click);
    }

    /// Calls `f` once when the window closes, after the view is marked dead.
    pub fn connect_closed<F: Fn(ViewId) + 'static>(&self, f: F) {
        let id = self.id;
        let alive = Rc::clone(&self.alive);
        self.window.connect_close_request(move |_| {
            if alive.replace(false) {
                f(id);
            }
            glib::Propagation::Proceed
        });
    }
}

impl ViewHandle for WebKitView {
    fn id(&self) -> ViewId {
        self.id
    }

    fn is_alive(&self) -> bool {
        self.alive.get()
    }

    fn close(&self) {
        if self.alive.get() {
            self.window.close();
        }
    }

    fn clear_cache(&self, done: CacheClearCallback) {
        if !self.alive.get() {
            done(Err(CacheClearError::Destroyed));
            return;
        }

        let Some(manager) = self
            .webview
            .network_session()
            .and_then(|session| session.website_data_manager())
        else {
            done(Err(CacheClearError::NoSession));
            return;
        };

        let done = glib::thread_guard::ThreadGuard::new(done);
        manager.clear(
            webkit6::WebsiteDataTypes::MEMORY_CACHE | webkit6::WebsiteDataTypes::DISK_CACHE,
            glib::TimeSpan::from_seconds(0),
            None::<&gio::Cancellable>,
            move |result| {
                (done.into_inner())(result.map_err(|err| CacheClearError::Engine(err.to_string())))
            },
        );
    }

    fn send_signal(&self, name: &str) {
        let script = match ipc::signal_script(name) {
            Ok(script) => script,
            Err(err) => {
                warn!(view = %self.id, signal = name, error = %err, "failed to encode signal");
                return;
            }
        };
        self.webview
            .evaluate_javascript(&script, None, None, None::<&gio::Cancellable>, |_| {});
    }
}
