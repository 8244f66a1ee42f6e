use std::path::{Path, PathBuf};

use gtk::gio::prelude::*;
use tracing::warn;

const FALLBACK_URI: &str = "about:blank";

/// Bundled pages loaded into new windows.
pub struct Assets {
    pub index_uri: String,
}

impl Assets {
    pub fn new() -> Self {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets");
        let index_path = dir.join("index.html");
        let index_uri = if index_path.exists() {
            file_uri(&index_path)
        } else {
            warn!(path = %index_path.display(), "bundled index page missing");
            FALLBACK_URI.to_string()
        };

        Self { index_uri }
    }
}

fn file_uri(path: &Path) -> String {
    gtk::gio::File::for_path(path).uri().to_string()
}
