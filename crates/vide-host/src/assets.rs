//! Packaged content served over the `visionide` custom protocol.
//!
//! Routes:
//! - `/` and `/index.html` -> the surface page
//! - anything else -> files under the packaged renderer directory

use crate::mode::LoadSource;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use url::Url;
use vide_surface::PageSnapshot;

/// Custom protocol scheme for packaged content.
pub const SCHEME: &str = "visionide";

/// URL the webview loads in production.
pub fn entry_url() -> &'static str {
    // WebView2 only routes custom schemes through this form
    if cfg!(target_os = "windows") {
        "http://visionide.localhost/"
    } else {
        "visionide://localhost/"
    }
}

/// URL whose origin the page may navigate within.
pub fn content_origin(source: &LoadSource) -> Option<Url> {
    match source {
        LoadSource::Endpoint(url) => Some(url.clone()),
        LoadSource::Packaged(_) => Url::parse(entry_url()).ok(),
    }
}

/// Navigation filter: stays on the content origin.
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    origin: Option<Url>,
}

impl NavigationGuard {
    pub fn new(origin: Option<Url>) -> Self {
        Self { origin }
    }

    pub fn allows(&self, target: &str) -> bool {
        if target == "about:blank" || target.starts_with("data:text/html") {
            return true;
        }
        let (Some(origin), Ok(target)) = (&self.origin, Url::parse(target)) else {
            return false;
        };
        target.scheme() == origin.scheme()
            && target.host_str() == origin.host_str()
            && target.port_or_known_default() == origin.port_or_known_default()
    }
}

/// Protocol response
#[derive(Debug)]
pub struct Asset {
    pub status: u16,
    pub mime_type: &'static str,
    pub data: Cow<'static, [u8]>,
}

/// Resolves protocol paths to the surface page or packaged files.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    page: PageSnapshot,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, page: PageSnapshot) -> Self {
        Self {
            root: root.into(),
            page,
        }
    }

    pub fn resolve(&self, path: &str) -> Asset {
        let path = path.trim_start_matches('/');
        if path.is_empty() || path == "index.html" {
            return Asset {
                status: 200,
                mime_type: "text/html",
                data: Cow::Owned(self.page.html().into_bytes()),
            };
        }

        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return not_found(path);
        }

        match std::fs::read(self.root.join(relative)) {
            Ok(data) => Asset {
                status: 200,
                mime_type: guess_mime(path),
                data: Cow::Owned(data),
            },
            Err(_) => not_found(path),
        }
    }
}

fn not_found(path: &str) -> Asset {
    let html = format!(
        "<!DOCTYPE html><html><body><h1>404</h1>\
<p><code>{}</code> is not packaged.</p></body></html>",
        vide_surface::escape(path)
    );
    Asset {
        status: 404,
        mime_type: "text/html",
        data: Cow::Owned(html.into_bytes()),
    }
}

/// Guess MIME type from file extension
pub fn guess_mime(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
