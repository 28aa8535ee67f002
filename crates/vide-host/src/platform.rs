//! Windowing seam between the controller and the real event loop.

use crate::config::WindowConfig;
use crate::mode::LoadSource;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vide_bridge::CapabilityBridge;

/// Stable identifier for a host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey(pub u64);

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operations the controller needs from the windowing system.
pub trait WindowPlatform {
    /// Allocate a window.
    fn open_window(&mut self, config: &WindowConfig) -> anyhow::Result<WindowKey>;

    /// Create the webview with `bridge` exposed to the page. Must happen
    /// before any content loads.
    fn attach(
        &mut self,
        key: WindowKey,
        bridge: Arc<dyn CapabilityBridge>,
        inspector: bool,
    ) -> anyhow::Result<()>;

    /// Load window content. An error means the source is unavailable.
    fn load(&mut self, key: WindowKey, source: &LoadSource) -> anyhow::Result<()>;

    /// Replace the window content with inline HTML.
    fn show_error_page(&mut self, key: WindowKey, html: &str) -> anyhow::Result<()>;

    /// Open the detached inspector.
    fn open_inspector(&mut self, key: WindowKey) -> anyhow::Result<()>;

    /// Ask for `retry_load(key)` after `delay`.
    fn schedule_retry(&mut self, key: WindowKey, delay: Duration);

    /// Destroy a window and everything attached to it.
    fn close_window(&mut self, key: WindowKey);
}
