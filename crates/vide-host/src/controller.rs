//! Host process controller
//!
//! Owns application lifecycle. Reacts to the events the windowing loop
//! forwards (ready, activate, window closed, content loaded or failed) and
//! drives [`WindowSession`]s through their states via a [`WindowPlatform`].
//!
//! Every window gets its own [`PlatformBridge`], established before the
//! webview is attached, so the page can never reach an unestablished bridge.

use crate::config::HostConfig;
use crate::mode::{LoadSource, RunMode};
use crate::platform::{WindowKey, WindowPlatform};
use crate::session::{ContentStatus, LifecycleError, WindowSession};
use anyhow::Context;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vide_bridge::{BridgeScope, CameraProvider, PlatformBridge};
use vide_surface::escape;

/// Platform conventions the controller follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformPolicy {
    /// Keep the process alive with zero windows
    pub persists_without_windows: bool,
}

impl PlatformPolicy {
    /// Conventions of the platform we were built for.
    pub fn native() -> Self {
        Self {
            persists_without_windows: cfg!(target_os = "macos"),
        }
    }

    /// Native conventions with config overrides applied.
    pub fn from_config(config: &HostConfig) -> Self {
        let native = Self::native();
        Self {
            persists_without_windows: config
                .persist_without_windows
                .unwrap_or(native.persists_without_windows),
        }
    }
}

impl Default for PlatformPolicy {
    fn default() -> Self {
        Self::native()
    }
}

/// Whether the process ends after its last window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Exit,
    Persist,
}

/// What the controller did about a failed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    /// Reload scheduled
    Retry { retry: u32, delay: Duration },
    /// Retries exhausted, error page shown
    ErrorPage,
    /// Window gone or no longer loading
    Ignored,
}

pub struct HostController {
    config: HostConfig,
    mode: RunMode,
    policy: PlatformPolicy,
    provider: Arc<dyn CameraProvider>,
    sessions: BTreeMap<WindowKey, WindowSession>,
    started: bool,
}

impl HostController {
    pub fn new(
        config: HostConfig,
        mode: RunMode,
        policy: PlatformPolicy,
        provider: Arc<dyn CameraProvider>,
    ) -> Self {
        Self {
            config,
            mode,
            policy,
            provider,
            sessions: BTreeMap::new(),
            started: false,
        }
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn session(&self, key: WindowKey) -> Option<&WindowSession> {
        self.sessions.get(&key)
    }

    /// Number of open windows.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Bring up the first window. Idempotent.
    pub fn start(&mut self, platform: &mut dyn WindowPlatform) -> anyhow::Result<()> {
        if self.started {
            debug!("Host already started");
            return Ok(());
        }
        self.started = true;
        info!("Host ready ({} mode)", self.mode.name());

        if self.sessions.is_empty() {
            self.create_window(platform)?;
        }
        Ok(())
    }

    /// The host runtime signalled readiness.
    pub fn on_ready(&mut self, platform: &mut dyn WindowPlatform) -> anyhow::Result<()> {
        self.start(platform)
    }

    /// Allocate a window, attach an established bridge and start loading.
    pub fn create_window(
        &mut self,
        platform: &mut dyn WindowPlatform,
    ) -> anyhow::Result<WindowKey> {
        let key = platform
            .open_window(&self.config.window)
            .context("Failed to open window")?;

        let bridge = Arc::new(
            PlatformBridge::new(BridgeScope(key.0), Arc::clone(&self.provider))
                .with_timeout(self.config.camera_timeout()),
        );
        bridge.establish();

        if let Err(err) = platform.attach(key, bridge.clone(), self.mode.inspector()) {
            platform.close_window(key);
            return Err(err.context(format!("Failed to attach webview to window {}", key)));
        }

        self.sessions
            .insert(key, WindowSession::new(key, self.mode.load_source(), bridge));

        if self.mode.inspector() {
            if let Err(err) = platform.open_inspector(key) {
                warn!("Inspector unavailable: {:#}", err);
            }
        }

        self.load(platform, key)?;
        info!("Window {} created", key);
        Ok(key)
    }

    fn load(
        &mut self,
        platform: &mut dyn WindowPlatform,
        key: WindowKey,
    ) -> Result<(), LifecycleError> {
        let session = self
            .sessions
            .get_mut(&key)
            .ok_or(LifecycleError::UnknownWindow(key))?;
        let attempt = session.begin_loading()?;
        let source = session.source().clone();

        info!("Window {} loading {} (attempt {})", key, source, attempt);
        if let Err(err) = platform.load(key, &source) {
            self.on_load_failed(platform, key, &format!("{:#}", err));
        }
        Ok(())
    }

    /// A scheduled reload is due.
    pub fn retry_load(
        &mut self,
        platform: &mut dyn WindowPlatform,
        key: WindowKey,
    ) -> Result<(), LifecycleError> {
        match self.sessions.get(&key) {
            Some(session) if session.is_loading() => self.load(platform, key),
            _ => {
                debug!("Dropping retry for window {}", key);
                Ok(())
            }
        }
    }

    /// Window content finished loading.
    pub fn on_load_finished(&mut self, key: WindowKey) {
        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };
        if !session.is_loading() {
            return;
        }
        match session.mark_ready(ContentStatus::Loaded) {
            Ok(()) => info!("Window {} ready", key),
            Err(err) => warn!("{}", err),
        }
    }

    /// Window content failed to load. Retries with backoff, then shows an
    /// error page. Never exits the process.
    pub fn on_load_failed(
        &mut self,
        platform: &mut dyn WindowPlatform,
        key: WindowKey,
        reason: &str,
    ) -> LoadAction {
        let Some(session) = self.sessions.get_mut(&key) else {
            return LoadAction::Ignored;
        };
        if !session.is_loading() {
            return LoadAction::Ignored;
        }

        let attempt = session.attempts();
        let policy = self.config.load;
        if attempt <= policy.max_retries {
            let delay = policy.backoff(attempt);
            warn!(
                "Window {} failed to load {}: {}; retrying in {:?}",
                key,
                session.source(),
                reason,
                delay
            );
            platform.schedule_retry(key, delay);
            return LoadAction::Retry {
                retry: attempt,
                delay,
            };
        }

        error!(
            "Window {} failed to load {} after {} attempts: {}",
            key,
            session.source(),
            attempt,
            reason
        );
        let html = error_page(session.source(), reason);
        if let Err(err) = platform.show_error_page(key, &html) {
            error!("Failed to show error page: {:#}", err);
        }
        if let Err(err) = session.mark_ready(ContentStatus::ErrorPage) {
            warn!("{}", err);
        }
        LoadAction::ErrorPage
    }

    /// Recreate a window if none is open.
    pub fn on_activate(
        &mut self,
        platform: &mut dyn WindowPlatform,
    ) -> anyhow::Result<Option<WindowKey>> {
        if !self.sessions.is_empty() {
            return Ok(None);
        }
        info!("Activated with no windows, creating one");
        self.create_window(platform).map(Some)
    }

    /// A window closed. Returns the exit decision once it was the last one.
    pub fn on_window_closed(
        &mut self,
        platform: &mut dyn WindowPlatform,
        key: WindowKey,
    ) -> Option<ExitDecision> {
        let Some(mut session) = self.sessions.remove(&key) else {
            return None;
        };
        session.close();
        platform.close_window(key);
        info!("Window {} closed", key);

        if self.sessions.is_empty() {
            Some(self.on_window_all_closed())
        } else {
            None
        }
    }

    pub fn on_window_all_closed(&self) -> ExitDecision {
        if self.policy.persists_without_windows {
            info!("All windows closed, staying resident");
            ExitDecision::Persist
        } else {
            info!("All windows closed, exiting");
            ExitDecision::Exit
        }
    }
}

fn error_page(source: &LoadSource, reason: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>VisionIDE</title></head>
<body style="font-family: system-ui; padding: 40px; background: #1e1e2e; color: #cdd6f4;">
    <h1>Could not load the editor</h1>
    <p>Failed to load <code>{}</code>.</p>
    <pre style="white-space: pre-wrap; color: #f38ba8;">{}</pre>
</body>
</html>"#,
        escape(&source.to_string()),
        escape(reason)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use vide_bridge::{CapabilityBridge, SystemCameraProvider};

    #[derive(Default)]
    struct RecordingPlatform {
        next: u64,
        open: Vec<WindowKey>,
        /// Bridge state seen at attach time
        attached: Vec<(WindowKey, bool, bool)>,
        loads: Vec<(WindowKey, LoadSource)>,
        /// Fail this many loads before succeeding
        failing_loads: u32,
        retries: Vec<(WindowKey, Duration)>,
        error_pages: Vec<(WindowKey, String)>,
        inspectors: Vec<WindowKey>,
    }

    impl WindowPlatform for RecordingPlatform {
        fn open_window(&mut self, _window: &WindowConfig) -> anyhow::Result<WindowKey> {
            self.next += 1;
            let key = WindowKey(self.next);
            self.open.push(key);
            Ok(key)
        }

        fn attach(
            &mut self,
            key: WindowKey,
            bridge: Arc<dyn CapabilityBridge>,
            inspector: bool,
        ) -> anyhow::Result<()> {
            self.attached.push((key, bridge.is_established(), inspector));
            Ok(())
        }

        fn load(&mut self, key: WindowKey, source: &LoadSource) -> anyhow::Result<()> {
            self.loads.push((key, source.clone()));
            if self.failing_loads > 0 {
                self.failing_loads -= 1;
                anyhow::bail!("connection refused");
            }
            Ok(())
        }

        fn show_error_page(&mut self, key: WindowKey, html: &str) -> anyhow::Result<()> {
            self.error_pages.push((key, html.to_string()));
            Ok(())
        }

        fn open_inspector(&mut self, key: WindowKey) -> anyhow::Result<()> {
            self.inspectors.push(key);
            Ok(())
        }

        fn schedule_retry(&mut self, key: WindowKey, delay: Duration) {
            self.retries.push((key, delay));
        }

        fn close_window(&mut self, key: WindowKey) {
            self.open.retain(|k| *k != key);
        }
    }

    fn controller(flag: Option<&str>, persists: bool) -> HostController {
        let config = HostConfig::default();
        let mode = RunMode::from_flag(flag, &config).unwrap();
        HostController::new(
            config,
            mode,
            PlatformPolicy {
                persists_without_windows: persists,
            },
            Arc::new(SystemCameraProvider::new()),
        )
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut host = controller(None, false);
        let mut platform = RecordingPlatform::default();

        host.start(&mut platform).unwrap();
        host.on_ready(&mut platform).unwrap();

        assert_eq!(host.session_count(), 1);
        assert_eq!(platform.open.len(), 1);
    }

    #[test]
    fn test_development_window_becomes_ready() {
        let mut host = controller(Some("development"), false);
        let mut platform = RecordingPlatform::default();
        host.start(&mut platform).unwrap();

        let key = platform.open[0];
        assert_eq!(platform.attached, vec![(key, true, true)]);
        assert_eq!(platform.inspectors, vec![key]);
        assert!(matches!(
            &platform.loads[0].1,
            LoadSource::Endpoint(url) if url.as_str() == "http://localhost:5173/"
        ));

        host.on_load_finished(key);
        assert_eq!(
            host.session(key).unwrap().state(),
            crate::session::SessionState::Ready(ContentStatus::Loaded)
        );
    }

    #[test]
    fn test_production_window_has_no_inspector() {
        let mut host = controller(None, false);
        let mut platform = RecordingPlatform::default();
        host.start(&mut platform).unwrap();

        assert!(platform.inspectors.is_empty());
        assert!(matches!(&platform.loads[0].1, LoadSource::Packaged(_)));
        assert!(host.session(platform.open[0]).unwrap().bridge().is_established());
    }

    #[test]
    fn test_activate_creates_at_most_one() {
        let mut host = controller(None, true);
        let mut platform = RecordingPlatform::default();
        host.start(&mut platform).unwrap();

        assert_eq!(host.on_activate(&mut platform).unwrap(), None);
        assert_eq!(host.session_count(), 1);

        let key = platform.open[0];
        assert_eq!(host.on_window_closed(&mut platform, key), Some(ExitDecision::Persist));
        assert_eq!(host.session_count(), 0);

        assert!(host.on_activate(&mut platform).unwrap().is_some());
        assert_eq!(host.session_count(), 1);
        assert_eq!(host.on_activate(&mut platform).unwrap(), None);
        assert_eq!(host.session_count(), 1);
    }

    #[test]
    fn test_all_closed_exits_on_non_persistent_platform() {
        let mut host = controller(None, false);
        let mut platform = RecordingPlatform::default();
        host.start(&mut platform).unwrap();

        let key = platform.open[0];
        assert_eq!(host.on_window_closed(&mut platform, key), Some(ExitDecision::Exit));
        assert!(platform.open.is_empty());
    }

    #[test]
    fn test_load_failure_retries_then_shows_error_page() {
        let mut host = controller(Some("development"), false);
        let mut platform = RecordingPlatform {
            failing_loads: u32::MAX,
            ..Default::default()
        };
        host.start(&mut platform).unwrap();
        let key = platform.open[0];

        // First attempt failed inside create_window
        assert_eq!(platform.retries, vec![(key, Duration::from_millis(500))]);
        assert!(host.session(key).unwrap().is_loading());

        host.retry_load(&mut platform, key).unwrap();
        assert_eq!(platform.retries.last(), Some(&(key, Duration::from_millis(1000))));

        host.retry_load(&mut platform, key).unwrap();
        assert_eq!(platform.loads.len(), 3);
        assert_eq!(platform.retries.len(), 2);
        assert_eq!(platform.error_pages.len(), 1);
        assert!(platform.error_pages[0].1.contains("http://localhost:5173/"));
        assert!(platform.error_pages[0].1.contains("connection refused"));
        assert_eq!(
            host.session(key).unwrap().state(),
            crate::session::SessionState::Ready(ContentStatus::ErrorPage)
        );

        // The error page itself finishing does not flip the status
        host.on_load_finished(key);
        assert_eq!(
            host.session(key).unwrap().state(),
            crate::session::SessionState::Ready(ContentStatus::ErrorPage)
        );
    }

    #[test]
    fn test_load_recovers_on_retry() {
        let mut host = controller(None, false);
        let mut platform = RecordingPlatform {
            failing_loads: 1,
            ..Default::default()
        };
        host.start(&mut platform).unwrap();
        let key = platform.open[0];

        host.retry_load(&mut platform, key).unwrap();
        host.on_load_finished(key);

        let session = host.session(key).unwrap();
        assert_eq!(session.attempts(), 2);
        assert_eq!(
            session.state(),
            crate::session::SessionState::Ready(ContentStatus::Loaded)
        );
        assert!(platform.error_pages.is_empty());
    }

    #[test]
    fn test_retry_after_close_is_dropped() {
        let mut host = controller(None, true);
        let mut platform = RecordingPlatform {
            failing_loads: 1,
            ..Default::default()
        };
        host.start(&mut platform).unwrap();
        let key = platform.open[0];
        host.on_window_closed(&mut platform, key);

        host.retry_load(&mut platform, key).unwrap();
        assert_eq!(platform.loads.len(), 1);
        assert_eq!(
            host.on_load_failed(&mut platform, key, "late"),
            LoadAction::Ignored
        );
    }

    #[test]
    fn test_error_page_escapes_reason() {
        let source = LoadSource::Packaged("renderer/main_window/index.html".into());
        let html = error_page(&source, "<b>");
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("renderer/main_window/index.html"));
    }
}
