//! Window sessions and their lifecycle.

use crate::mode::LoadSource;
use crate::platform::WindowKey;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use vide_bridge::PlatformBridge;

/// What the window ended up showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    /// The configured source loaded
    Loaded,
    /// Loading failed for good; an inline error page is shown
    ErrorPage,
}

/// Which source a loading session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    Development,
    Production,
}

impl From<&LoadSource> for LoadTarget {
    fn from(source: &LoadSource) -> Self {
        match source {
            LoadSource::Endpoint(_) => Self::Development,
            LoadSource::Packaged(_) => Self::Production,
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Loading(LoadTarget),
    Ready(ContentStatus),
    /// Terminal
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Loading(LoadTarget::Development) => "loading(dev)",
            Self::Loading(LoadTarget::Production) => "loading(prod)",
            Self::Ready(_) => "ready",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("No session for window {0}")]
    UnknownWindow(WindowKey),
}

/// One top-level window and the bridge scoped to it.
#[derive(Debug)]
pub struct WindowSession {
    key: WindowKey,
    state: SessionState,
    source: LoadSource,
    bridge: Arc<PlatformBridge>,
    /// Load attempts made so far
    attempts: u32,
}

impl WindowSession {
    pub fn new(key: WindowKey, source: LoadSource, bridge: Arc<PlatformBridge>) -> Self {
        Self {
            key,
            state: SessionState::Initializing,
            source,
            bridge,
            attempts: 0,
        }
    }

    pub fn key(&self) -> WindowKey {
        self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    pub fn bridge(&self) -> &Arc<PlatformBridge> {
        &self.bridge
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Loading(_))
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Start a load attempt. From `Loading` this is a retry.
    pub fn begin_loading(&mut self) -> Result<u32, LifecycleError> {
        let next = SessionState::Loading(LoadTarget::from(&self.source));
        match self.state {
            SessionState::Initializing | SessionState::Loading(_) => {
                self.transition(next);
                self.attempts += 1;
                Ok(self.attempts)
            }
            from => Err(LifecycleError::InvalidTransition { from, to: next }),
        }
    }

    pub fn mark_ready(&mut self, status: ContentStatus) -> Result<(), LifecycleError> {
        let next = SessionState::Ready(status);
        match self.state {
            SessionState::Loading(_) => {
                self.transition(next);
                Ok(())
            }
            from => Err(LifecycleError::InvalidTransition { from, to: next }),
        }
    }

    /// Close the session. Idempotent.
    pub fn close(&mut self) {
        if !self.is_closed() {
            self.transition(SessionState::Closed);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Window {}: {} -> {}", self.key, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vide_bridge::{BridgeScope, SystemCameraProvider};

    fn session() -> WindowSession {
        let bridge = PlatformBridge::new(BridgeScope(1), Arc::new(SystemCameraProvider::new()));
        WindowSession::new(
            WindowKey(1),
            LoadSource::Packaged(PathBuf::from("renderer/main_window/index.html")),
            Arc::new(bridge),
        )
    }

    #[test]
    fn test_happy_path() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Initializing);

        assert_eq!(s.begin_loading(), Ok(1));
        assert_eq!(s.state(), SessionState::Loading(LoadTarget::Production));

        s.mark_ready(ContentStatus::Loaded).unwrap();
        s.close();
        assert!(s.is_closed());
    }

    #[test]
    fn test_retry_stays_loading() {
        let mut s = session();
        s.begin_loading().unwrap();
        assert_eq!(s.begin_loading(), Ok(2));
        assert!(s.is_loading());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut s = session();
        s.close();
        assert!(matches!(
            s.begin_loading(),
            Err(LifecycleError::InvalidTransition {
                from: SessionState::Closed,
                ..
            })
        ));
        assert!(s.mark_ready(ContentStatus::Loaded).is_err());
    }

    #[test]
    fn test_ready_cannot_reload() {
        let mut s = session();
        s.begin_loading().unwrap();
        s.mark_ready(ContentStatus::ErrorPage).unwrap();
        assert!(s.begin_loading().is_err());
        assert!(s.mark_ready(ContentStatus::Loaded).is_err());
    }
}
