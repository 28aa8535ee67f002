//! The capability trait and its implementations.

use crate::camera::{
    CameraFailure, CameraOutcome, CameraProvider, DeviceGrant, DeviceId, MediaStreamHandle,
    StreamId, VideoConstraints,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Version of the exposed operation set.
pub const BRIDGE_VERSION: u32 = 1;

/// Global stream ID counter, so handles stay unique across windows
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

fn next_stream_id() -> StreamId {
    StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
}

/// The window a bridge instance is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeScope(pub u64);

impl fmt::Display for BridgeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bridge({})", self.0)
    }
}

/// Operations the sandboxed surface may invoke.
///
/// Implementations never return errors: every failure is folded into the
/// returned outcome.
#[async_trait]
pub trait CapabilityBridge: Send + Sync {
    /// Version of the operation set this bridge speaks.
    fn version(&self) -> u32 {
        BRIDGE_VERSION
    }

    /// Whether the host has finished setting the bridge up.
    fn is_established(&self) -> bool;

    /// Request a video-only camera stream.
    async fn request_camera(&self) -> CameraOutcome;
}

/// Host-side bridge backed by a platform [`CameraProvider`].
pub struct PlatformBridge {
    scope: BridgeScope,
    provider: Arc<dyn CameraProvider>,
    constraints: VideoConstraints,
    timeout: Option<Duration>,
    established: AtomicBool,
}

impl PlatformBridge {
    /// Create an unestablished bridge for a window.
    pub fn new(scope: BridgeScope, provider: Arc<dyn CameraProvider>) -> Self {
        Self {
            scope,
            provider,
            constraints: VideoConstraints::default(),
            timeout: None,
            established: AtomicBool::new(false),
        }
    }

    /// Give up on a pending acquisition after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the capture constraints.
    pub fn with_constraints(mut self, constraints: VideoConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// The window this bridge belongs to.
    pub fn scope(&self) -> BridgeScope {
        self.scope
    }

    /// Mark the bridge ready. Calls made before this fail closed.
    pub fn establish(&self) {
        if !self.established.swap(true, Ordering::SeqCst) {
            info!("{} established (v{})", self.scope, BRIDGE_VERSION);
        }
    }

    async fn acquire(&self) -> Result<DeviceGrant, CameraFailure> {
        let acquire = self.provider.acquire(&self.constraints);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, acquire)
                .await
                .unwrap_or(Err(CameraFailure::TimedOut)),
            None => acquire.await,
        }
    }
}

#[async_trait]
impl CapabilityBridge for PlatformBridge {
    fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    async fn request_camera(&self) -> CameraOutcome {
        if !self.is_established() {
            warn!("{} requestCamera before establishment, refusing", self.scope);
            return CameraOutcome::Unavailable(CameraFailure::NotEstablished);
        }

        match self.acquire().await {
            Ok(grant) => {
                let handle = MediaStreamHandle::new(next_stream_id(), grant, &self.constraints);
                debug!("{} granted {} on {}", self.scope, handle.id(), handle.device());
                CameraOutcome::Granted(handle)
            }
            Err(reason) => {
                warn!("{} camera unavailable: {}", self.scope, reason);
                CameraOutcome::Unavailable(reason)
            }
        }
    }
}

impl fmt::Debug for PlatformBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformBridge")
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .field("established", &self.is_established())
            .finish()
    }
}

/// Bridge with a fixed answer, for substituting the host in tests and
/// headless runs.
#[derive(Debug)]
pub struct StaticBridge {
    failure: Option<CameraFailure>,
    established: bool,
    calls: AtomicUsize,
}

impl StaticBridge {
    /// Always grants the default device.
    pub fn granting() -> Self {
        Self {
            failure: None,
            established: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always resolves to absent with `reason`.
    pub fn denying(reason: CameraFailure) -> Self {
        Self {
            failure: Some(reason),
            established: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Behaves like a bridge the host never finished setting up.
    pub fn unestablished() -> Self {
        Self {
            failure: None,
            established: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `request_camera` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityBridge for StaticBridge {
    fn is_established(&self) -> bool {
        self.established
    }

    async fn request_camera(&self) -> CameraOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.established {
            return CameraOutcome::Unavailable(CameraFailure::NotEstablished);
        }
        match &self.failure {
            Some(reason) => CameraOutcome::Unavailable(reason.clone()),
            None => CameraOutcome::Granted(MediaStreamHandle::new(
                next_stream_id(),
                DeviceGrant {
                    device: DeviceId::Default,
                },
                &VideoConstraints::default(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Result<DeviceGrant, CameraFailure>);

    #[async_trait]
    impl CameraProvider for FixedProvider {
        async fn acquire(&self, _: &VideoConstraints) -> Result<DeviceGrant, CameraFailure> {
            self.0.clone()
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl CameraProvider for HangingProvider {
        async fn acquire(&self, _: &VideoConstraints) -> Result<DeviceGrant, CameraFailure> {
            std::future::pending().await
        }
    }

    fn granting_provider() -> Arc<dyn CameraProvider> {
        Arc::new(FixedProvider(Ok(DeviceGrant {
            device: DeviceId::Default,
        })))
    }

    #[tokio::test]
    async fn test_unestablished_bridge_fails_closed() {
        let bridge = PlatformBridge::new(BridgeScope(1), granting_provider());

        let outcome = bridge.request_camera().await;
        assert_eq!(outcome.failure(), Some(&CameraFailure::NotEstablished));
    }

    #[tokio::test]
    async fn test_established_bridge_grants() {
        let bridge = PlatformBridge::new(BridgeScope(1), granting_provider());
        bridge.establish();

        let outcome = bridge.request_camera().await;
        assert!(outcome.is_granted());
    }

    #[tokio::test]
    async fn test_failures_resolve_to_absent() {
        for reason in [
            CameraFailure::PermissionDenied,
            CameraFailure::NoDevice,
            CameraFailure::Platform("device busy".into()),
        ] {
            let bridge =
                PlatformBridge::new(BridgeScope(2), Arc::new(FixedProvider(Err(reason.clone()))));
            bridge.establish();

            let outcome = bridge.request_camera().await;
            assert_eq!(outcome.failure(), Some(&reason));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_to_absent() {
        let bridge = PlatformBridge::new(BridgeScope(3), Arc::new(HangingProvider))
            .with_timeout(Some(Duration::from_secs(30)));
        bridge.establish();

        let outcome = bridge.request_camera().await;
        assert_eq!(outcome.failure(), Some(&CameraFailure::TimedOut));
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let bridge = StaticBridge::granting();
        let a = bridge.request_camera().await.into_handle().unwrap();
        let b = bridge.request_camera().await.into_handle().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(bridge.calls(), 2);
    }

    #[tokio::test]
    async fn test_static_unestablished() {
        let bridge = StaticBridge::unestablished();
        assert!(!bridge.is_established());
        let outcome = bridge.request_camera().await;
        assert_eq!(outcome.failure(), Some(&CameraFailure::NotEstablished));
    }
}
