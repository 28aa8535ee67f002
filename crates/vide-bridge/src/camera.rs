//! Camera acquisition types and the platform device seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identifier of a live stream minted by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

/// Which capture device a grant refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceId {
    /// Let the webview pick (and prompt for) its default camera
    Default,
    /// A concrete device node
    Path(PathBuf),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Camera facing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    /// Front camera
    #[default]
    User,
    /// Rear camera
    Environment,
}

/// Constraints for a capture request. Audio is never requested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
}

/// Why a camera request resolved to absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum CameraFailure {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No capture device available")]
    NoDevice,

    #[error("Bridge called before it was established")]
    NotEstablished,

    #[error("Bridge version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("Camera request timed out")]
    TimedOut,

    #[error("Platform error: {0}")]
    Platform(String),
}

/// A device the platform agreed to hand out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGrant {
    pub device: DeviceId,
}

/// Opaque ownership token for a live camera stream.
///
/// Not `Clone`. The surface that requested it is its only owner, and
/// dropping it releases the stream.
#[derive(Debug, PartialEq, Eq)]
pub struct MediaStreamHandle {
    id: StreamId,
    device: DeviceId,
    facing_mode: FacingMode,
}

impl MediaStreamHandle {
    pub(crate) fn new(id: StreamId, grant: DeviceGrant, constraints: &VideoConstraints) -> Self {
        Self {
            id,
            device: grant.device,
            facing_mode: constraints.facing_mode,
        }
    }

    /// Stream identifier.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Device backing this stream.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Facing mode the stream was opened with.
    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        debug!("Released {} on {}", self.id, self.device);
    }
}

/// Result of `requestCamera`.
#[derive(Debug)]
pub enum CameraOutcome {
    Granted(MediaStreamHandle),
    Unavailable(CameraFailure),
}

impl CameraOutcome {
    /// Check if a handle was granted
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// The failure reason, if any.
    pub fn failure(&self) -> Option<&CameraFailure> {
        match self {
            Self::Granted(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }

    /// Collapse to handle-or-absent.
    pub fn into_handle(self) -> Option<MediaStreamHandle> {
        match self {
            Self::Granted(handle) => Some(handle),
            Self::Unavailable(_) => None,
        }
    }
}

/// Platform seam for acquiring a video capture grant.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn acquire(&self, constraints: &VideoConstraints) -> Result<DeviceGrant, CameraFailure>;
}

/// Default provider.
///
/// On Linux it scans `/dev/video*` nodes and checks they can be opened by
/// this user. Elsewhere the grant is delegated to the webview's own
/// permission prompt.
#[derive(Debug, Clone)]
pub struct SystemCameraProvider {
    device_dir: PathBuf,
}

impl SystemCameraProvider {
    pub fn new() -> Self {
        Self::with_device_dir("/dev")
    }

    /// Scan a different directory for `video*` nodes.
    pub fn with_device_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            device_dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn scan(&self) -> Result<DeviceGrant, CameraFailure> {
        let mut entries = tokio::fs::read_dir(&self.device_dir)
            .await
            .map_err(|e| CameraFailure::Platform(e.to_string()))?;

        let mut nodes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CameraFailure::Platform(e.to_string()))?
        {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("video") {
                nodes.push(entry.path());
            }
        }
        nodes.sort();

        let mut denied = false;
        for node in nodes {
            match tokio::fs::OpenOptions::new().read(true).open(&node).await {
                Ok(_) => {
                    return Ok(DeviceGrant {
                        device: DeviceId::Path(node),
                    });
                }
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    debug!("No access to {}", node.display());
                    denied = true;
                }
                Err(e) => debug!("Skipping {}: {}", node.display(), e),
            }
        }

        if denied {
            Err(CameraFailure::PermissionDenied)
        } else {
            Err(CameraFailure::NoDevice)
        }
    }
}

impl Default for SystemCameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraProvider for SystemCameraProvider {
    async fn acquire(&self, _constraints: &VideoConstraints) -> Result<DeviceGrant, CameraFailure> {
        if cfg!(target_os = "linux") {
            self.scan().await
        } else {
            Ok(DeviceGrant {
                device: DeviceId::Default,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_collapse() {
        let handle = MediaStreamHandle::new(
            StreamId(7),
            DeviceGrant {
                device: DeviceId::Default,
            },
            &VideoConstraints::default(),
        );
        let granted = CameraOutcome::Granted(handle);
        assert!(granted.is_granted());
        assert_eq!(granted.into_handle().map(|h| h.id()), Some(StreamId(7)));

        let denied = CameraOutcome::Unavailable(CameraFailure::PermissionDenied);
        assert_eq!(denied.failure(), Some(&CameraFailure::PermissionDenied));
        assert!(denied.into_handle().is_none());
    }

    #[test]
    fn test_default_constraints_face_user() {
        assert_eq!(VideoConstraints::default().facing_mode, FacingMode::User);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_scan_empty_dir_reports_no_device() {
        let dir = std::env::temp_dir().join(format!("vide-scan-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let provider = SystemCameraProvider::with_device_dir(&dir);
        let result = provider.acquire(&VideoConstraints::default()).await;
        assert_eq!(result, Err(CameraFailure::NoDevice));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_scan_finds_readable_node() {
        let dir = std::env::temp_dir().join(format!("vide-scan-ok-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("video0"), b"").unwrap();
        std::fs::write(dir.join("tty0"), b"").unwrap();

        let provider = SystemCameraProvider::with_device_dir(&dir);
        let grant = provider.acquire(&VideoConstraints::default()).await.unwrap();
        assert_eq!(grant.device, DeviceId::Path(dir.join("video0")));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_scan_missing_dir_is_platform_error() {
        let provider = SystemCameraProvider::with_device_dir("/nonexistent/vide/devices");
        let result = provider.acquire(&VideoConstraints::default()).await;
        assert!(matches!(result, Err(CameraFailure::Platform(_))));
    }
}
