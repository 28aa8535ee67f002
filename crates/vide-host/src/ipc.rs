//! Webview IPC envelopes.
//!
//! The page posts JSON strings through `window.ipc.postMessage`. Each
//! carries a `channel` naming its recipient: `bridge` for capability calls
//! made through `window.visionide`, `surface` for editor events.

use serde_json::Value;
use vide_bridge::{BridgeError, BridgeOp, BridgeRequest, CameraFailure, BRIDGE_VERSION};
use vide_surface::{PageEvent, SurfaceHandle, SurfaceMessage};

/// A decoded IPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcMessage {
    Bridge(BridgeRequest),
    Surface(PageEvent),
}

/// IPC decoding errors
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("Malformed IPC message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("IPC message has no channel")]
    MissingChannel,

    #[error("Unknown IPC channel '{0}'")]
    UnknownChannel(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl IpcMessage {
    pub fn parse(body: &str) -> Result<Self, IpcError> {
        let value: Value = serde_json::from_str(body)?;
        let channel = value
            .get("channel")
            .and_then(Value::as_str)
            .ok_or(IpcError::MissingChannel)?;

        match channel {
            "bridge" => Ok(Self::Bridge(BridgeRequest::parse(body)?)),
            "surface" => Ok(Self::Surface(serde_json::from_value(value)?)),
            other => Err(IpcError::UnknownChannel(other.to_string())),
        }
    }
}

/// Receiver of messages bound for a window's rendering surface.
pub trait SurfaceSink {
    /// Returns false once the surface no longer accepts messages.
    fn forward(&self, message: SurfaceMessage) -> bool;
}

impl SurfaceSink for SurfaceHandle {
    fn forward(&self, message: SurfaceMessage) -> bool {
        self.send(message).is_ok()
    }
}

/// Where a page message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Forwarded,
    /// Surface is gone; the message has no effect
    Dropped,
    /// The page's camera promise must be settled with `null` right away
    SettleAbsent { call: u64, reason: CameraFailure },
}

/// Route a decoded page message to the window's surface.
///
/// Camera calls that cannot reach a surface settle absent, so the page
/// promise never hangs.
pub fn route(message: IpcMessage, surface: Option<&dyn SurfaceSink>) -> Routed {
    match message {
        IpcMessage::Bridge(request) => {
            if !request.is_compatible() {
                return Routed::SettleAbsent {
                    call: request.call,
                    reason: CameraFailure::VersionMismatch {
                        expected: BRIDGE_VERSION,
                        got: request.version,
                    },
                };
            }
            match request.op {
                BridgeOp::RequestCamera => {
                    let mount = SurfaceMessage::Mount { call: request.call };
                    if surface.is_some_and(|sink| sink.forward(mount)) {
                        Routed::Forwarded
                    } else {
                        Routed::SettleAbsent {
                            call: request.call,
                            reason: CameraFailure::Platform("surface unavailable".into()),
                        }
                    }
                }
            }
        }
        IpcMessage::Surface(event) => match surface {
            Some(sink) if sink.forward(event.into()) => Routed::Forwarded,
            _ => Routed::Dropped,
        },
    }
}
