//! VisionIDE Capability Bridge
//!
//! The only channel between the privileged host process and the sandboxed
//! rendering surface. The surface holds an `Arc<dyn CapabilityBridge>` and
//! nothing else from the host, so every privileged effect it can cause is
//! one of the operations listed here.
//!
//! ```text
//! ┌───────────────────────┐  requestCamera()  ┌──────────────────────┐
//! │  Rendering Surface    │ ─────────────────▶│  Capability Bridge   │
//! │  (sandboxed webview)  │ ◀─────────────────│  (host, per window)  │
//! └───────────────────────┘  handle | absent  └──────────┬───────────┘
//!                                                        │
//!                                                        ▼
//!                                              ┌──────────────────────┐
//!                                              │   CameraProvider     │
//!                                              │  (platform devices)  │
//!                                              └──────────────────────┘
//! ```
//!
//! # Surface
//!
//! Version 1 exposes exactly one operation, `requestCamera`. It takes no
//! arguments and always resolves: either to a live [`MediaStreamHandle`] or
//! to an [`CameraFailure`] reason. Nothing raises across the boundary.

mod bridge;
mod camera;
mod protocol;

pub use bridge::{BridgeScope, CapabilityBridge, PlatformBridge, StaticBridge, BRIDGE_VERSION};
pub use camera::{
    CameraFailure, CameraOutcome, CameraProvider, DeviceGrant, DeviceId, FacingMode,
    MediaStreamHandle, StreamId, SystemCameraProvider, VideoConstraints,
};
pub use protocol::{
    preload_script, BridgeError, BridgeOp, BridgeReply, BridgeRequest, StreamDescriptor,
    BRIDGE_GLOBAL,
};
