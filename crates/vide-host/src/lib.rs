//! VisionIDE host process.
//!
//! Owns the windows, decides where their content comes from, and wires each
//! webview to a capability bridge and a rendering surface.

pub mod assets;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod ipc;
pub mod mode;
pub mod platform;
pub mod session;
mod tao_platform;

pub use config::{ConfigError, HostConfig, LoadPolicy, WindowConfig};
pub use controller::{ExitDecision, HostController, LoadAction, PlatformPolicy};
pub use endpoint::{check_endpoint, spawn_endpoint_check, ENDPOINT_CHECK_TIMEOUT};
pub use ipc::{route, IpcError, IpcMessage, Routed, SurfaceSink};
pub use mode::{LoadSource, RunMode, MODE_FLAG};
pub use platform::{WindowKey, WindowPlatform};
pub use session::{ContentStatus, LifecycleError, SessionState, WindowSession};
pub use tao_platform::{run, UserEvent};
