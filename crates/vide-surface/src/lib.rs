//! VisionIDE Rendering Surface
//!
//! Composes the window content: a full-bleed camera background, a
//! translucent overlay and the editor on top. The surface reaches the host
//! only through the [`CapabilityBridge`](vide_bridge::CapabilityBridge) it
//! was built with, and hands editor analysis to a
//! [`WorkerRouter`](vide_workers::WorkerRouter) configured by the
//! [`WorkerEnvironment`](vide_workers::WorkerEnvironment) it was built with.

mod document;
mod highlight;
mod layers;
mod page;
mod surface;
mod task;

pub use document::{DocumentUpdate, EditorDocument, DEFAULT_LANGUAGE, DEFAULT_SOURCE};
pub use highlight::{escape, highlight};
pub use layers::{Layer, LayerStack};
pub use page::{render_page, PageEvent};
pub use surface::{MountStep, RenderingSurface, SurfaceError, VideoBackground};
pub use task::{
    spawn_surface, CameraGate, PageSnapshot, SurfaceHandle, SurfaceMessage, SurfaceUpdate,
};
