//! The rendering surface model.

use crate::document::{DocumentUpdate, EditorDocument, DEFAULT_LANGUAGE, DEFAULT_SOURCE};
use crate::layers::{Layer, LayerStack};
use crate::page::render_page;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vide_bridge::{
    CameraFailure, CameraOutcome, CapabilityBridge, MediaStreamHandle, StreamDescriptor,
};
use vide_workers::{
    Diagnostic, DocumentId, WorkerAssignment, WorkerEnvironment, WorkerEvent, WorkerKind,
    WorkerRouter,
};

/// Surface errors
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("No document {0}")]
    UnknownDocument(DocumentId),

    #[error("Surface is unmounted")]
    Unmounted,

    #[error("Failed to start surface task: {0}")]
    Task(#[from] std::io::Error),

    #[error(transparent)]
    Bridge(#[from] vide_bridge::BridgeError),

    #[error("Failed to encode page update: {0}")]
    Encode(#[from] serde_json::Error),
}

/// State of the camera background.
#[derive(Debug)]
pub enum VideoBackground {
    /// Not mounted yet
    Unmounted,
    /// Camera request in flight
    Requesting,
    /// Stream bound as video source
    Live(MediaStreamHandle),
    /// Rendering without video
    Degraded(CameraFailure),
}

/// What a caller must do to complete a mount.
pub enum MountStep {
    /// Mount already settled; no new camera request is made.
    AlreadyMounted(Option<StreamDescriptor>),
    /// A camera request from an earlier mount is still in flight.
    Pending,
    /// Call `request_camera` on this bridge and pass the outcome to
    /// [`RenderingSurface::finish_mount`].
    Request(Arc<dyn CapabilityBridge>),
}

/// Video background, overlay and editor, wired to a bridge and a worker
/// router.
pub struct RenderingSurface {
    bridge: Arc<dyn CapabilityBridge>,
    router: WorkerRouter,
    documents: BTreeMap<DocumentId, EditorDocument>,
    video: VideoBackground,
    layers: LayerStack,
    next_document: u64,
    released: bool,
}

impl RenderingSurface {
    /// Create a surface. The worker environment is fixed from here on.
    pub fn new(bridge: Arc<dyn CapabilityBridge>, env: WorkerEnvironment) -> Self {
        Self {
            bridge,
            router: WorkerRouter::new(env),
            documents: BTreeMap::new(),
            video: VideoBackground::Unmounted,
            layers: LayerStack::standard(),
            next_document: 1,
            released: false,
        }
    }

    /// Open the greeting document every window starts with.
    pub fn with_default_document(mut self) -> Self {
        let id = self.alloc_document();
        self.documents
            .insert(id, EditorDocument::new(id, DEFAULT_LANGUAGE, DEFAULT_SOURCE));
        self
    }

    fn alloc_document(&mut self) -> DocumentId {
        let id = DocumentId(self.next_document);
        self.next_document += 1;
        id
    }

    /// Whether the editor is mounted and documents are being analysed.
    pub fn is_mounted(&self) -> bool {
        !self.released && !matches!(self.video, VideoBackground::Unmounted)
    }

    /// First half of a mount. Registers documents with the router and tells
    /// the caller whether a camera request is needed.
    pub fn begin_mount(&mut self) -> Result<MountStep, SurfaceError> {
        if self.released {
            return Err(SurfaceError::Unmounted);
        }
        match &self.video {
            VideoBackground::Live(handle) => {
                return Ok(MountStep::AlreadyMounted(Some(handle.into())));
            }
            VideoBackground::Degraded(_) => return Ok(MountStep::AlreadyMounted(None)),
            VideoBackground::Requesting => return Ok(MountStep::Pending),
            VideoBackground::Unmounted => {}
        }

        self.video = VideoBackground::Requesting;
        let ids: Vec<DocumentId> = self.documents.keys().copied().collect();
        for id in ids {
            self.submit(id);
        }
        debug!("Surface mounting {} documents", self.documents.len());
        Ok(MountStep::Request(Arc::clone(&self.bridge)))
    }

    /// Second half of a mount: bind the stream or degrade.
    pub fn finish_mount(&mut self, outcome: CameraOutcome) -> Option<StreamDescriptor> {
        if self.released {
            debug!("Camera outcome arrived after unmount, releasing");
            return None;
        }
        if !matches!(self.video, VideoBackground::Requesting) {
            // Only one handle per surface
            warn!("Unexpected camera outcome, keeping current background");
            return self.stream();
        }
        match outcome {
            CameraOutcome::Granted(handle) => {
                let stream = StreamDescriptor::from(&handle);
                info!("Camera bound as video background ({})", handle.id());
                self.video = VideoBackground::Live(handle);
                Some(stream)
            }
            CameraOutcome::Unavailable(reason) => {
                info!("Rendering without video background: {}", reason);
                self.video = VideoBackground::Degraded(reason);
                None
            }
        }
    }

    /// Mount the surface. Idempotent; only the first call asks the bridge.
    pub async fn mount(&mut self) -> Result<Option<StreamDescriptor>, SurfaceError> {
        match self.begin_mount()? {
            MountStep::AlreadyMounted(stream) => Ok(stream),
            MountStep::Pending => Ok(None),
            MountStep::Request(bridge) => {
                let outcome = bridge.request_camera().await;
                Ok(self.finish_mount(outcome))
            }
        }
    }

    /// Release the stream and stop the workers.
    pub fn unmount(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.video = VideoBackground::Unmounted;
        self.router.shutdown();
        info!("Surface unmounted");
    }

    /// Add a document. It is analysed right away once mounted.
    pub fn open_document(
        &mut self,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<DocumentId, SurfaceError> {
        if self.released {
            return Err(SurfaceError::Unmounted);
        }
        let id = self.alloc_document();
        self.documents.insert(id, EditorDocument::new(id, language, text));
        if self.is_mounted() {
            self.submit(id);
        }
        Ok(id)
    }

    /// Replace a document's text. Returns the new revision.
    pub fn edit(&mut self, id: DocumentId, text: impl Into<String>) -> Result<u64, SurfaceError> {
        if self.released {
            return Err(SurfaceError::Unmounted);
        }
        let doc = self
            .documents
            .get_mut(&id)
            .ok_or(SurfaceError::UnknownDocument(id))?;
        let revision = doc.replace(text);
        if self.is_mounted() {
            self.submit(id);
        }
        Ok(revision)
    }

    pub fn document(&self, id: DocumentId) -> Result<&EditorDocument, SurfaceError> {
        self.documents.get(&id).ok_or(SurfaceError::UnknownDocument(id))
    }

    /// Documents in creation order.
    pub fn documents(&self) -> impl Iterator<Item = &EditorDocument> {
        self.documents.values()
    }

    pub fn diagnostics(&self, id: DocumentId) -> Result<&[Diagnostic], SurfaceError> {
        Ok(self.document(id)?.diagnostics())
    }

    /// Worker assignment for a document, computed on read.
    pub fn assignment(&self, id: DocumentId) -> Result<WorkerAssignment, SurfaceError> {
        Ok(self.router.assign(self.document(id)?.language()))
    }

    /// Apply finished analyses. Returns updates for documents whose results
    /// were current.
    pub fn poll_worker_events(&mut self) -> Vec<DocumentUpdate> {
        let mut updates = Vec::new();
        for event in self.router.poll_events() {
            match event {
                WorkerEvent::Analyzed {
                    document,
                    revision,
                    diagnostics,
                    completions,
                    ..
                } => {
                    let Some(doc) = self.documents.get_mut(&document) else {
                        continue;
                    };
                    if doc.apply_analysis(revision, diagnostics, completions) {
                        updates.push(doc.update());
                    } else {
                        debug!("Dropped stale analysis of {} (revision {})", document, revision);
                    }
                }
                WorkerEvent::Crashed {
                    worker,
                    kind,
                    document,
                    revision,
                    error,
                } => {
                    error!(
                        "{} worker {} crashed on {} (revision {}): {}",
                        kind, worker, document, revision, error
                    );
                    if let Some(doc) = self.documents.get_mut(&document) {
                        doc.mark_crashed(revision);
                    }
                    if !self.released {
                        self.resubmit_kind(kind);
                    }
                }
            }
        }
        updates
    }

    fn resubmit_kind(&mut self, kind: WorkerKind) {
        let ids: Vec<DocumentId> = self
            .documents
            .values()
            .filter(|doc| doc.needs_analysis())
            .filter(|doc| {
                let assignment = self.router.assign(doc.language());
                assignment.requested == kind || assignment.resolved == kind
            })
            .map(|doc| doc.id())
            .collect();
        for id in ids {
            self.submit(id);
        }
    }

    fn submit(&mut self, id: DocumentId) {
        let Some(doc) = self.documents.get(&id) else {
            return;
        };
        if let Err(err) = self.router.submit(doc.analysis_request()) {
            warn!("Analysis of {} unavailable: {}", id, err);
        }
    }

    pub fn video(&self) -> &VideoBackground {
        &self.video
    }

    pub fn has_live_video(&self) -> bool {
        matches!(self.video, VideoBackground::Live(_))
    }

    /// Descriptor of the bound stream, if any.
    pub fn stream(&self) -> Option<StreamDescriptor> {
        match &self.video {
            VideoBackground::Live(handle) => Some(handle.into()),
            _ => None,
        }
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    /// Layer that receives pointer and keyboard input.
    pub fn input_target(&self) -> Option<Layer> {
        self.layers.input_target()
    }

    /// Mounted with the editor on top of the input stack.
    pub fn is_interactive(&self) -> bool {
        self.is_mounted() && self.input_target() == Some(Layer::Editor)
    }

    /// Full page markup for the current state.
    pub fn render_page(&self) -> String {
        let stream = self.stream();
        render_page(self.documents.values(), &self.layers, stream.as_ref())
    }

    pub fn router(&self) -> &WorkerRouter {
        &self.router
    }
}

impl Drop for RenderingSurface {
    fn drop(&mut self) {
        self.unmount();
    }
}
