//! UI task that drives a surface on its own thread.

use crate::document::DocumentUpdate;
use crate::page::PageEvent;
use crate::surface::{MountStep, RenderingSurface, SurfaceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vide_bridge::{BridgeReply, CameraFailure, CameraOutcome};
use vide_workers::DocumentId;

/// How often finished analyses are collected
const WORKER_POLL: Duration = Duration::from_millis(25);

/// Input to the surface task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceMessage {
    /// The page called `requestCamera`; `call` identifies the promise
    Mount { call: u64 },
    Edit { document: DocumentId, text: String },
    Shutdown,
}

impl From<PageEvent> for SurfaceMessage {
    fn from(event: PageEvent) -> Self {
        match event {
            PageEvent::Edit { document, text } => Self::Edit {
                document: DocumentId(document),
                text,
            },
        }
    }
}

/// Output of the surface task, delivered to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUpdate {
    CameraSettled(BridgeReply),
    Document(DocumentUpdate),
}

impl SurfaceUpdate {
    /// Script applying this update in the page.
    pub fn to_script(&self) -> Result<String, SurfaceError> {
        match self {
            Self::CameraSettled(reply) => Ok(reply.to_script()?),
            Self::Document(update) => {
                let json = serde_json::to_string(update)?;
                Ok(format!("window.__visionideApply && window.__visionideApply({json});"))
            }
        }
    }
}

/// Shared view of the latest page markup.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot(Arc<Mutex<String>>);

impl PageSnapshot {
    fn new(html: String) -> Self {
        Self(Arc::new(Mutex::new(html)))
    }

    pub fn html(&self) -> String {
        match self.0.lock() {
            Ok(page) => page.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, surface: &RenderingSurface) {
        let html = surface.render_page();
        match self.0.lock() {
            Ok(mut current) => *current = html,
            Err(poisoned) => *poisoned.into_inner() = html,
        }
    }
}

/// Whether the webview may open the camera. Open only while the surface
/// holds a live stream granted by its bridge.
#[derive(Debug, Clone, Default)]
pub struct CameraGate(Arc<AtomicBool>);

impl CameraGate {
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn follow(&self, surface: &RenderingSurface) {
        self.0.store(surface.has_live_video(), Ordering::SeqCst);
    }
}

/// Handle to a running surface task.
pub struct SurfaceHandle {
    tx: UnboundedSender<SurfaceMessage>,
    thread: Option<JoinHandle<()>>,
    page: PageSnapshot,
    gate: CameraGate,
}

impl SurfaceHandle {
    pub fn send(&self, message: SurfaceMessage) -> Result<(), SurfaceError> {
        self.tx.send(message).map_err(|_| SurfaceError::Unmounted)
    }

    /// Latest page markup.
    pub fn page(&self) -> String {
        self.page.html()
    }

    /// Snapshot that keeps tracking the page after the handle moves.
    pub fn snapshot(&self) -> PageSnapshot {
        self.page.clone()
    }

    /// Gate tracking whether the surface holds a granted stream.
    pub fn camera_gate(&self) -> CameraGate {
        self.gate.clone()
    }

    /// Stop the task and wait for it to unmount the surface.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.tx.send(SurfaceMessage::Shutdown);
        if thread.join().is_err() {
            warn!("Surface task panicked during shutdown");
        }
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn settle_camera(
    task: &mut Option<tokio::task::JoinHandle<CameraOutcome>>,
) -> Result<CameraOutcome, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

async fn run<F>(
    mut surface: RenderingSurface,
    mut rx: UnboundedReceiver<SurfaceMessage>,
    sink: F,
    page: PageSnapshot,
    gate: CameraGate,
) where
    F: Fn(SurfaceUpdate),
{
    let mut poll = tokio::time::interval(WORKER_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut camera: Option<tokio::task::JoinHandle<CameraOutcome>> = None;
    // Promises waiting on the in-flight camera request
    let mut waiting: Vec<u64> = Vec::new();

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(SurfaceMessage::Mount { call }) => match surface.begin_mount() {
                    Ok(MountStep::AlreadyMounted(stream)) => {
                        sink(SurfaceUpdate::CameraSettled(BridgeReply { call, stream }));
                    }
                    Ok(MountStep::Pending) => waiting.push(call),
                    Ok(MountStep::Request(bridge)) => {
                        waiting.push(call);
                        camera = Some(tokio::spawn(async move { bridge.request_camera().await }));
                    }
                    Err(err) => {
                        warn!("Mount refused: {}", err);
                        sink(SurfaceUpdate::CameraSettled(BridgeReply::absent(call)));
                    }
                },
                Some(SurfaceMessage::Edit { document, text }) => {
                    match surface.edit(document, text) {
                        Ok(revision) => {
                            debug!("{} at revision {}", document, revision);
                            page.publish(&surface);
                        }
                        Err(err) => warn!("Edit dropped: {}", err),
                    }
                }
                Some(SurfaceMessage::Shutdown) | None => break,
            },
            joined = settle_camera(&mut camera) => {
                camera = None;
                let outcome = joined.unwrap_or_else(|err| {
                    CameraOutcome::Unavailable(CameraFailure::Platform(err.to_string()))
                });
                let stream = surface.finish_mount(outcome);
                gate.follow(&surface);
                for call in waiting.drain(..) {
                    let reply = BridgeReply { call, stream: stream.clone() };
                    sink(SurfaceUpdate::CameraSettled(reply));
                }
                page.publish(&surface);
            }
            _ = poll.tick() => {
                let updates = surface.poll_worker_events();
                if !updates.is_empty() {
                    page.publish(&surface);
                }
                for update in updates {
                    sink(SurfaceUpdate::Document(update));
                }
            }
        }
    }

    if let Some(task) = camera.take() {
        task.abort();
    }
    surface.unmount();
    gate.follow(&surface);
}

/// Run `surface` on a dedicated thread with a single-threaded runtime.
/// Updates for the page are handed to `sink`.
pub fn spawn_surface<F>(surface: RenderingSurface, sink: F) -> Result<SurfaceHandle, SurfaceError>
where
    F: Fn(SurfaceUpdate) + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let page = PageSnapshot::new(surface.render_page());
    let (tx, rx) = unbounded_channel();

    let gate = CameraGate::default();
    let task_page = page.clone();
    let task_gate = gate.clone();
    let thread = thread::Builder::new()
        .name("surface".into())
        .spawn(move || {
            runtime.block_on(run(surface, rx, sink, task_page, task_gate));
            info!("Surface task stopped");
        })?;

    Ok(SurfaceHandle {
        tx,
        thread: Some(thread),
        page,
        gate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vide_bridge::{CameraFailure, StaticBridge};
    use vide_workers::WorkerEnvironment;

    const WAIT: Duration = Duration::from_secs(2);

    fn start(bridge: Arc<StaticBridge>) -> (SurfaceHandle, UnboundedReceiver<SurfaceUpdate>) {
        let surface =
            RenderingSurface::new(bridge, WorkerEnvironment::standard()).with_default_document();
        let (tx, rx) = unbounded_channel();
        let handle = spawn_surface(surface, move |update| {
            let _ = tx.send(update);
        })
        .unwrap();
        (handle, rx)
    }

    async fn next_reply(rx: &mut UnboundedReceiver<SurfaceUpdate>) -> BridgeReply {
        loop {
            match tokio::time::timeout(WAIT, rx.recv()).await {
                Ok(Some(SurfaceUpdate::CameraSettled(reply))) => return reply,
                Ok(Some(_)) => continue,
                other => panic!("no camera reply: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_repeated_mount_settles_every_call() {
        let bridge = Arc::new(StaticBridge::granting());
        let (handle, mut rx) = start(bridge.clone());

        handle.send(SurfaceMessage::Mount { call: 1 }).unwrap();
        handle.send(SurfaceMessage::Mount { call: 2 }).unwrap();

        let first = next_reply(&mut rx).await;
        let second = next_reply(&mut rx).await;
        assert_eq!((first.call, second.call), (1, 2));
        assert!(first.stream.is_some());
        assert_eq!(first.stream, second.stream);
        assert_eq!(bridge.calls(), 1);
    }

    #[tokio::test]
    async fn test_camera_gate_follows_grant() {
        let (mut handle, mut rx) = start(Arc::new(StaticBridge::granting()));
        let gate = handle.camera_gate();
        assert!(!gate.is_open());

        handle.send(SurfaceMessage::Mount { call: 1 }).unwrap();
        assert!(next_reply(&mut rx).await.stream.is_some());
        assert!(gate.is_open());

        handle.shutdown();
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn test_denied_camera_settles_absent() {
        let bridge = Arc::new(StaticBridge::denying(CameraFailure::NoDevice));
        let (handle, mut rx) = start(bridge);

        handle.send(SurfaceMessage::Mount { call: 9 }).unwrap();
        assert_eq!(next_reply(&mut rx).await, BridgeReply::absent(9));
        assert!(!handle.camera_gate().is_open());
        assert!(handle.page().contains("<video id=\"camera\" autoplay muted playsinline></video>"));
    }

    #[tokio::test]
    async fn test_edit_reaches_page() {
        let (handle, mut rx) = start(Arc::new(StaticBridge::granting()));
        handle.send(SurfaceMessage::Mount { call: 1 }).unwrap();
        handle
            .send(PageEvent::Edit { document: 1, text: "answer = 42\n".into() }.into())
            .unwrap();

        loop {
            match tokio::time::timeout(WAIT, rx.recv()).await {
                Ok(Some(SurfaceUpdate::Document(update))) if update.revision == 2 => {
                    assert_eq!(update.document, DocumentId(1));
                    assert!(update.highlighted.contains("tok-number"));
                    break;
                }
                Ok(Some(_)) => continue,
                other => panic!("no document update: {other:?}"),
            }
        }
        assert!(handle.page().contains("answer = 42"));
    }

    #[test]
    fn test_update_scripts() {
        let script = SurfaceUpdate::CameraSettled(BridgeReply::absent(3)).to_script().unwrap();
        assert!(script.contains(r#"{"call":3,"stream":null}"#));

        let doc = crate::EditorDocument::new(DocumentId(1), "python", "x");
        let script = SurfaceUpdate::Document(doc.update()).to_script().unwrap();
        assert!(script.starts_with("window.__visionideApply"));
        assert!(script.contains(r#""document":1"#));
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let (mut handle, _rx) = start(Arc::new(StaticBridge::granting()));
        handle.shutdown();
        assert!(matches!(
            handle.send(SurfaceMessage::Mount { call: 1 }),
            Err(SurfaceError::Unmounted)
        ));
    }
}
