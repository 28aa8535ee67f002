//! Analysis worker thread implementation with panic isolation.

use crate::analyzer::Analyzer;
use crate::kind::WorkerKind;
use crate::message::{WorkerEvent, WorkerId, WorkerMessage};
use crate::router::WorkerError;
use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Global worker ID counter
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

fn next_worker_id() -> WorkerId {
    WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Router-side handle to one running worker.
pub(crate) struct WorkerHandle {
    id: WorkerId,
    kind: WorkerKind,
    sender: Sender<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn send(&self, msg: WorkerMessage) -> Result<(), SendError<WorkerMessage>> {
        self.sender.send(msg)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Ignore errors if the worker is already gone
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("{} {} did not exit cleanly", self.kind, self.id);
            }
        }
    }
}

/// Spawn a new worker thread running `analyzer`.
///
/// Analysis runs inside a panic isolation boundary. A panic is reported as
/// [`WorkerEvent::Crashed`] and ends this instance; the router decides
/// whether to start a fresh one.
pub(crate) fn spawn_worker(
    kind: WorkerKind,
    analyzer: Box<dyn Analyzer>,
    events: Sender<WorkerEvent>,
) -> Result<WorkerHandle, WorkerError> {
    let id = next_worker_id();
    let (tx, rx) = unbounded();

    let thread = thread::Builder::new()
        .name(format!("{}-worker-{}", kind.name(), id.0))
        .spawn(move || {
            info!("{} worker {} started", kind, id);
            run_worker_loop(id, kind, analyzer, rx, events);
            info!("{} worker {} stopped", kind, id);
        })
        .map_err(|source| WorkerError::Spawn { kind, source })?;

    Ok(WorkerHandle {
        id,
        kind,
        sender: tx,
        thread: Some(thread),
    })
}

fn run_worker_loop(
    id: WorkerId,
    kind: WorkerKind,
    mut analyzer: Box<dyn Analyzer>,
    rx: Receiver<WorkerMessage>,
    events: Sender<WorkerEvent>,
) {
    loop {
        let request = match rx.recv() {
            Ok(WorkerMessage::Analyze(request)) => request,
            Ok(WorkerMessage::Shutdown) => {
                debug!("{} received shutdown", id);
                break;
            }
            Err(_) => {
                debug!("{} channel closed, shutting down", id);
                break;
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&request)));

        match result {
            Ok(analysis) => {
                let event = WorkerEvent::Analyzed {
                    worker: id,
                    document: request.document,
                    revision: request.revision,
                    diagnostics: analysis.diagnostics,
                    completions: analysis.completions,
                };
                if events.send(event).is_err() {
                    debug!("{} router gone, shutting down", id);
                    break;
                }
            }
            Err(panic_info) => {
                let error_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };

                error!("{} worker {} panicked on {}: {}", kind, id, request.document, error_msg);
                let _ = events.send(WorkerEvent::Crashed {
                    worker: id,
                    kind,
                    document: request.document,
                    revision: request.revision,
                    error: error_msg,
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analysis, SyntaxAnalyzer};
    use crate::message::{AnalysisRequest, DocumentId};
    use std::time::Duration;

    struct Exploding;

    impl Analyzer for Exploding {
        fn analyze(&mut self, _: &AnalysisRequest) -> Analysis {
            panic!("analyzer exploded");
        }
    }

    fn request(revision: u64) -> AnalysisRequest {
        AnalysisRequest {
            document: DocumentId(1),
            language: "python".into(),
            revision,
            text: "x = (1\n".into(),
        }
    }

    #[test]
    fn test_worker_answers_in_order() {
        let (events_tx, events_rx) = unbounded();
        let handle =
            spawn_worker(WorkerKind::Syntax, Box::new(SyntaxAnalyzer::new()), events_tx).unwrap();

        for revision in 1..=3 {
            handle.send(WorkerMessage::Analyze(request(revision))).unwrap();
        }
        for expected in 1..=3 {
            match events_rx.recv_timeout(Duration::from_secs(1)).unwrap() {
                WorkerEvent::Analyzed { revision, diagnostics, .. } => {
                    assert_eq!(revision, expected);
                    assert_eq!(diagnostics.len(), 1);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_worker_reports_panic() {
        let (events_tx, events_rx) = unbounded();
        let handle = spawn_worker(WorkerKind::Syntax, Box::new(Exploding), events_tx).unwrap();
        let id = handle.id();

        handle.send(WorkerMessage::Analyze(request(1))).unwrap();
        match events_rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            WorkerEvent::Crashed {
                worker,
                document,
                revision,
                error,
                ..
            } => {
                assert_eq!(worker, id);
                assert_eq!((document, revision), (DocumentId(1), 1));
                assert_eq!(error, "analyzer exploded");
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Dropping joins the stopped thread without hanging
        drop(handle);
    }
}
