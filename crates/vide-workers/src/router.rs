//! Router - picks, starts and supervises analysis workers.

use crate::environment::WorkerEnvironment;
use crate::kind::{WorkerAssignment, WorkerKind};
use crate::message::{AnalysisRequest, WorkerEvent, WorkerId, WorkerMessage};
use crate::worker::{spawn_worker, WorkerHandle};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Router errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Failed to instantiate {kind} worker: {reason}")]
    Instantiate { kind: WorkerKind, reason: String },

    #[error("Failed to spawn {kind} worker thread: {source}")]
    Spawn {
        kind: WorkerKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} worker exceeded its respawn limit")]
    Exhausted { kind: WorkerKind },

    #[error("{kind} worker disconnected")]
    Disconnected { kind: WorkerKind },

    #[error("Router is shut down")]
    ShutDown,
}

/// Routes analysis requests to one pooled worker per kind.
pub struct WorkerRouter {
    env: WorkerEnvironment,
    /// Live worker per resolved kind
    workers: HashMap<WorkerKind, WorkerHandle>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    /// Events already pulled off the channel but not yet handed out
    pending: VecDeque<WorkerEvent>,
    /// Kinds whose last instance crashed
    crashed: HashSet<WorkerKind>,
    respawns: HashMap<WorkerKind, usize>,
    /// Kinds that were replaced by the syntax worker
    downgraded: HashSet<WorkerKind>,
    exhausted: HashSet<WorkerKind>,
    shut_down: bool,
}

impl WorkerRouter {
    /// Create a router. No worker starts until the first request.
    pub fn new(env: WorkerEnvironment) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            env,
            workers: HashMap::new(),
            events_tx,
            events_rx,
            pending: VecDeque::new(),
            crashed: HashSet::new(),
            respawns: HashMap::new(),
            downgraded: HashSet::new(),
            exhausted: HashSet::new(),
            shut_down: false,
        }
    }

    /// Compute the assignment for a language.
    pub fn assign(&self, language: &str) -> WorkerAssignment {
        let requested = WorkerKind::for_language(language);
        let resolved = if self.downgraded.contains(&requested) {
            WorkerKind::Syntax
        } else {
            requested
        };
        WorkerAssignment {
            language: language.to_string(),
            requested,
            resolved,
        }
    }

    /// The worker serving `language`, started on first use.
    pub fn worker_for(&mut self, language: &str) -> Result<WorkerId, WorkerError> {
        let kind = self.assign(language).resolved;
        self.ensure(kind)
    }

    /// Queue an analysis request on the worker for its language.
    ///
    /// Requests for one document reach the worker in submission order.
    pub fn submit(&mut self, request: AnalysisRequest) -> Result<WorkerId, WorkerError> {
        self.pump();
        let id = self.worker_for(&request.language)?;
        let kind = self.assign(&request.language).resolved;

        let msg = WorkerMessage::Analyze(request);
        let Some(handle) = self.workers.get(&kind) else {
            return Err(WorkerError::Disconnected { kind });
        };
        match handle.send(msg) {
            Ok(()) => Ok(id),
            Err(returned) => {
                // Died between crash report and our last pump
                warn!("{} worker {} unreachable, restarting", kind, id);
                self.retire(kind);
                let id = self.ensure(kind)?;
                let kind = if self.downgraded.contains(&kind) { WorkerKind::Syntax } else { kind };
                self.workers
                    .get(&kind)
                    .ok_or(WorkerError::Disconnected { kind })?
                    .send(returned.into_inner())
                    .map_err(|_| WorkerError::Disconnected { kind })?;
                Ok(id)
            }
        }
    }

    /// Drain worker events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<WorkerEvent> {
        self.pump();
        self.pending.drain(..).collect()
    }

    /// Wait up to `timeout` for the next worker event.
    pub fn recv_event_timeout(&mut self, timeout: Duration) -> Option<WorkerEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.observe(&event);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Current worker instance for a kind, if running.
    pub fn worker_id(&self, kind: WorkerKind) -> Option<WorkerId> {
        self.workers.get(&kind).map(|h| h.id())
    }

    /// Number of running workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Times a kind has been restarted after a crash.
    pub fn respawn_count(&self, kind: WorkerKind) -> usize {
        self.respawns.get(&kind).copied().unwrap_or(0)
    }

    /// Stop every worker and refuse further requests.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let count = self.workers.len();
        // Handles send Shutdown and join on drop
        self.workers.clear();
        info!("Worker router shut down ({} workers stopped)", count);
    }

    fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.observe(&event);
            self.pending.push_back(event);
        }
    }

    fn observe(&mut self, event: &WorkerEvent) {
        if let WorkerEvent::Crashed { worker, kind, .. } = event {
            if self.worker_id(*kind) == Some(*worker) {
                self.retire(*kind);
            }
        }
    }

    fn retire(&mut self, kind: WorkerKind) {
        self.workers.remove(&kind);
        self.crashed.insert(kind);
    }

    fn spawn(&mut self, kind: WorkerKind) -> Result<WorkerId, WorkerError> {
        let analyzer = self.env.instantiate(kind)?;
        let handle = spawn_worker(kind, analyzer, self.events_tx.clone())?;
        let id = handle.id();
        self.workers.insert(kind, handle);
        debug!("Started {} worker {}", kind, id);
        Ok(id)
    }

    fn ensure(&mut self, kind: WorkerKind) -> Result<WorkerId, WorkerError> {
        if self.shut_down {
            return Err(WorkerError::ShutDown);
        }
        if let Some(handle) = self.workers.get(&kind) {
            return Ok(handle.id());
        }
        if self.exhausted.contains(&kind) {
            return Err(WorkerError::Exhausted { kind });
        }

        let result = if self.crashed.remove(&kind) {
            let count = self.respawns.entry(kind).or_default();
            *count += 1;
            if *count > self.env.respawn_limit() {
                Err(WorkerError::Exhausted { kind })
            } else {
                info!("Respawning {} worker (restart {})", kind, count);
                self.spawn(kind)
            }
        } else {
            self.spawn(kind)
        };

        match result {
            Ok(id) => Ok(id),
            Err(err) => {
                if matches!(err, WorkerError::Exhausted { .. }) {
                    self.exhausted.insert(kind);
                }
                match kind {
                    WorkerKind::LanguageService => {
                        warn!("{}; downgrading to the syntax worker", err);
                        self.downgraded.insert(kind);
                        self.ensure(WorkerKind::Syntax)
                    }
                    WorkerKind::Syntax => {
                        error!("{}", err);
                        Err(err)
                    }
                }
            }
        }
    }
}

impl Drop for WorkerRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analysis, Analyzer, SyntaxAnalyzer};
    use crate::message::DocumentId;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    /// Panics on any text containing "boom".
    struct Fragile(SyntaxAnalyzer);

    impl Analyzer for Fragile {
        fn analyze(&mut self, request: &AnalysisRequest) -> Analysis {
            if request.text.contains("boom") {
                panic!("fragile analyzer hit boom");
            }
            self.0.analyze(request)
        }
    }

    fn fragile_env() -> WorkerEnvironment {
        WorkerEnvironment::with_factory(|_| {
            Ok(Box::new(Fragile(SyntaxAnalyzer::new())) as Box<dyn Analyzer>)
        })
    }

    fn request(doc: u64, language: &str, revision: u64, text: &str) -> AnalysisRequest {
        AnalysisRequest {
            document: DocumentId(doc),
            language: language.into(),
            revision,
            text: Arc::from(text),
        }
    }

    fn wait_for_crash(router: &mut WorkerRouter) {
        loop {
            match router.recv_event_timeout(WAIT) {
                Some(WorkerEvent::Crashed { .. }) => return,
                Some(_) => continue,
                None => panic!("no crash event"),
            }
        }
    }

    #[test]
    fn test_workers_start_lazily() {
        let mut router = WorkerRouter::new(WorkerEnvironment::standard());
        assert_eq!(router.worker_count(), 0);

        router.worker_for("python").unwrap();
        assert_eq!(router.worker_count(), 1);
    }

    #[test]
    fn test_same_kind_reuses_instance() {
        let mut router = WorkerRouter::new(WorkerEnvironment::standard());

        let ts = router.worker_for("typescript").unwrap();
        let js = router.worker_for("javascript").unwrap();
        let py = router.worker_for("python").unwrap();
        let rs = router.worker_for("rust").unwrap();

        assert_eq!(ts, js);
        assert_eq!(py, rs);
        assert_ne!(ts, py);
        assert_eq!(router.worker_count(), 2);
        assert_eq!(router.worker_for("typescript").unwrap(), ts);
    }

    #[test]
    fn test_results_arrive_in_submission_order() {
        let mut router = WorkerRouter::new(WorkerEnvironment::standard());
        for revision in 1..=5 {
            router.submit(request(1, "python", revision, "print(1)\n")).unwrap();
        }

        let mut seen = Vec::new();
        while seen.len() < 5 {
            match router.recv_event_timeout(WAIT) {
                Some(WorkerEvent::Analyzed { revision, .. }) => seen.push(revision),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_crashed_worker_is_respawned() {
        let mut router = WorkerRouter::new(fragile_env());
        let first = router.submit(request(1, "python", 1, "boom")).unwrap();
        wait_for_crash(&mut router);
        assert_eq!(router.worker_count(), 0);

        let second = router.submit(request(1, "python", 2, "ok = 1\n")).unwrap();
        assert_ne!(first, second);
        assert_eq!(router.respawn_count(WorkerKind::Syntax), 1);

        match router.recv_event_timeout(WAIT) {
            Some(WorkerEvent::Analyzed { worker, revision, .. }) => {
                assert_eq!(worker, second);
                assert_eq!(revision, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_crash_is_isolated_to_its_kind() {
        let env = WorkerEnvironment::with_factory(|kind| {
            let analyzer: Box<dyn Analyzer> = match kind {
                WorkerKind::Syntax => Box::new(Fragile(SyntaxAnalyzer::new())),
                WorkerKind::LanguageService => Box::new(crate::LanguageServiceAnalyzer::new()),
            };
            Ok(analyzer)
        });
        let mut router = WorkerRouter::new(env);
        let ts = router.worker_for("typescript").unwrap();

        router.submit(request(1, "python", 1, "boom")).unwrap();
        wait_for_crash(&mut router);

        assert_eq!(router.worker_id(WorkerKind::LanguageService), Some(ts));
        assert_eq!(router.worker_id(WorkerKind::Syntax), None);
    }

    #[test]
    fn test_failed_language_service_downgrades() {
        let env = WorkerEnvironment::with_factory(|kind| match kind {
            WorkerKind::LanguageService => Err("tsserver bundle missing".to_string()),
            WorkerKind::Syntax => Ok(Box::new(SyntaxAnalyzer::new()) as Box<dyn Analyzer>),
        });
        let mut router = WorkerRouter::new(env);

        let ts = router.worker_for("typescript").unwrap();
        let py = router.worker_for("python").unwrap();
        assert_eq!(ts, py);

        let assignment = router.assign("typescript");
        assert_eq!(assignment.requested, WorkerKind::LanguageService);
        assert_eq!(assignment.resolved, WorkerKind::Syntax);
        assert!(assignment.is_downgraded());
    }

    #[test]
    fn test_respawn_limit_exhausts_syntax_worker() {
        let mut router = WorkerRouter::new(fragile_env().max_respawns(1));

        router.submit(request(1, "python", 1, "boom")).unwrap();
        wait_for_crash(&mut router);
        router.submit(request(1, "python", 2, "boom")).unwrap();
        wait_for_crash(&mut router);

        let err = router.submit(request(1, "python", 3, "fine\n")).unwrap_err();
        assert!(matches!(err, WorkerError::Exhausted { kind: WorkerKind::Syntax }));
    }

    #[test]
    fn test_shutdown_refuses_requests() {
        let mut router = WorkerRouter::new(WorkerEnvironment::standard());
        router.worker_for("python").unwrap();
        router.shutdown();

        assert_eq!(router.worker_count(), 0);
        assert!(matches!(router.worker_for("python"), Err(WorkerError::ShutDown)));
    }
}
