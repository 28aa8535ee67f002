//! Message types for communication between the router and workers.

use crate::kind::WorkerKind;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for an editor document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Doc({})", self.0)
    }
}

/// Unique identifier for a worker instance. A respawned worker gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({})", self.0)
    }
}

/// One analysis job for one revision of a document.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub document: DocumentId,
    pub language: String,
    /// Monotonic per document
    pub revision: u64,
    pub text: Arc<str>,
}

/// Messages sent from the router to a worker.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Analyze(AnalysisRequest),
    /// Graceful shutdown request
    Shutdown,
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

/// A located finding. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            severity,
            message: message.into(),
        }
    }
}

/// A completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Completion {
    pub label: String,
    pub detail: &'static str,
}

/// Messages sent from workers back to the router.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Analysis finished for a revision
    Analyzed {
        worker: WorkerId,
        document: DocumentId,
        revision: u64,
        diagnostics: Vec<Diagnostic>,
        completions: Vec<Completion>,
    },
    /// Worker panicked on a request and has stopped
    Crashed {
        worker: WorkerId,
        kind: WorkerKind,
        document: DocumentId,
        revision: u64,
        error: String,
    },
}
