//! VisionIDE Language Worker Router
//!
//! Delegates editor analysis to background workers chosen by document
//! language:
//! - `"typescript"` / `"javascript"` go to the language-service worker
//! - everything else goes to the generic syntax worker
//!
//! Workers are pooled per kind, started lazily, run on their own threads
//! behind a panic isolation boundary and talk to the router only through
//! channels. A crashed worker is respawned on the next request for its kind.

mod analyzer;
mod environment;
mod kind;
mod message;
mod router;
mod worker;

pub use analyzer::{Analysis, Analyzer, LanguageServiceAnalyzer, SyntaxAnalyzer};
pub use environment::{AnalyzerFactory, WorkerEnvironment};
pub use kind::{WorkerAssignment, WorkerKind};
pub use message::{
    AnalysisRequest, Completion, Diagnostic, DocumentId, Severity, WorkerEvent, WorkerId,
    WorkerMessage,
};
pub use router::{WorkerError, WorkerRouter};
