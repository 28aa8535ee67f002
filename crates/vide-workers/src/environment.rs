//! Worker environment: how analyzers get built.
//!
//! An explicit value handed to each router at construction, so two
//! surfaces can run with different worker setups side by side.

use crate::analyzer::{Analyzer, LanguageServiceAnalyzer, SyntaxAnalyzer};
use crate::kind::WorkerKind;
use crate::router::WorkerError;
use std::fmt;
use std::sync::Arc;

/// Builds the analyzer a new worker of the given kind will run.
pub type AnalyzerFactory =
    Arc<dyn Fn(WorkerKind) -> Result<Box<dyn Analyzer>, String> + Send + Sync>;

/// Default number of times a crashed worker kind is restarted.
const DEFAULT_MAX_RESPAWNS: usize = 3;

#[derive(Clone)]
pub struct WorkerEnvironment {
    factory: AnalyzerFactory,
    max_respawns: usize,
}

impl WorkerEnvironment {
    /// Built-in analyzers for both kinds.
    pub fn standard() -> Self {
        Self::with_factory(|kind| {
            let analyzer: Box<dyn Analyzer> = match kind {
                WorkerKind::LanguageService => Box::new(LanguageServiceAnalyzer::new()),
                WorkerKind::Syntax => Box::new(SyntaxAnalyzer::new()),
            };
            Ok(analyzer)
        })
    }

    /// Custom analyzer construction.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(WorkerKind) -> Result<Box<dyn Analyzer>, String> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            max_respawns: DEFAULT_MAX_RESPAWNS,
        }
    }

    /// Cap on restarts per worker kind.
    pub fn max_respawns(mut self, max: usize) -> Self {
        self.max_respawns = max;
        self
    }

    pub fn respawn_limit(&self) -> usize {
        self.max_respawns
    }

    pub(crate) fn instantiate(&self, kind: WorkerKind) -> Result<Box<dyn Analyzer>, WorkerError> {
        (self.factory)(kind).map_err(|reason| WorkerError::Instantiate { kind, reason })
    }
}

impl Default for WorkerEnvironment {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for WorkerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerEnvironment")
            .field("max_respawns", &self.max_respawns)
            .finish_non_exhaustive()
    }
}
