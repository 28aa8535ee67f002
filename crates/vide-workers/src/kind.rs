//! Worker selection policy.

use serde::Serialize;
use std::fmt;

/// Kinds of analysis worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerKind {
    /// Type-aware TypeScript/JavaScript analysis
    LanguageService,
    /// Syntax-only analysis for every other language
    Syntax,
}

impl WorkerKind {
    /// Pick the worker kind for a language identifier.
    ///
    /// Pure: the same identifier always yields the same kind.
    pub fn for_language(language: &str) -> Self {
        match language {
            "typescript" | "javascript" => Self::LanguageService,
            _ => Self::Syntax,
        }
    }

    /// Short name used for thread names and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::LanguageService => "ts",
            Self::Syntax => "syntax",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computed pairing of a language with the worker kind serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub language: String,
    /// Kind the policy asks for
    pub requested: WorkerKind,
    /// Kind actually serving the language (differs after a downgrade)
    pub resolved: WorkerKind,
}

impl WorkerAssignment {
    pub fn is_downgraded(&self) -> bool {
        self.requested != self.resolved
    }
}
