//! Editor documents.

use crate::highlight::highlight;
use serde::Serialize;
use std::sync::Arc;
use vide_workers::{AnalysisRequest, Completion, Diagnostic, DocumentId};

/// Language of the document every new window opens with.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Text of the document every new window opens with.
pub const DEFAULT_SOURCE: &str = r#"# VisionIDE - Gesture Coding Prototype
# Week 1: Webcam + Monaco overlay
def greet(name: str) -> str:
    return f"Hello, {name}! 👋"

print(greet("World"))"#;

/// A buffer of editable text. The language is fixed at creation.
#[derive(Debug, Clone)]
pub struct EditorDocument {
    id: DocumentId,
    language: String,
    content: String,
    revision: u64,
    analyzed_revision: Option<u64>,
    /// Revision whose analysis took its worker down
    crashed_revision: Option<u64>,
    diagnostics: Vec<Diagnostic>,
    completions: Vec<Completion>,
}

impl EditorDocument {
    pub fn new(id: DocumentId, language: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            language: language.into(),
            content: content.into(),
            revision: 1,
            analyzed_revision: None,
            crashed_revision: None,
            diagnostics: Vec::new(),
            completions: Vec::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the buffer and bump the revision.
    pub fn replace(&mut self, content: impl Into<String>) -> u64 {
        self.content = content.into();
        self.revision += 1;
        self.revision
    }

    /// Latest diagnostics, possibly for an older revision.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    /// Revision the current diagnostics belong to.
    pub fn analyzed_revision(&self) -> Option<u64> {
        self.analyzed_revision
    }

    /// Remember that analysing `revision` crashed its worker.
    pub fn mark_crashed(&mut self, revision: u64) {
        self.crashed_revision = Some(revision);
    }

    /// Whether the current revision still needs an analysis that is worth
    /// retrying. A revision that crashed a worker waits for the next edit.
    pub fn needs_analysis(&self) -> bool {
        self.analyzed_revision != Some(self.revision)
            && self.crashed_revision != Some(self.revision)
    }

    /// Store worker results unless they are for a stale revision.
    pub fn apply_analysis(
        &mut self,
        revision: u64,
        diagnostics: Vec<Diagnostic>,
        completions: Vec<Completion>,
    ) -> bool {
        if revision != self.revision {
            return false;
        }
        self.analyzed_revision = Some(revision);
        self.diagnostics = diagnostics;
        self.completions = completions;
        true
    }

    /// Request analysing the current revision.
    pub fn analysis_request(&self) -> AnalysisRequest {
        AnalysisRequest {
            document: self.id,
            language: self.language.clone(),
            revision: self.revision,
            text: Arc::from(self.content.as_str()),
        }
    }

    /// Page-facing snapshot of this document.
    pub fn update(&self) -> DocumentUpdate {
        DocumentUpdate {
            document: self.id,
            revision: self.revision,
            highlighted: highlight(&self.language, &self.content),
            diagnostics: self.diagnostics.clone(),
            completions: self.completions.clone(),
        }
    }
}

/// Document state pushed to the page after analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    pub document: DocumentId,
    pub revision: u64,
    /// Highlighted HTML for the current content
    pub highlighted: String,
    pub diagnostics: Vec<Diagnostic>,
    pub completions: Vec<Completion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vide_workers::Severity;

    #[test]
    fn test_replace_bumps_revision() {
        let mut doc = EditorDocument::new(DocumentId(1), "python", "x = 1");
        assert_eq!(doc.revision(), 1);
        assert_eq!(doc.replace("x = 2"), 2);
        assert_eq!(doc.content(), "x = 2");
        assert_eq!(doc.language(), "python");
    }

    #[test]
    fn test_stale_analysis_is_dropped() {
        let mut doc = EditorDocument::new(DocumentId(1), "python", "x = (");
        doc.replace("x = ()");

        let stale = vec![Diagnostic::new(1, 5, Severity::Error, "Unclosed '('")];
        assert!(!doc.apply_analysis(1, stale, Vec::new()));
        assert!(doc.diagnostics().is_empty());

        assert!(doc.apply_analysis(2, Vec::new(), Vec::new()));
        assert_eq!(doc.analyzed_revision(), Some(2));
    }

    #[test]
    fn test_default_source_survives_highlighting() {
        let doc = EditorDocument::new(DocumentId(1), DEFAULT_LANGUAGE, DEFAULT_SOURCE);
        let html = doc.update().highlighted;
        assert!(html.contains("Hello, {name}! 👋"));
        assert!(html.contains(
            "<span class=\"tok-comment\"># Week 1: Webcam + Monaco overlay</span>"
        ));
        assert_eq!(html.lines().count(), DEFAULT_SOURCE.lines().count());
        assert!(crate::escape(DEFAULT_SOURCE).contains("👋"));
    }

    #[test]
    fn test_crashed_revision_waits_for_edit() {
        let mut doc = EditorDocument::new(DocumentId(1), "python", "boom");
        assert!(doc.needs_analysis());

        doc.mark_crashed(1);
        assert!(!doc.needs_analysis());

        doc.replace("fine");
        assert!(doc.needs_analysis());
    }

    #[test]
    fn test_request_carries_current_revision() {
        let mut doc = EditorDocument::new(DocumentId(3), "typescript", "let a = 1;");
        doc.replace("let a = 2;");
        let req = doc.analysis_request();
        assert_eq!(req.document, DocumentId(3));
        assert_eq!(req.revision, 2);
        assert_eq!(&*req.text, "let a = 2;");
    }
}
