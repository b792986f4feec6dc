//! Document analyzer seam.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Turns a stored document (PDF, LaTeX source, ...) into raw text.
///
/// The text is treated as opaque: it may contain LaTeX or Markdown
/// headings, which the segmenter understands.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Return the raw text of `document_id`.
    async fn raw_text(&self, document_id: &str) -> Result<String>;
}

/// A [`DocumentAnalyzer`] serving texts from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticAnalyzer {
    texts: HashMap<String, String>,
}

impl StaticAnalyzer {
    /// Create an analyzer with no documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the text of a document.
    pub fn with_document(
        mut self,
        document_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.texts.insert(document_id.into(), text.into());
        self
    }
}

#[async_trait]
impl DocumentAnalyzer for StaticAnalyzer {
    async fn raw_text(&self, document_id: &str) -> Result<String> {
        self.texts.get(document_id).cloned().ok_or_else(|| {
            RagError::upstream("analyzer", format!("unknown document '{document_id}'"))
        })
    }
}
