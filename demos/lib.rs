//! Shared helpers for the demo programs.
//!
//! The demos run without API keys: [`VocabularyEmbedder`] maps text to a
//! bag-of-words vector over a fixed vocabulary, which is enough for cosine
//! similarity to rank related passages first.

use archivist_rag::EmbeddingProvider;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Deterministic embeddings: one dimension per vocabulary word holding its
/// occurrence count, plus a small constant so no vector is zero.
pub struct VocabularyEmbedder {
    vocabulary: Vec<String>,
}

impl VocabularyEmbedder {
    /// Create an embedder over `vocabulary` (matched case-insensitively).
    pub fn new(vocabulary: &[&str]) -> Self {
        Self { vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect() }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> archivist_rag::Result<Vec<f32>> {
        let text = text.to_lowercase();
        let mut embedding: Vec<f32> =
            self.vocabulary.iter().map(|word| text.matches(word.as_str()).count() as f32).collect();
        embedding.push(0.05);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len() + 1
    }
}

/// Log to stderr, honouring `RUST_LOG` and defaulting to `level`.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}
