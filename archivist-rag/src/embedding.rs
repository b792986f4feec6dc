//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Gemini, OpenAI, etc.)
/// behind a unified async interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use archivist_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Must return exactly one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Reject vectors with NaN or infinite components.
///
/// # Errors
///
/// Returns [`RagError::NonFiniteVector`] naming the first bad component.
pub fn check_finite(vector: &[f32]) -> Result<()> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(RagError::NonFiniteVector { index, value: vector[index] }),
        None => Ok(()),
    }
}

/// Check that a provider response has one vector per input, each of
/// `dimensions` length with only finite components.
///
/// # Errors
///
/// Returns [`RagError::UpstreamUnavailable`] on a count mismatch,
/// [`RagError::DimensionMismatch`] on the first vector of the wrong length
/// and [`RagError::NonFiniteVector`] on the first NaN or infinite component.
pub fn check_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimensions: usize,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(RagError::upstream(
            "embedding",
            format!("expected {expected_count} embeddings, got {}", embeddings.len()),
        ));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
        return Err(RagError::DimensionMismatch { expected: dimensions, actual: bad.len() });
    }
    embeddings.iter().try_for_each(|e| check_finite(e))
}

/// Embed `texts` in batches of `batch_size`, with up to `concurrency`
/// requests in flight, preserving input order.
///
/// Fails on the first batch that errors or returns malformed vectors.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    batch_size: usize,
    concurrency: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    debug!(texts = texts.len(), batch_size, concurrency, "embedding in batches");

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size))
        .map(|batch| async move {
            let embeddings = provider.embed_batch(batch).await?;
            check_embeddings(&embeddings, batch.len(), dimensions)?;
            Ok::<_, RagError>(embeddings)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}
