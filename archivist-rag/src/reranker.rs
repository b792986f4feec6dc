//! Reranker trait for re-scoring search hits.

use async_trait::async_trait;

use crate::document::SearchHit;
use crate::error::Result;

/// A reranker that re-scores and reorders search hits.
///
/// The [`Retriever`](crate::Retriever) applies it after the score floor and
/// re-sorts by the returned scores, so implementations may change scores
/// without ordering the output themselves.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank hits given the original query.
    async fn rerank(&self, query: &str, hits: Vec<SearchHit>) -> Result<Vec<SearchHit>>;
}

/// A no-op reranker that returns hits unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use archivist_rag::NoOpReranker;
///
/// let reranker = NoOpReranker;
/// let reranked = reranker.rerank("query", hits).await?;
/// // reranked == hits (same order, same scores)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, hits: Vec<SearchHit>) -> Result<Vec<SearchHit>> {
        Ok(hits)
    }
}
