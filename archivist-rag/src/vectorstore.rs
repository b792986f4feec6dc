//! Vector store trait for storing and searching indexed units.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::VectorStoreConfig;
use crate::document::{IndexedUnit, MetadataFilter, SearchHit};
use crate::error::Result;
use crate::inmemory::InMemoryVectorStore;

/// A storage backend for embedded chunks with similarity search.
///
/// Every backend enforces one fixed dimension, treats `id` as the identity
/// of a unit (upserting an existing id replaces it) and applies filters as
/// exact field matches before scoring.
///
/// # Example
///
/// ```rust,ignore
/// use archivist_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(768);
/// store.upsert(&units).await?;
/// let hits = store.search(&query_embedding, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace units by id.
    ///
    /// Fails with [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch)
    /// or [`RagError::NonFiniteVector`](crate::RagError::NonFiniteVector)
    /// without writing anything if any unit has the wrong dimension or a NaN
    /// or infinite component.
    async fn upsert(&self, units: &[IndexedUnit]) -> Result<()>;

    /// Insert or replace a single unit.
    async fn upsert_one(&self, unit: IndexedUnit) -> Result<()> {
        self.upsert(std::slice::from_ref(&unit)).await
    }

    /// Return up to `top_k` units most similar to `query`, best first.
    ///
    /// An empty index yields an empty list. The query is validated like an
    /// upserted vector.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>>;

    /// Remove every unit of `source_id`, returning how many were removed.
    async fn delete_by_source(&self, source_id: &str) -> Result<usize>;

    /// Return every unit of `source_id`, in chunk order.
    async fn get_by_source(&self, source_id: &str) -> Result<Vec<IndexedUnit>>;

    /// Number of units stored.
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no units.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// The vector dimension this store enforces.
    fn dimensions(&self) -> usize;
}

/// Open the backend selected by `config` for vectors of `dimensions` length.
///
/// # Errors
///
/// - [`RagError::PersistenceError`](crate::RagError::PersistenceError) when a
///   snapshot cannot be loaded
/// - [`RagError::UpstreamUnavailable`](crate::RagError::UpstreamUnavailable)
///   when the remote backend is unreachable
/// - [`RagError::ConfigError`](crate::RagError::ConfigError) when the
///   selected backend was not compiled in
pub async fn open_vector_store(
    config: &VectorStoreConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>> {
    match config {
        VectorStoreConfig::BruteForce => Ok(Arc::new(InMemoryVectorStore::new(dimensions))),
        VectorStoreConfig::Persistent { snapshot_path } => {
            Ok(Arc::new(InMemoryVectorStore::open(snapshot_path, dimensions).await?))
        }
        #[cfg(feature = "qdrant")]
        VectorStoreConfig::Qdrant { url, collection } => Ok(Arc::new(
            crate::qdrant::QdrantVectorStore::connect(url, collection, dimensions).await?,
        )),
        #[cfg(not(feature = "qdrant"))]
        VectorStoreConfig::Qdrant { .. } => Err(crate::error::RagError::ConfigError(
            "the qdrant backend requires the `qdrant` feature".to_string(),
        )),
    }
}
