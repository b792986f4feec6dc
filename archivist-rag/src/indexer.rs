//! Document indexing: segment → embed → upsert.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::analyzer::DocumentAnalyzer;
use crate::chunking::Chunker;
use crate::config::EmbeddingConfig;
use crate::document::IndexedUnit;
use crate::embedding::{EmbeddingProvider, embed_in_batches};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Writes documents into a vector index.
///
/// A document is indexed in one step: every chunk is embedded before
/// anything is written, and all units land in a single upsert. If
/// segmentation or any embedding batch fails, the index is left untouched.
///
/// Unit ids are derived from `(source_id, chunk_index)`, so indexing the
/// same document twice overwrites rather than duplicates.
pub struct Indexer {
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    batch_size: usize,
    concurrency: usize,
}

impl Indexer {
    /// Create an indexer with the default batching parameters.
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        let defaults = EmbeddingConfig::default();
        Self {
            chunker,
            embedding_provider,
            vector_store,
            batch_size: defaults.batch_size,
            concurrency: defaults.concurrency,
        }
    }

    /// Set how many texts go into one embedding request and how many
    /// requests may be in flight.
    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Index a document, returning the number of chunks written.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] for a blank id or text
    /// - [`RagError::NoSegmentableContent`] when the text has no sentences
    /// - [`RagError::UpstreamUnavailable`] or [`RagError::DimensionMismatch`]
    ///   when embedding fails or returns malformed vectors
    pub async fn index_document(&self, source_id: &str, text: &str) -> Result<usize> {
        self.index_document_with_metadata(source_id, text, HashMap::new()).await
    }

    /// Index a document, attaching `metadata` (title, path, ...) to every unit.
    ///
    /// The reserved keys `source`, `section` and `chunk_index` are always
    /// set from the chunk itself.
    pub async fn index_document_with_metadata(
        &self,
        source_id: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize> {
        if source_id.trim().is_empty() {
            return Err(RagError::EmptyInput("source id must not be empty".to_string()));
        }

        let chunks = self.chunker.chunk(text, source_id)?;
        if chunks.is_empty() {
            return Err(RagError::NoSegmentableContent { source_id: source_id.to_string() });
        }
        debug!(source_id, chunk_count = chunks.len(), "segmented document");

        let embeddings = {
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            embed_in_batches(
                self.embedding_provider.as_ref(),
                &texts,
                self.batch_size,
                self.concurrency,
                self.vector_store.dimensions(),
            )
            .await
            .map_err(|e| {
                error!(source_id, error = %e, "embedding failed during indexing");
                e
            })?
        };

        let units: Vec<IndexedUnit> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(mut chunk, embedding)| {
                for (key, value) in &metadata {
                    chunk.metadata.entry(key.clone()).or_insert_with(|| value.clone());
                }
                chunk.metadata.insert("source".to_string(), chunk.source_id.clone());
                chunk.metadata.insert("chunk_index".to_string(), chunk.index.to_string());
                if let Some(section) = &chunk.section {
                    chunk.metadata.insert("section".to_string(), section.clone());
                }
                IndexedUnit::from_chunk(chunk, embedding)
            })
            .collect();

        self.vector_store.upsert(&units).await.map_err(|e| {
            error!(source_id, error = %e, "upsert failed during indexing");
            e
        })?;

        let chunk_count = units.len();
        info!(source_id, chunk_count, "indexed document");
        Ok(chunk_count)
    }

    /// Replace the indexed content of a document.
    ///
    /// Previous units are deleted first. A failed delete is logged and
    /// indexing continues.
    pub async fn reindex(&self, source_id: &str, text: &str) -> Result<usize> {
        self.reindex_with_metadata(source_id, text, HashMap::new()).await
    }

    /// [`Indexer::reindex`] with metadata attached to every unit.
    pub async fn reindex_with_metadata(
        &self,
        source_id: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize> {
        match self.vector_store.delete_by_source(source_id).await {
            Ok(0) => debug!(source_id, "no previous units to delete"),
            Ok(removed) => info!(source_id, removed, "deleted previous units"),
            Err(e) => {
                warn!(source_id, error = %e, "failed to delete previous units, reindexing anyway")
            }
        }
        self.index_document_with_metadata(source_id, text, metadata).await
    }

    /// Whether a document has units in the index, and how many.
    pub async fn is_indexed(&self, source_id: &str) -> Result<(bool, usize)> {
        let count = self.vector_store.get_by_source(source_id).await?.len();
        Ok((count > 0, count))
    }

    /// Remove a document from the index, returning how many units were removed.
    pub async fn delete_document(&self, source_id: &str) -> Result<usize> {
        let removed = self.vector_store.delete_by_source(source_id).await?;
        info!(source_id, removed, "deleted document");
        Ok(removed)
    }

    /// Fetch a document's text through `analyzer` and index it under `document_id`.
    pub async fn index_from_analyzer(
        &self,
        analyzer: &dyn DocumentAnalyzer,
        document_id: &str,
    ) -> Result<usize> {
        let text = analyzer.raw_text(document_id).await.map_err(|e| {
            error!(document_id, error = %e, "document analysis failed");
            e
        })?;
        self.index_document(document_id, &text).await
    }
}
