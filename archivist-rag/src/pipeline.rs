//! RAG pipeline facade.
//!
//! The [`RagPipeline`] wires one [`RagConfig`], an [`EmbeddingProvider`], a
//! [`VectorStore`] and an optional [`KnowledgeGraph`] into an [`Indexer`], a
//! [`Retriever`] and a [`HybridSearchEngine`] that share the same index.
//!
//! # Example
//!
//! ```rust,ignore
//! use archivist_rag::{RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::open(RagConfig::default(), Arc::new(my_embedder)).await?;
//!
//! pipeline.index_document("attention", &paper_text).await?;
//! let context = pipeline.retrieve("how does self-attention scale?").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunking::{Chunker, Segmenter};
use crate::config::RagConfig;
use crate::document::{HybridResult, MetadataFilter, RetrievedContext};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::graph::KnowledgeGraph;
use crate::hybrid::{HybridQuery, HybridSearchEngine};
use crate::indexer::Indexer;
use crate::reranker::Reranker;
use crate::retriever::Retriever;
use crate::vectorstore::{VectorStore, open_vector_store};

/// The assembled indexing and query stack.
///
/// Construct one via [`RagPipeline::builder()`] or [`RagPipeline::open`].
pub struct RagPipeline {
    config: RagConfig,
    indexer: Indexer,
    retriever: Retriever,
    hybrid: HybridSearchEngine,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Open the vector store selected by `config` and build a pipeline over it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an invalid configuration and
    /// any error raised while opening the store.
    pub async fn open(
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let vector_store =
            open_vector_store(&config.vector_store, config.embedding.dimensions).await?;
        Self::builder()
            .config(config)
            .embedding_provider(embedding_provider)
            .vector_store(vector_store)
            .build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the indexer.
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Return the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Return the hybrid search engine.
    pub fn hybrid(&self) -> &HybridSearchEngine {
        &self.hybrid
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        self.indexer.vector_store()
    }

    /// Index a document. See [`Indexer::index_document`].
    pub async fn index_document(&self, source_id: &str, text: &str) -> Result<usize> {
        self.indexer.index_document(source_id, text).await
    }

    /// Index a document with extra metadata. See [`Indexer::index_document_with_metadata`].
    pub async fn index_document_with_metadata(
        &self,
        source_id: &str,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize> {
        self.indexer.index_document_with_metadata(source_id, text, metadata).await
    }

    /// Replace a document's indexed content. See [`Indexer::reindex`].
    pub async fn reindex(&self, source_id: &str, text: &str) -> Result<usize> {
        self.indexer.reindex(source_id, text).await
    }

    /// Retrieve context from the whole index. See [`Retriever::retrieve`].
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        self.retriever.retrieve(query, None).await
    }

    /// Retrieve context under a metadata filter.
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        filter: &MetadataFilter,
    ) -> Result<RetrievedContext> {
        self.retriever.retrieve(query, Some(filter)).await
    }

    /// Hybrid search with the configured default weights, limit and depth.
    pub async fn hybrid_search(&self, query: &str) -> Result<Vec<HybridResult>> {
        self.hybrid.search(&self.hybrid.query(query)).await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider` and `vector_store` are required. The config
/// defaults to [`RagConfig::default`] and the chunker to a [`Segmenter`]
/// built from it.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(InMemoryVectorStore::new(768)))
///     .knowledge_graph(Arc::new(graph))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    graph: Option<Arc<dyn KnowledgeGraph>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Replace the default segmenter.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set an optional reranker for retrieval.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set an optional knowledge graph for hybrid search.
    pub fn knowledge_graph(mut self, graph: Arc<dyn KnowledgeGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing, the
    /// configuration is invalid, or the provider and store disagree on the
    /// vector dimension.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;

        if embedding_provider.dimensions() != vector_store.dimensions() {
            return Err(RagError::ConfigError(format!(
                "embedding provider produces {} dimensions but the vector store expects {}",
                embedding_provider.dimensions(),
                vector_store.dimensions()
            )));
        }

        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(Segmenter::from_config(&config.chunking)));

        let indexer = Indexer::new(chunker, embedding_provider.clone(), vector_store.clone())
            .with_batching(config.embedding.batch_size, config.embedding.concurrency);

        let mut retriever = Retriever::new(
            embedding_provider.clone(),
            vector_store.clone(),
            config.retrieval.clone(),
        );
        if let Some(reranker) = self.reranker {
            retriever = retriever.with_reranker(reranker);
        }

        let mut hybrid =
            HybridSearchEngine::new(embedding_provider, vector_store, config.hybrid.clone());
        if let Some(graph) = self.graph {
            hybrid = hybrid.with_graph(graph);
        }

        Ok(RagPipeline { config, indexer, retriever, hybrid })
    }
}
