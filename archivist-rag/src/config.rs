//! Configuration for segmentation, indexing, retrieval and hybrid search.
//!
//! Every section has serde support and sensible defaults. [`RagConfig::builder`]
//! validates the whole tree before handing it out; loading from files or the
//! environment is left to the caller.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Segmenter parameters. Sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target upper bound for a chunk.
    pub chunk_size: usize,
    /// Upper bound for the sentence suffix carried into the next chunk.
    pub chunk_overlap: usize,
    /// Chunks shorter than this are grown or merged backward.
    pub min_chunk_size: usize,
    /// Segment heading-delimited regions independently.
    pub respect_sections: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 2000, chunk_overlap: 200, min_chunk_size: 100, respect_sections: true }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.min_chunk_size > self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "min_chunk_size ({}) must not exceed chunk_size ({})",
                self.min_chunk_size, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// How the retriever decides two hits carry the same content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Same source and identical first `chars` characters.
    Prefix {
        /// Prefix length in characters.
        chars: usize,
    },
    /// Same source and identical full text (sha-256).
    ContentHash,
}

impl Default for DedupStrategy {
    fn default() -> Self {
        Self::Prefix { chars: 50 }
    }
}

/// Retriever parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of hits requested from the vector index.
    pub top_k: usize,
    /// Hits scoring below this are discarded.
    pub min_score: f32,
    /// Character cap for the assembled context string.
    pub max_context_length: usize,
    /// Duplicate detection key.
    pub dedup: DedupStrategy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
            max_context_length: 8000,
            dedup: DedupStrategy::default(),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !self.min_score.is_finite() {
            return Err(RagError::ConfigError("min_score must be finite".to_string()));
        }
        if self.max_context_length == 0 {
            return Err(RagError::ConfigError(
                "max_context_length must be greater than zero".to_string(),
            ));
        }
        if let DedupStrategy::Prefix { chars: 0 } = self.dedup {
            return Err(RagError::ConfigError(
                "dedup prefix length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Relative weights of the three hybrid signals.
///
/// Weights are not normalized; callers choosing weights that do not sum to 1
/// get scores on a different scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HybridWeights {
    /// Weight of the semantic similarity signal.
    pub vector: f32,
    /// Weight of the citation/similarity graph signal.
    pub graph: f32,
    /// Weight of the lexical overlap signal.
    pub keyword: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { vector: 0.6, graph: 0.3, keyword: 0.1 }
    }
}

impl HybridWeights {
    /// Create weights for the vector, graph and keyword signals.
    pub fn new(vector: f32, graph: f32, keyword: f32) -> Self {
        Self { vector, graph, keyword }
    }

    /// Reject negative or non-finite weights.
    pub fn validate(&self) -> Result<()> {
        let weights = [("vector", self.vector), ("graph", self.graph), ("keyword", self.keyword)];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "{name} weight must be finite and non-negative, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Hybrid search parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HybridConfig {
    /// Vector candidates fetched per requested result.
    pub over_fetch_factor: usize,
    /// Score floor for vector candidates.
    pub min_vector_score: f32,
    /// Maximum number of graph seeds.
    pub max_seeds: usize,
    /// Weights used when a query does not carry its own.
    pub weights: HybridWeights,
    /// Results returned when a query does not set its own limit.
    pub top_k: usize,
    /// Graph hops when a query does not set its own depth.
    pub traversal_depth: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            over_fetch_factor: 3,
            min_vector_score: 0.5,
            max_seeds: 5,
            weights: HybridWeights::default(),
            top_k: 10,
            traversal_depth: 2,
        }
    }
}

impl HybridConfig {
    fn validate(&self) -> Result<()> {
        if self.over_fetch_factor == 0 {
            return Err(RagError::ConfigError(
                "over_fetch_factor must be greater than zero".to_string(),
            ));
        }
        if !self.min_vector_score.is_finite() {
            return Err(RagError::ConfigError("min_vector_score must be finite".to_string()));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("hybrid top_k must be greater than zero".to_string()));
        }
        self.weights.validate()
    }
}

/// Embedding fan-out parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimension every unit in the index must have.
    pub dimensions: usize,
    /// Texts per embedding request.
    pub batch_size: usize,
    /// Embedding requests in flight at once.
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 768, batch_size: 32, concurrency: 4 }
    }
}

impl EmbeddingConfig {
    fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(RagError::ConfigError("dimensions must be greater than zero".to_string()));
        }
        if self.batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".to_string()));
        }
        if self.concurrency == 0 {
            return Err(RagError::ConfigError("concurrency must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Vector index backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum VectorStoreConfig {
    /// In-process linear scan held in memory only.
    #[default]
    BruteForce,
    /// In-process linear scan persisted to `snapshot_path` after every write.
    Persistent {
        /// Snapshot file location.
        snapshot_path: PathBuf,
    },
    /// Remote Qdrant collection (requires the `qdrant` feature).
    Qdrant {
        /// gRPC endpoint, e.g. `http://localhost:6334`.
        url: String,
        /// Collection name.
        collection: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RagConfig {
    /// Segmenter parameters.
    pub chunking: ChunkingConfig,
    /// Retriever parameters.
    pub retrieval: RetrievalConfig,
    /// Hybrid search parameters.
    pub hybrid: HybridConfig,
    /// Embedding fan-out parameters.
    pub embedding: EmbeddingConfig,
    /// Vector index backend.
    pub vector_store: VectorStoreConfig,
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check every section for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.hybrid.validate()?;
        self.embedding.validate()?;
        if let VectorStoreConfig::Qdrant { url, collection } = &self.vector_store {
            if url.trim().is_empty() || collection.trim().is_empty() {
                return Err(RagError::ConfigError(
                    "qdrant backend requires a url and a collection".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the target chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunking.chunk_overlap = overlap;
        self
    }

    /// Set the minimum chunk length in characters.
    pub fn min_chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.min_chunk_size = size;
        self
    }

    /// Enable or disable section-aware segmentation.
    pub fn respect_sections(mut self, enabled: bool) -> Self {
        self.config.chunking.respect_sections = enabled;
        self
    }

    /// Set the number of hits requested from the vector index.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.retrieval.top_k = k;
        self
    }

    /// Set the retrieval score floor.
    pub fn min_score(mut self, score: f32) -> Self {
        self.config.retrieval.min_score = score;
        self
    }

    /// Set the context budget in characters.
    pub fn max_context_length(mut self, length: usize) -> Self {
        self.config.retrieval.max_context_length = length;
        self
    }

    /// Set the duplicate detection strategy.
    pub fn dedup(mut self, strategy: DedupStrategy) -> Self {
        self.config.retrieval.dedup = strategy;
        self
    }

    /// Replace the hybrid search section.
    pub fn hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.config.hybrid = hybrid;
        self
    }

    /// Set the default hybrid weights.
    pub fn hybrid_weights(mut self, weights: HybridWeights) -> Self {
        self.config.hybrid.weights = weights;
        self
    }

    /// Set the embedding dimension.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding.dimensions = dimensions;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embedding.batch_size = size;
        self
    }

    /// Set the number of embedding requests in flight.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding.concurrency = concurrency;
        self
    }

    /// Select the vector index backend.
    pub fn vector_store(mut self, store: VectorStoreConfig) -> Self {
        self.config.vector_store = store;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if, among others:
    /// - `chunk_overlap >= chunk_size`
    /// - `min_chunk_size > chunk_size`
    /// - `top_k == 0`
    /// - a hybrid weight is negative or not finite
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
