//! Retrieval core for long-form technical documents.
//!
//! This crate provides:
//! - Sentence-aware, section-aware segmentation with controlled overlap
//! - A vector index contract with a linear-scan backend (optionally
//!   persisted to a flat-file snapshot) and a Qdrant backend
//! - Batched indexing with deterministic unit ids
//! - Retrieval with score floors, deduplication and a context budget
//! - Hybrid search fusing vector, citation-graph and keyword signals
//!
//! External collaborators (embedding endpoints, the knowledge graph store,
//! document analysis) are consumed through the [`EmbeddingProvider`],
//! [`KnowledgeGraph`] and [`DocumentAnalyzer`] traits.
//!
//! # Features
//!
//! - `openai`: [`openai::OpenAIEmbeddingProvider`]
//! - `gemini`: [`gemini::GeminiEmbeddingProvider`]
//! - `qdrant`: [`qdrant::QdrantVectorStore`]

pub mod analyzer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod hybrid;
pub mod indexer;
pub mod inmemory;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use analyzer::{DocumentAnalyzer, StaticAnalyzer};
pub use chunking::{Chunker, Segmenter, normalize, segment};
pub use config::{
    ChunkingConfig, DedupStrategy, EmbeddingConfig, HybridConfig, HybridWeights, RagConfig,
    RagConfigBuilder, RetrievalConfig, VectorStoreConfig,
};
pub use document::{
    Chunk, HybridResult, IndexedUnit, MetadataFilter, RetrievedContext, SearchHit,
};
pub use embedding::{EmbeddingProvider, check_embeddings, check_finite, embed_in_batches};
pub use error::{RagError, Result};
pub use graph::{GraphScores, InMemoryKnowledgeGraph, KnowledgeGraph};
pub use hybrid::{HybridQuery, HybridSearchEngine};
pub use indexer::Indexer;
pub use inmemory::{InMemoryVectorStore, IndexStats, cosine_similarity};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use reranker::{NoOpReranker, Reranker};
pub use retriever::Retriever;
pub use vectorstore::{VectorStore, open_vector_store};
