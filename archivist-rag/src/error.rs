//! Error types for the `archivist-rag` crate.

use thiserror::Error;

/// Errors that can occur in segmentation, indexing and retrieval.
#[derive(Debug, Error)]
pub enum RagError {
    /// The input text or query was empty or whitespace only.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A vector's length disagrees with the index dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension the index was created with.
        expected: usize,
        /// The dimension that was supplied.
        actual: usize,
    },

    /// A vector component is NaN or infinite.
    #[error("Invalid vector: component {index} is {value}")]
    NonFiniteVector {
        /// Position of the first offending component.
        index: usize,
        /// The offending value.
        value: f32,
    },

    /// Nothing survived the score floor.
    #[error("No results: {0}")]
    NoResults(String),

    /// The normalized text contains no sentence boundary.
    #[error("No segmentable content in '{source_id}'")]
    NoSegmentableContent {
        /// The document that could not be segmented.
        source_id: String,
    },

    /// An external collaborator (embedding endpoint, remote index, graph store) failed.
    #[error("Upstream unavailable ({service}): {message}")]
    UpstreamUnavailable {
        /// The collaborator that produced the error.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Reading or writing the index snapshot failed.
    #[error("Persistence error ({path}): {message}")]
    PersistenceError {
        /// The snapshot path involved.
        path: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    pub(crate) fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable { service: service.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
