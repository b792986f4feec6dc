//! Data types for chunks, indexed units, hits and retrieval output.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contiguous, sentence-aligned span of a source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The chunk text, a byte-identical slice of the normalized input.
    pub text: String,
    /// Position of the chunk within its document, starting at 0.
    pub index: usize,
    /// The document this chunk was cut from.
    pub source_id: String,
    /// Heading title of the enclosing section, when segmented by section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Byte offset of the first character in the normalized text.
    pub start_offset: usize,
    /// Byte offset one past the last character in the normalized text.
    pub end_offset: usize,
    /// Free-form key/value annotations.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Number of characters in the chunk text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk together with its embedding, as stored by a vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedUnit {
    /// Deterministic identifier derived from `(source_id, chunk_index)`.
    pub id: String,
    /// The embedding vector. Empty when a backend returns payload only.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// The document this unit belongs to.
    pub source_id: String,
    /// Heading title of the enclosing section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// The chunk text.
    pub text: String,
    /// Free-form key/value annotations.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl IndexedUnit {
    /// Deterministic unit id for a chunk of a document.
    ///
    /// The same `(source_id, chunk_index)` always maps to the same id, so
    /// re-indexing a document overwrites its previous units.
    pub fn id_for(source_id: &str, chunk_index: usize) -> String {
        let digest = Sha256::digest(source_id.as_bytes());
        let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
        format!("{hex}_chunk_{chunk_index}")
    }

    /// Build a unit from a chunk and its embedding.
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: Self::id_for(&chunk.source_id, chunk.index),
            embedding,
            source_id: chunk.source_id,
            section: chunk.section,
            chunk_index: chunk.index,
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }

    /// Resolve a filter key against this unit.
    ///
    /// `source` and `source_id` name the source, `section` names the section
    /// title, and any other key is looked up in the metadata map.
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "source" | "source_id" => Some(self.source_id.as_str()),
            "section" => self.section.as_deref(),
            other => self.metadata.get(other).map(String::as_str),
        }
    }
}

/// A scored match returned by a vector index search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// The matched unit.
    pub unit: IndexedUnit,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
    /// `1 - score`.
    pub distance: f32,
}

impl SearchHit {
    /// Create a hit, deriving the distance from the score.
    pub fn new(unit: IndexedUnit, score: f32) -> Self {
        Self { unit, score, distance: 1.0 - score }
    }
}

/// Exact-match conditions on unit fields, all of which must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    /// An empty filter that matches every unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter restricting results to one source.
    pub fn source(source_id: impl Into<String>) -> Self {
        Self::new().with("source", source_id)
    }

    /// Add an exact-match condition.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Iterate over `(key, value)` conditions in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every condition holds for `unit`.
    pub fn matches(&self, unit: &IndexedUnit) -> bool {
        self.conditions.iter().all(|(key, value)| unit.field(key) == Some(value.as_str()))
    }
}

/// The assembled output of a retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    /// Hits included in `combined_text`, in descending score order.
    pub hits: Vec<SearchHit>,
    /// Distinct sources of `hits`, in first-appearance order.
    pub sources: Vec<String>,
    /// Distinct sections of `hits`, in first-appearance order.
    pub sections: Vec<String>,
    /// Hit texts with provenance headers, within the context budget.
    pub combined_text: String,
    /// Ranked hits left out because they would have exceeded the budget.
    pub omitted: usize,
}

/// One ranked document from a hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HybridResult {
    /// The ranked document.
    pub source_id: String,
    /// Text of the best vector hit for this document, empty for graph-only results.
    pub content_sample: String,
    /// Best semantic similarity among this document's chunks.
    pub vector_score: f32,
    /// Best graph proximity to a seed document.
    pub graph_score: f32,
    /// Best fraction of query tokens found in one of this document's chunks.
    pub keyword_score: f32,
    /// Weighted sum of the three signals.
    pub hybrid_score: f32,
    /// 1-based position in the final list.
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source: &str, section: Option<&str>) -> IndexedUnit {
        IndexedUnit {
            id: IndexedUnit::id_for(source, 0),
            embedding: vec![1.0, 0.0],
            source_id: source.to_string(),
            section: section.map(str::to_string),
            chunk_index: 0,
            text: "text".to_string(),
            metadata: HashMap::from([("year".to_string(), "2017".to_string())]),
        }
    }

    #[test]
    fn ids_are_deterministic_per_source_and_index() {
        assert_eq!(IndexedUnit::id_for("paper_A", 3), IndexedUnit::id_for("paper_A", 3));
        assert_ne!(IndexedUnit::id_for("paper_A", 3), IndexedUnit::id_for("paper_A", 4));
        assert_ne!(IndexedUnit::id_for("paper_A", 3), IndexedUnit::id_for("paper_B", 3));
        assert!(IndexedUnit::id_for("paper_A", 3).ends_with("_chunk_3"));
    }

    #[test]
    fn filter_resolves_source_section_and_metadata() {
        let u = unit("paper_A", Some("Results"));
        assert!(MetadataFilter::source("paper_A").matches(&u));
        assert!(!MetadataFilter::source("paper_B").matches(&u));
        assert!(MetadataFilter::new().with("section", "Results").with("year", "2017").matches(&u));
        assert!(!MetadataFilter::new().with("section", "Intro").matches(&u));
        assert!(!MetadataFilter::new().with("missing", "x").matches(&u));
        assert!(MetadataFilter::new().matches(&u));
    }

    #[test]
    fn distance_is_one_minus_score() {
        let hit = SearchHit::new(unit("a", None), 0.75);
        assert!((hit.distance - 0.25).abs() < 1e-6);
    }
}
