//! Shared embedding providers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use archivist_rag::document::IndexedUnit;
use archivist_rag::embedding::EmbeddingProvider;
use archivist_rag::error::{RagError, Result};

/// One dimension per topic word, set when the text mentions it, plus a small
/// constant so no vector is zero.
pub struct TopicEmbedder {
    topics: Vec<String>,
    pub batch_calls: Arc<AtomicUsize>,
}

impl TopicEmbedder {
    pub fn new(topics: &[&str]) -> Self {
        Self {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            batch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut v: Vec<f32> =
            self.topics.iter().map(|t| if text.contains(t.as_str()) { 1.0 } else { 0.0 }).collect();
        v.push(0.1);
        v
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.topics.len() + 1
    }
}

/// Deterministic hash-based embeddings, L2-normalised.
pub struct HashEmbedder {
    pub dimensions: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            *v = ((hash.wrapping_add(i as u64)) as f32).sin();
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Always fails, as an unreachable endpoint would.
pub struct FailingEmbedder {
    pub dimensions: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::UpstreamUnavailable {
            service: "test".to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Claims one dimension but returns vectors of another.
pub struct WrongDimensionEmbedder {
    pub claimed: usize,
    pub actual: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for WrongDimensionEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0; self.actual])
    }

    fn dimensions(&self) -> usize {
        self.claimed
    }
}

/// A unit with the given embedding, for store-level tests.
pub fn unit(source_id: &str, chunk_index: usize, text: &str, embedding: Vec<f32>) -> IndexedUnit {
    IndexedUnit {
        id: IndexedUnit::id_for(source_id, chunk_index),
        embedding,
        source_id: source_id.to_string(),
        section: None,
        chunk_index,
        text: text.to_string(),
        metadata: Default::default(),
    }
}

/// A sentence of `len` characters (including the final period) made of one letter.
pub fn sentence(letter: char, len: usize) -> String {
    let body: String = std::iter::repeat_n(letter, len - 1).collect();
    format!("{body}.")
}
