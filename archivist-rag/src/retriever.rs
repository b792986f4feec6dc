//! Vector retrieval and context assembly.
//!
//! The [`Retriever`] turns a query into a [`RetrievedContext`]: embed the
//! query, search the index, drop weak hits, optionally rerank, remove
//! near-duplicates and pack the survivors into a context string that never
//! exceeds the configured character budget.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::{DedupStrategy, RetrievalConfig};
use crate::document::{MetadataFilter, RetrievedContext, SearchHit};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::reranker::Reranker;
use crate::vectorstore::VectorStore;

/// Answers queries from a vector index.
///
/// # Example
///
/// ```rust,ignore
/// let retriever = Retriever::new(provider, store, RetrievalConfig::default());
/// let context = retriever.retrieve_from_source("transformer architecture", "paper_A").await?;
/// println!("{}", context.combined_text);
/// ```
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever over `vector_store`.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self { embedding_provider, vector_store, reranker: None, config }
    }

    /// Rerank hits after the score floor.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Return a reference to the retrieval configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve context for `query`, optionally restricted by `filter`.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] for a blank query
    /// - [`RagError::NoResults`] when no hit reaches `min_score`
    /// - [`RagError::UpstreamUnavailable`] when embedding fails
    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievedContext> {
        let embedding = self.embed_query(query).await?;
        let hits = self.ranked_hits(query, &embedding, filter).await?;
        let context = self.assemble(hits);
        info!(
            hits = context.hits.len(),
            sources = context.sources.len(),
            omitted = context.omitted,
            "retrieved context"
        );
        Ok(context)
    }

    /// Retrieve context from a single source.
    pub async fn retrieve_from_source(
        &self,
        query: &str,
        source_id: &str,
    ) -> Result<RetrievedContext> {
        self.retrieve(query, Some(&MetadataFilter::source(source_id))).await
    }

    /// Retrieve context from several sources.
    ///
    /// Each source is searched on its own so that one dominant source cannot
    /// crowd out the others; the merged hits are then ranked together and cut
    /// to `top_k`. Sources without qualifying hits are skipped. An empty
    /// source list behaves like an unfiltered [`Retriever::retrieve`].
    pub async fn retrieve_multi_source<S: AsRef<str>>(
        &self,
        query: &str,
        sources: &[S],
    ) -> Result<RetrievedContext> {
        if sources.is_empty() {
            return self.retrieve(query, None).await;
        }

        let embedding = self.embed_query(query).await?;
        let mut merged = Vec::new();
        for source in sources {
            let source = source.as_ref();
            let filter = MetadataFilter::source(source);
            match self.ranked_hits(query, &embedding, Some(&filter)).await {
                Ok(hits) => merged.extend(hits),
                Err(RagError::NoResults(_)) => {
                    debug!(source_id = source, "no qualifying hits, skipping source");
                }
                Err(e) => return Err(e),
            }
        }

        sort_by_score(&mut merged);
        let mut hits = self.dedup(merged);
        hits.truncate(self.config.top_k);
        if hits.is_empty() {
            return Err(RagError::NoResults(format!(
                "no chunks retrieved from {} sources",
                sources.len()
            )));
        }

        let context = self.assemble(hits);
        info!(
            requested_sources = sources.len(),
            hits = context.hits.len(),
            sources = context.sources.len(),
            "retrieved multi-source context"
        );
        Ok(context)
    }

    /// Like [`Retriever::retrieve`], with a `citation` metadata entry on every hit.
    pub async fn retrieve_with_citations(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievedContext> {
        let mut context = self.retrieve(query, filter).await?;
        for hit in &mut context.hits {
            let citation = citation(hit);
            hit.unit.metadata.insert("citation".to_string(), citation);
        }
        Ok(context)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyInput("query must not be empty".to_string()));
        }
        self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during retrieval");
            e
        })
    }

    /// Search, apply the score floor, rerank, sort and deduplicate.
    async fn ranked_hits(
        &self,
        query: &str,
        embedding: &[f32],
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let hits = self.vector_store.search(embedding, self.config.top_k, filter).await?;
        let found = hits.len();

        let mut hits: Vec<SearchHit> =
            hits.into_iter().filter(|h| h.score >= self.config.min_score).collect();
        if hits.is_empty() {
            return Err(RagError::NoResults(format!(
                "none of {found} hits reached min_score {}",
                self.config.min_score
            )));
        }

        if let Some(reranker) = &self.reranker {
            hits = reranker.rerank(query, hits).await.map_err(|e| {
                error!(error = %e, "reranking failed");
                e
            })?;
        }

        sort_by_score(&mut hits);
        let hits = self.dedup(hits);
        debug!(found, kept = hits.len(), "ranked hits");
        Ok(hits)
    }

    /// Keep the first (best) hit for every dedup key.
    fn dedup(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        hits.into_iter()
            .filter(|hit| {
                let content: String = match self.config.dedup {
                    DedupStrategy::Prefix { chars } => hit.unit.text.chars().take(chars).collect(),
                    DedupStrategy::ContentHash => {
                        let digest = Sha256::digest(hit.unit.text.as_bytes());
                        digest.iter().map(|b| format!("{b:02x}")).collect::<String>()
                    }
                };
                seen.insert((hit.unit.source_id.clone(), content))
            })
            .collect()
    }

    /// Pack hits into the context string until the budget is reached.
    fn assemble(&self, ranked: Vec<SearchHit>) -> RetrievedContext {
        let budget = self.config.max_context_length;
        let total = ranked.len();
        let mut context = RetrievedContext::default();
        let mut used = 0;

        for (i, hit) in ranked.into_iter().enumerate() {
            let entry = context_entry(&hit, i + 1);
            let entry_len = entry.chars().count();
            if used + entry_len > budget {
                context.omitted = total - i;
                warn!(budget, included = i, omitted = context.omitted, "context budget reached");
                break;
            }
            used += entry_len;
            context.combined_text.push_str(&entry);

            if !context.sources.contains(&hit.unit.source_id) {
                context.sources.push(hit.unit.source_id.clone());
            }
            if let Some(section) = &hit.unit.section {
                if !context.sections.contains(section) {
                    context.sections.push(section.clone());
                }
            }
            context.hits.push(hit);
        }
        context
    }
}

/// Stable descending sort; equal scores keep their relative order.
fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

fn context_entry(hit: &SearchHit, ordinal: usize) -> String {
    let unit = &hit.unit;
    let mut header = format!("\n[Source: {}", unit.source_id);
    if let Some(section) = &unit.section {
        header.push_str(&format!(", Section: {section}"));
    }
    header.push_str(&format!(", Chunk {ordinal}]\n"));
    format!("{header}{}\n", unit.text)
}

fn citation(hit: &SearchHit) -> String {
    let unit = &hit.unit;
    match &unit.section {
        Some(section) => {
            format!("Source: {}, Section: {section}, Chunk {}", unit.source_id, unit.chunk_index)
        }
        None => format!("Source: {}, Chunk {}", unit.source_id, unit.chunk_index),
    }
}
