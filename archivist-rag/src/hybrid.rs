//! Hybrid search: semantic, graph and lexical signals fused into one ranking.
//!
//! For a query the engine
//!
//! 1. fetches `top_k * over_fetch_factor` vector candidates above a score
//!    floor and keeps the best hit per source,
//! 2. picks up to `max_seeds` seed sources whose titles or text share tokens
//!    with the query and walks the knowledge graph from them,
//! 3. scores each candidate by the fraction of query tokens found in its
//!    best-matching chunk,
//!
//! and ranks the union by `vector * Wv + graph * Wg + keyword * Wk`.
//! A failing graph only removes the graph signal; a failing vector search
//! fails the query.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{HybridConfig, HybridWeights};
use crate::document::{HybridResult, MetadataFilter, SearchHit};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::graph::{GraphScores, KnowledgeGraph};
use crate::vectorstore::VectorStore;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were",
];

/// Seed score added when a query token appears in a source's title.
const TITLE_MATCH: usize = 2;
/// Seed score added when a query token appears only in a source's text.
const CONTENT_MATCH: usize = 1;

/// A hybrid search request.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    /// Natural-language query.
    pub query: String,
    /// Signal weights.
    pub weights: HybridWeights,
    /// Maximum number of results.
    pub top_k: usize,
    /// Graph hops from each seed.
    pub traversal_depth: usize,
    /// Exact-match restriction applied to the vector signal.
    pub filter: Option<MetadataFilter>,
    /// Precomputed query embedding; the query text is embedded when absent.
    pub query_vector: Option<Vec<f32>>,
}

impl HybridQuery {
    /// A query with default weights, limit and depth.
    pub fn new(query: impl Into<String>) -> Self {
        let defaults = HybridConfig::default();
        Self {
            query: query.into(),
            weights: defaults.weights,
            top_k: defaults.top_k,
            traversal_depth: defaults.traversal_depth,
            filter: None,
            query_vector: None,
        }
    }

    /// Set the signal weights.
    pub fn weights(mut self, weights: HybridWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the result limit.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the graph traversal depth.
    pub fn traversal_depth(mut self, depth: usize) -> Self {
        self.traversal_depth = depth;
        self
    }

    /// Restrict vector candidates with `filter`.
    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Use a precomputed query embedding.
    pub fn query_vector(mut self, vector: Vec<f32>) -> Self {
        self.query_vector = Some(vector);
        self
    }
}

/// Best vector evidence for one source.
#[derive(Debug)]
struct Candidate {
    source_id: String,
    title: String,
    score: f32,
    sample: String,
    texts: Vec<String>,
}

/// Fuses vector, graph and keyword evidence into one ranking.
pub struct HybridSearchEngine {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    graph: Option<Arc<dyn KnowledgeGraph>>,
    config: HybridConfig,
}

impl HybridSearchEngine {
    /// Create an engine without a knowledge graph; the graph signal is then always 0.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        config: HybridConfig,
    ) -> Self {
        Self { embedding_provider, vector_store, graph: None, config }
    }

    /// Attach a knowledge graph for the graph signal.
    pub fn with_graph(mut self, graph: Arc<dyn KnowledgeGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Return a reference to the hybrid configuration.
    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// A query carrying this engine's configured defaults.
    pub fn query(&self, text: impl Into<String>) -> HybridQuery {
        HybridQuery {
            weights: self.config.weights,
            top_k: self.config.top_k,
            traversal_depth: self.config.traversal_depth,
            ..HybridQuery::new(text)
        }
    }

    /// Run a hybrid search.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] for a blank query
    /// - [`RagError::ConfigError`] for negative or non-finite weights
    /// - any error from embedding or the vector search
    pub async fn search(&self, query: &HybridQuery) -> Result<Vec<HybridResult>> {
        if query.query.trim().is_empty() {
            return Err(RagError::EmptyInput("query must not be empty".to_string()));
        }
        query.weights.validate()?;
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let tokens = tokenize(&query.query);
        let candidates = self.vector_candidates(query).await?;
        debug!(candidates = candidates.len(), "vector signal ready");

        let graph_scores = self.graph_signal(&candidates, &tokens, query.traversal_depth).await;
        debug!(reached = graph_scores.len(), "graph signal ready");

        let keyword_scores = keyword_signal(&candidates, &tokens);

        let results = fuse(candidates, graph_scores, keyword_scores, &query.weights, query.top_k);
        info!(results = results.len(), "hybrid search complete");
        Ok(results)
    }

    async fn vector_candidates(&self, query: &HybridQuery) -> Result<Vec<Candidate>> {
        let embedding = match &query.query_vector {
            Some(vector) if !vector.is_empty() => vector.clone(),
            _ => self.embedding_provider.embed(&query.query).await?,
        };

        let limit = query.top_k.saturating_mul(self.config.over_fetch_factor);
        let hits = self.vector_store.search(&embedding, limit, query.filter.as_ref()).await?;
        Ok(group_by_source(hits, self.config.min_vector_score))
    }

    async fn graph_signal(
        &self,
        candidates: &[Candidate],
        tokens: &[String],
        depth: usize,
    ) -> GraphScores {
        let Some(graph) = &self.graph else {
            debug!("no knowledge graph configured, graph signal empty");
            return GraphScores::new();
        };
        let seeds = select_seeds(candidates, tokens, self.config.max_seeds);
        if seeds.is_empty() {
            return GraphScores::new();
        }
        debug!(seeds = ?seeds, "traversing graph from seeds");

        match traverse_from_seeds(graph.as_ref(), &seeds, depth).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(error = %e, "graph search failed, continuing without graph signal");
                GraphScores::new()
            }
        }
    }
}

/// Lowercased query tokens with punctuation and stop words removed, first occurrence only.
fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Collapse hits above `min_score` into one candidate per source, in first-appearance order.
fn group_by_source(hits: Vec<SearchHit>, min_score: f32) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for hit in hits.into_iter().filter(|h| h.score >= min_score) {
        let unit = hit.unit;
        match positions.get(&unit.source_id) {
            Some(&pos) => {
                let candidate = &mut candidates[pos];
                if hit.score > candidate.score {
                    candidate.score = hit.score;
                    candidate.sample = unit.text.clone();
                }
                candidate.texts.push(unit.text);
            }
            None => {
                positions.insert(unit.source_id.clone(), candidates.len());
                let title =
                    unit.metadata.get("title").cloned().unwrap_or_else(|| unit.source_id.clone());
                candidates.push(Candidate {
                    source_id: unit.source_id,
                    title,
                    score: hit.score,
                    sample: unit.text.clone(),
                    texts: vec![unit.text],
                });
            }
        }
    }
    candidates
}

/// Sources sharing the most tokens with the query, title matches counting double.
fn select_seeds(candidates: &[Candidate], tokens: &[String], max_seeds: usize) -> Vec<String> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(&str, usize)> = candidates
        .iter()
        .map(|candidate| {
            let title = candidate.title.to_lowercase();
            let score: usize = candidate
                .texts
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    tokens
                        .iter()
                        .map(|token| {
                            if title.contains(token.as_str()) {
                                TITLE_MATCH
                            } else if text.contains(token.as_str()) {
                                CONTENT_MATCH
                            } else {
                                0
                            }
                        })
                        .sum::<usize>()
                })
                .sum();
            (candidate.source_id.as_str(), score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().take(max_seeds).map(|(source, _)| source.to_string()).collect()
}

async fn traverse_from_seeds(
    graph: &dyn KnowledgeGraph,
    seeds: &[String],
    depth: usize,
) -> Result<GraphScores> {
    let mut scores = GraphScores::new();
    for seed in seeds {
        if !graph.paper_exists(seed).await? {
            debug!(seed = %seed, "seed is not in the graph");
            continue;
        }
        scores.insert(seed.clone(), 1.0);

        let cited = graph.traverse_citations(seed, depth).await?;
        let similar = graph.traverse_similar(seed, depth).await?;
        for (paper, score) in cited.into_iter().chain(similar) {
            let entry = scores.entry(paper).or_insert(score);
            *entry = entry.max(score);
        }
    }
    Ok(scores)
}

/// Best fraction of query tokens found in any one chunk of each candidate.
fn keyword_signal(candidates: &[Candidate], tokens: &[String]) -> HashMap<String, f32> {
    if tokens.is_empty() {
        return HashMap::new();
    }
    candidates
        .iter()
        .map(|candidate| {
            let best = candidate
                .texts
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    tokens.iter().filter(|t| text.contains(t.as_str())).count()
                })
                .max()
                .unwrap_or(0);
            (candidate.source_id.clone(), best as f32 / tokens.len() as f32)
        })
        .collect()
}

fn fuse(
    candidates: Vec<Candidate>,
    mut graph_scores: GraphScores,
    keyword_scores: HashMap<String, f32>,
    weights: &HybridWeights,
    top_k: usize,
) -> Vec<HybridResult> {
    let mut results: Vec<HybridResult> = candidates
        .into_iter()
        .map(|candidate| {
            let graph_score = graph_scores.remove(&candidate.source_id).unwrap_or(0.0);
            let keyword_score = keyword_scores.get(&candidate.source_id).copied().unwrap_or(0.0);
            HybridResult {
                source_id: candidate.source_id,
                content_sample: candidate.sample,
                vector_score: candidate.score,
                graph_score,
                keyword_score,
                hybrid_score: 0.0,
                rank: 0,
            }
        })
        .collect();

    // Graph-only sources follow the vector candidates, strongest first.
    let mut graph_only: Vec<(String, f32)> = graph_scores.into_iter().collect();
    graph_only.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
    });
    results.extend(graph_only.into_iter().map(|(source_id, graph_score)| HybridResult {
        source_id,
        content_sample: String::new(),
        vector_score: 0.0,
        graph_score,
        keyword_score: 0.0,
        hybrid_score: 0.0,
        rank: 0,
    }));

    for result in &mut results {
        result.hybrid_score = result.vector_score * weights.vector
            + result.graph_score * weights.graph
            + result.keyword_score * weights.keyword;
    }

    results.sort_by(|a, b| b.hybrid_score.partial_cmp(&a.hybrid_score).unwrap_or(Ordering::Equal));
    results.truncate(top_k);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(source: &str, score: f32, texts: &[&str]) -> Candidate {
        Candidate {
            source_id: source.to_string(),
            title: source.to_string(),
            score,
            sample: texts.first().map(|t| t.to_string()).unwrap_or_default(),
            texts: texts.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn tokenize_drops_stop_words_and_punctuation() {
        assert_eq!(
            tokenize("What is the Transformer, and attention?"),
            vec!["what", "transformer", "attention"]
        );
        assert!(tokenize("the and of").is_empty());
    }

    #[test]
    fn keyword_score_is_best_chunk_fraction() {
        let tokens = tokenize("sparse attention kernels");
        let candidates = vec![
            candidate("a", 0.9, &["sparse attention", "kernels only"]),
            candidate("b", 0.8, &["nothing"]),
        ];
        let scores = keyword_signal(&candidates, &tokens);
        assert!((scores["a"] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(scores["b"], 0.0);
    }

    #[test]
    fn seeds_prefer_title_matches() {
        let tokens = tokenize("attention");
        let candidates = vec![
            candidate("graph-networks", 0.9, &["uses attention once"]),
            candidate("attention-paper", 0.7, &["unrelated text"]),
            candidate("none", 0.6, &["no match"]),
        ];
        assert_eq!(
            select_seeds(&candidates, &tokens, 5),
            vec!["attention-paper", "graph-networks"]
        );
        assert_eq!(select_seeds(&candidates, &tokens, 1), vec!["attention-paper"]);
    }

    #[test]
    fn fusion_weights_signals_and_ranks_densely() {
        let candidates = vec![candidate("v", 0.8, &["x"])];
        let graph = GraphScores::from([("g".to_string(), 1.0)]);
        let weights = HybridWeights::new(0.6, 0.3, 0.1);
        let results = fuse(candidates, graph, HashMap::new(), &weights, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id, "v");
        assert!((results[0].hybrid_score - 0.48).abs() < 1e-6);
        assert!((results[1].hybrid_score - 0.3).abs() < 1e-6);
        assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2]);
    }
}
