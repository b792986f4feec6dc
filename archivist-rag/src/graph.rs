//! Knowledge graph seam used by hybrid search.
//!
//! [`KnowledgeGraph`] is the read interface the
//! [`HybridSearchEngine`](crate::HybridSearchEngine) needs from a citation
//! graph. [`InMemoryKnowledgeGraph`] is a small reference implementation
//! with weighted citation and similarity edges.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::Result;

/// Reachability scores keyed by paper id.
pub type GraphScores = HashMap<String, f32>;

/// Read access to a graph of papers connected by citation and similarity edges.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Whether `paper_id` is a node of the graph.
    async fn paper_exists(&self, paper_id: &str) -> Result<bool>;

    /// Papers reachable from `paper_id` over citation edges within `depth`
    /// hops, each with the best score over all paths. The start paper is
    /// not included.
    async fn traverse_citations(&self, paper_id: &str, depth: usize) -> Result<GraphScores>;

    /// Papers reachable from `paper_id` over similarity edges within
    /// `depth` hops, scored like [`KnowledgeGraph::traverse_citations`].
    async fn traverse_similar(&self, paper_id: &str, depth: usize) -> Result<GraphScores>;
}

type Adjacency = HashMap<String, Vec<(String, f32)>>;

/// An in-memory [`KnowledgeGraph`].
///
/// A path scores the product of its edge strengths, so proximity decays with
/// every hop. Citation edges are followed in both directions (citing and
/// cited-by); similarity edges are symmetric.
///
/// # Example
///
/// ```rust,ignore
/// let graph = InMemoryKnowledgeGraph::new()
///     .with_citation("bert", "attention", 1.0)
///     .with_similarity("bert", "gpt", 0.8);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledgeGraph {
    papers: HashSet<String>,
    citations: Adjacency,
    similar: Adjacency,
}

impl InMemoryKnowledgeGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a paper without edges.
    pub fn add_paper(&mut self, paper_id: impl Into<String>) {
        self.papers.insert(paper_id.into());
    }

    /// Record that `citing` cites `cited`. Strength is clamped to `[0, 1]`.
    pub fn add_citation(&mut self, citing: &str, cited: &str, strength: f32) {
        Self::link(&mut self.papers, &mut self.citations, citing, cited, strength);
    }

    /// Record that two papers are similar. Strength is clamped to `[0, 1]`.
    pub fn add_similarity(&mut self, a: &str, b: &str, strength: f32) {
        Self::link(&mut self.papers, &mut self.similar, a, b, strength);
    }

    /// Builder form of [`InMemoryKnowledgeGraph::add_paper`].
    pub fn with_paper(mut self, paper_id: impl Into<String>) -> Self {
        self.add_paper(paper_id);
        self
    }

    /// Builder form of [`InMemoryKnowledgeGraph::add_citation`].
    pub fn with_citation(mut self, citing: &str, cited: &str, strength: f32) -> Self {
        self.add_citation(citing, cited, strength);
        self
    }

    /// Builder form of [`InMemoryKnowledgeGraph::add_similarity`].
    pub fn with_similarity(mut self, a: &str, b: &str, strength: f32) -> Self {
        self.add_similarity(a, b, strength);
        self
    }

    fn link(papers: &mut HashSet<String>, edges: &mut Adjacency, a: &str, b: &str, strength: f32) {
        let strength = if strength.is_finite() { strength.clamp(0.0, 1.0) } else { 0.0 };
        papers.insert(a.to_string());
        papers.insert(b.to_string());
        edges.entry(a.to_string()).or_default().push((b.to_string(), strength));
        edges.entry(b.to_string()).or_default().push((a.to_string(), strength));
    }

    /// Level-by-level expansion keeping the best score per node.
    fn traverse(edges: &Adjacency, start: &str, depth: usize) -> GraphScores {
        let mut best: GraphScores = HashMap::new();
        let mut frontier: GraphScores = HashMap::from([(start.to_string(), 1.0)]);

        for _ in 0..depth {
            let mut next: GraphScores = HashMap::new();
            for (node, score) in &frontier {
                for (neighbor, strength) in edges.get(node).into_iter().flatten() {
                    if neighbor == start {
                        continue;
                    }
                    let candidate = score * strength;
                    if best.get(neighbor).is_none_or(|&current| candidate > current) {
                        best.insert(neighbor.clone(), candidate);
                        let entry = next.entry(neighbor.clone()).or_insert(candidate);
                        *entry = entry.max(candidate);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        best
    }
}

#[async_trait]
impl KnowledgeGraph for InMemoryKnowledgeGraph {
    async fn paper_exists(&self, paper_id: &str) -> Result<bool> {
        Ok(self.papers.contains(paper_id))
    }

    async fn traverse_citations(&self, paper_id: &str, depth: usize) -> Result<GraphScores> {
        Ok(Self::traverse(&self.citations, paper_id, depth))
    }

    async fn traverse_similar(&self, paper_id: &str, depth: usize) -> Result<GraphScores> {
        Ok(Self::traverse(&self.similar, paper_id, depth))
    }
}
