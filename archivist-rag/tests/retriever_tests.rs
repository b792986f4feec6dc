//! Retriever: score floor, filters, dedup, context budget and multi-source merge.

mod common;

use std::sync::Arc;

use archivist_rag::config::{DedupStrategy, RetrievalConfig};
use archivist_rag::document::{IndexedUnit, MetadataFilter, SearchHit};
use archivist_rag::embedding::EmbeddingProvider;
use archivist_rag::error::{RagError, Result};
use archivist_rag::inmemory::InMemoryVectorStore;
use archivist_rag::reranker::Reranker;
use archivist_rag::retriever::Retriever;
use archivist_rag::vectorstore::VectorStore;
use async_trait::async_trait;
use common::{FailingEmbedder, TopicEmbedder, unit};

const TOPICS: &[&str] = &["transformer", "graph", "protein"];

/// Store every `(source, index, text)` with its topic embedding.
async fn retriever_over(
    docs: &[(&str, usize, &str)],
    config: RetrievalConfig,
) -> (Retriever, Arc<InMemoryVectorStore>) {
    let embedder = TopicEmbedder::new(TOPICS);
    let store = Arc::new(InMemoryVectorStore::new(embedder.dimensions()));
    let units: Vec<IndexedUnit> = docs
        .iter()
        .map(|(source, idx, text)| unit(source, *idx, text, embedder.vector(text)))
        .collect();
    store.upsert(&units).await.unwrap();
    (Retriever::new(Arc::new(embedder), store.clone(), config), store)
}

#[tokio::test]
async fn source_filter_wins_over_better_matches_elsewhere() {
    let (retriever, _) = retriever_over(
        &[
            ("paper_B", 0, "The transformer encoder."),
            ("paper_B", 1, "A transformer decoder."),
            ("paper_A", 0, "A transformer over a citation graph."),
        ],
        RetrievalConfig::default(),
    )
    .await;

    let context =
        retriever.retrieve_from_source("transformer architecture", "paper_A").await.unwrap();

    assert_eq!(context.sources, vec!["paper_A".to_string()]);
    assert_eq!(context.hits.len(), 1);
    assert!(context.hits[0].score >= 0.3);
    assert!(context.combined_text.contains("[Source: paper_A, Chunk 1]"));
}

#[tokio::test]
async fn nothing_above_floor_is_no_results() {
    let (retriever, _) = retriever_over(
        &[("paper_A", 0, "The transformer encoder."), ("paper_A", 1, "A graph of papers.")],
        RetrievalConfig::default(),
    )
    .await;

    let err = retriever.retrieve("protein folding", None).await.unwrap_err();
    assert!(matches!(err, RagError::NoResults(_)));
}

#[tokio::test]
async fn blank_query_is_empty_input() {
    let (retriever, _) =
        retriever_over(&[("a", 0, "The transformer.")], RetrievalConfig::default()).await;
    assert!(matches!(retriever.retrieve("   ", None).await, Err(RagError::EmptyInput(_))));
}

#[tokio::test]
async fn embedding_failure_propagates() {
    let store = Arc::new(InMemoryVectorStore::new(4));
    let retriever = Retriever::new(
        Arc::new(FailingEmbedder { dimensions: 4 }),
        store,
        RetrievalConfig::default(),
    );
    let err = retriever.retrieve("transformer", None).await.unwrap_err();
    assert!(matches!(err, RagError::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn near_duplicates_are_collapsed_per_source() {
    let shared = "Transformer blocks stack attention layers and feed-forward layers";
    let first = format!("{shared}, variant one.");
    let second = format!("{shared}, variant two.");
    let (retriever, _) = retriever_over(
        &[("a", 0, first.as_str()), ("a", 1, second.as_str()), ("b", 0, first.as_str())],
        RetrievalConfig::default(),
    )
    .await;

    let context = retriever.retrieve("transformer", None).await.unwrap();
    let kept: Vec<(&str, usize)> =
        context.hits.iter().map(|h| (h.unit.source_id.as_str(), h.unit.chunk_index)).collect();
    assert_eq!(kept, vec![("a", 0), ("b", 0)]);
}

#[tokio::test]
async fn content_hash_dedup_keeps_distinct_texts() {
    let shared = "Transformer blocks stack attention layers and feed-forward layers";
    let first = format!("{shared}, variant one.");
    let second = format!("{shared}, variant two.");
    let config = RetrievalConfig { dedup: DedupStrategy::ContentHash, ..Default::default() };
    let (retriever, _) = retriever_over(
        &[("a", 0, first.as_str()), ("a", 1, second.as_str()), ("a", 2, first.as_str())],
        config,
    )
    .await;

    let context = retriever.retrieve("transformer", None).await.unwrap();
    let kept: Vec<usize> = context.hits.iter().map(|h| h.unit.chunk_index).collect();
    assert_eq!(kept, vec![0, 1]);
}

#[tokio::test]
async fn context_stops_at_budget() {
    // Each entry is "\n[Source: x, Chunk n]\n" (22 chars) plus 16 chars of text and a newline.
    let config = RetrievalConfig { max_context_length: 80, ..Default::default() };
    let (retriever, _) = retriever_over(
        &[
            ("a", 0, "transformer one."),
            ("b", 0, "transformer two."),
            ("c", 0, "transformer six."),
        ],
        config,
    )
    .await;

    let context = retriever.retrieve("transformer", None).await.unwrap();

    assert_eq!(context.hits.len(), 2);
    assert_eq!(context.omitted, 1);
    assert_eq!(context.sources, vec!["a".to_string(), "b".to_string()]);
    assert!(context.combined_text.chars().count() <= 80);
    assert_eq!(
        context.combined_text,
        "\n[Source: a, Chunk 1]\ntransformer one.\n\n[Source: b, Chunk 2]\ntransformer two.\n"
    );
}

#[tokio::test]
async fn first_hit_over_budget_yields_empty_context() {
    let config = RetrievalConfig { max_context_length: 10, ..Default::default() };
    let (retriever, _) =
        retriever_over(&[("a", 0, "transformer one."), ("b", 0, "transformer two.")], config).await;

    let context = retriever.retrieve("transformer", None).await.unwrap();
    assert!(context.hits.is_empty());
    assert!(context.combined_text.is_empty());
    assert_eq!(context.omitted, 2);
}

#[tokio::test]
async fn sections_are_reported_in_order() {
    let embedder = TopicEmbedder::new(TOPICS);
    let store = Arc::new(InMemoryVectorStore::new(4));
    let mut method = unit("a", 0, "The transformer method.", embedder.vector("transformer"));
    method.section = Some("Method".to_string());
    let mut results = unit("a", 1, "Transformer results.", embedder.vector("transformer graph"));
    results.section = Some("Results".to_string());
    store.upsert(&[method, results]).await.unwrap();
    let retriever = Retriever::new(Arc::new(embedder), store, RetrievalConfig::default());

    let context = retriever.retrieve("transformer", None).await.unwrap();
    assert_eq!(context.sections, vec!["Method".to_string(), "Results".to_string()]);
    assert!(context.combined_text.contains("[Source: a, Section: Method, Chunk 1]"));
}

#[tokio::test]
async fn multi_source_merges_and_skips_empty_sources() {
    let (retriever, _) = retriever_over(
        &[
            ("a", 0, "A transformer over a citation graph."),
            ("b", 0, "The transformer encoder."),
            ("c", 0, "Protein structures."),
        ],
        RetrievalConfig::default(),
    )
    .await;

    let context =
        retriever.retrieve_multi_source("transformer", &["a", "c", "missing", "b"]).await.unwrap();
    assert_eq!(context.sources, vec!["b".to_string(), "a".to_string()]);

    let err = retriever.retrieve_multi_source("transformer", &["c", "missing"]).await.unwrap_err();
    assert!(matches!(err, RagError::NoResults(_)));

    let all = retriever.retrieve_multi_source::<&str>("transformer", &[]).await.unwrap();
    assert_eq!(all.hits.len(), 2);
}

#[tokio::test]
async fn citations_name_source_section_and_chunk() {
    let embedder = TopicEmbedder::new(TOPICS);
    let store = Arc::new(InMemoryVectorStore::new(4));
    let mut with_section =
        unit("vaswani", 2, "Transformer method.", embedder.vector("transformer"));
    with_section.section = Some("Method".to_string());
    let plain = unit("devlin", 0, "A transformer encoder.", embedder.vector("transformer graph"));
    store.upsert(&[with_section, plain]).await.unwrap();
    let retriever = Retriever::new(Arc::new(embedder), store, RetrievalConfig::default());

    let context = retriever.retrieve_with_citations("transformer", None).await.unwrap();
    let citations: Vec<&str> = context
        .hits
        .iter()
        .map(|h| h.unit.metadata.get("citation").map(String::as_str).unwrap_or_default())
        .collect();
    assert_eq!(
        citations,
        vec!["Source: vaswani, Section: Method, Chunk 2", "Source: devlin, Chunk 0"]
    );
}

/// Pushes hits mentioning "graph" to the top.
struct GraphFirst;

#[async_trait]
impl Reranker for GraphFirst {
    async fn rerank(&self, _query: &str, hits: Vec<SearchHit>) -> Result<Vec<SearchHit>> {
        Ok(hits
            .into_iter()
            .map(|mut hit| {
                if hit.unit.text.contains("graph") {
                    hit.score += 1.0;
                }
                hit
            })
            .collect())
    }
}

#[tokio::test]
async fn reranker_scores_decide_order() {
    let (retriever, _) = retriever_over(
        &[("b", 0, "The transformer encoder."), ("a", 0, "A transformer over a citation graph.")],
        RetrievalConfig::default(),
    )
    .await;
    let retriever = retriever.with_reranker(Arc::new(GraphFirst));

    let context = retriever.retrieve("transformer", None).await.unwrap();
    assert_eq!(context.hits[0].unit.source_id, "a");

    let filter = MetadataFilter::source("b");
    let only_b = retriever.retrieve("transformer", Some(&filter)).await.unwrap();
    assert_eq!(only_b.sources, vec!["b".to_string()]);
}
