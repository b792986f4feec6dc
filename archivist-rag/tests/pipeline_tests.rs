//! End-to-end pipeline: configuration, indexing, retrieval and hybrid search.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use archivist_rag::config::{RagConfig, VectorStoreConfig};
use archivist_rag::document::MetadataFilter;
use archivist_rag::error::RagError;
use archivist_rag::graph::InMemoryKnowledgeGraph;
use archivist_rag::inmemory::InMemoryVectorStore;
use archivist_rag::pipeline::RagPipeline;
use common::TopicEmbedder;

const TOPICS: &[&str] = &["transformer", "attention", "protein"];

const VASWANI: &str = "\\section{Introduction}\n\
    Recurrent networks process tokens one at a time. The transformer relies on attention instead.\n\
    \\section{Model}\n\
    Each transformer layer applies multi-head attention. A feed-forward block follows it.";

const JUMPER: &str = "\\section{Abstract}\n\
    Protein structure prediction is a long-standing problem. We predict protein folds accurately.";

fn embedder() -> Arc<TopicEmbedder> {
    Arc::new(TopicEmbedder::new(TOPICS))
}

fn config() -> RagConfig {
    RagConfig::builder().dimensions(TOPICS.len() + 1).build().unwrap()
}

async fn indexed_pipeline() -> RagPipeline {
    let pipeline = RagPipeline::open(config(), embedder()).await.unwrap();
    pipeline.index_document("vaswani", VASWANI).await.unwrap();
    pipeline.index_document("jumper", JUMPER).await.unwrap();
    pipeline
}

#[tokio::test]
async fn indexes_by_section_and_retrieves_relevant_context() {
    let pipeline = indexed_pipeline().await;
    assert_eq!(pipeline.vector_store().len().await.unwrap(), 3);

    let context = pipeline.retrieve("transformer attention").await.unwrap();
    assert_eq!(context.sources, vec!["vaswani".to_string()]);
    assert_eq!(context.sections, vec!["Introduction".to_string(), "Model".to_string()]);
    assert!(context.combined_text.contains("[Source: vaswani, Section: Introduction, Chunk 1]"));
    assert!(context.combined_text.contains("[Source: vaswani, Section: Model, Chunk 2]"));
}

#[tokio::test]
async fn filtered_retrieval_stays_in_one_source() {
    let pipeline = indexed_pipeline().await;

    let filter = MetadataFilter::source("jumper");
    let context = pipeline.retrieve_filtered("protein folding", &filter).await.unwrap();
    assert_eq!(context.sources, vec!["jumper".to_string()]);

    let err = pipeline.retrieve_filtered("transformer", &filter).await.unwrap_err();
    assert!(matches!(err, RagError::NoResults(_)));
}

#[tokio::test]
async fn hybrid_search_uses_graph_when_configured() {
    let graph = InMemoryKnowledgeGraph::new().with_citation("vaswani", "bahdanau", 0.5);
    let pipeline = RagPipeline::builder()
        .config(config())
        .embedding_provider(embedder())
        .vector_store(Arc::new(InMemoryVectorStore::new(TOPICS.len() + 1)))
        .knowledge_graph(Arc::new(graph))
        .build()
        .unwrap();
    pipeline.index_document("vaswani", VASWANI).await.unwrap();
    pipeline.index_document("jumper", JUMPER).await.unwrap();

    let results = pipeline.hybrid_search("transformer attention").await.unwrap();
    let order: Vec<&str> = results.iter().map(|r| r.source_id.as_str()).collect();
    assert_eq!(order, vec!["vaswani", "bahdanau"]);
    assert_eq!(results[0].rank, 1);
    assert!(results[0].content_sample.contains("relies on attention"));
}

#[tokio::test]
async fn reindex_replaces_previous_units() {
    let pipeline = indexed_pipeline().await;

    let count = pipeline
        .reindex("vaswani", "The transformer was revised. Attention is still central.")
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(pipeline.indexer().is_indexed("vaswani").await.unwrap(), (true, 1));
    assert_eq!(pipeline.vector_store().len().await.unwrap(), 2);
}

#[tokio::test]
async fn metadata_titles_flow_through() {
    let pipeline = RagPipeline::open(config(), embedder()).await.unwrap();
    let metadata = HashMap::from([("title".to_string(), "Attention Is All You Need".to_string())]);
    pipeline.index_document_with_metadata("vaswani", VASWANI, metadata).await.unwrap();

    let by_title = MetadataFilter::new().with("title", "Attention Is All You Need");
    let context = pipeline.retrieve_filtered("transformer", &by_title).await.unwrap();
    assert!(!context.hits.is_empty());
    assert!(context.hits.iter().all(|h| h.unit.source_id == "vaswani"));
}

#[tokio::test]
async fn persistent_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("index.json");
    let config = RagConfig::builder()
        .dimensions(TOPICS.len() + 1)
        .vector_store(VectorStoreConfig::Persistent { snapshot_path: snapshot_path.clone() })
        .build()
        .unwrap();

    {
        let pipeline = RagPipeline::open(config.clone(), embedder()).await.unwrap();
        pipeline.index_document("vaswani", VASWANI).await.unwrap();
    }
    assert!(snapshot_path.exists());

    let reopened = RagPipeline::open(config, embedder()).await.unwrap();
    assert_eq!(reopened.vector_store().len().await.unwrap(), 2);
    let context = reopened.retrieve("transformer").await.unwrap();
    assert_eq!(context.sources, vec!["vaswani".to_string()]);
}

#[tokio::test]
async fn builder_requires_matching_collaborators() {
    let missing = RagPipeline::builder().config(config()).embedding_provider(embedder()).build();
    assert!(matches!(missing, Err(RagError::ConfigError(_))));

    let mismatched = RagPipeline::builder()
        .embedding_provider(embedder())
        .vector_store(Arc::new(InMemoryVectorStore::new(768)))
        .build();
    assert!(matches!(mismatched, Err(RagError::ConfigError(_))));
}

#[test]
fn invalid_configuration_is_rejected() {
    assert!(matches!(
        RagConfig::builder().chunk_size(100).chunk_overlap(100).build(),
        Err(RagError::ConfigError(_))
    ));
    assert!(matches!(RagConfig::builder().top_k(0).build(), Err(RagError::ConfigError(_))));
}

#[cfg(not(feature = "qdrant"))]
#[tokio::test]
async fn remote_backend_needs_its_feature() {
    let config = RagConfig::builder()
        .dimensions(TOPICS.len() + 1)
        .vector_store(VectorStoreConfig::Qdrant {
            url: "http://localhost:6334".to_string(),
            collection: "papers".to_string(),
        })
        .build()
        .unwrap();
    assert!(matches!(RagPipeline::open(config, embedder()).await, Err(RagError::ConfigError(_))));
}
