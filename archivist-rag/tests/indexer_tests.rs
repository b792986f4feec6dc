//! Indexer behaviour against the brute-force store.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use archivist_rag::analyzer::StaticAnalyzer;
use archivist_rag::chunking::Segmenter;
use archivist_rag::document::IndexedUnit;
use archivist_rag::error::RagError;
use archivist_rag::indexer::Indexer;
use archivist_rag::inmemory::InMemoryVectorStore;
use archivist_rag::vectorstore::VectorStore;
use common::{FailingEmbedder, HashEmbedder, TopicEmbedder, WrongDimensionEmbedder, sentence};

const DIM: usize = 8;

fn long_document() -> String {
    (0..50).map(|i| sentence(char::from(b'a' + (i % 26) as u8), 99)).collect::<Vec<_>>().join(" ")
}

fn indexer_with(store: Arc<InMemoryVectorStore>) -> Indexer {
    Indexer::new(
        Arc::new(Segmenter::new(2000, 200)),
        Arc::new(HashEmbedder { dimensions: DIM }),
        store,
    )
}

#[tokio::test]
async fn indexes_every_chunk_with_deterministic_ids() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = indexer_with(store.clone());

    let count = indexer.index_document("paper", &long_document()).await.unwrap();
    assert_eq!(count, 3);

    let units = store.get_by_source("paper").await.unwrap();
    let ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
    let expected: Vec<String> = (0..3).map(|i| IndexedUnit::id_for("paper", i)).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());

    for unit in &units {
        assert_eq!(unit.embedding.len(), DIM);
        assert_eq!(unit.metadata.get("source").map(String::as_str), Some("paper"));
        assert_eq!(unit.metadata.get("chunk_index"), Some(&unit.chunk_index.to_string()));
    }
}

#[tokio::test]
async fn indexing_twice_does_not_duplicate() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = indexer_with(store.clone());

    indexer.index_document("paper", &long_document()).await.unwrap();
    indexer.index_document("paper", &long_document()).await.unwrap();

    assert_eq!(store.len().await.unwrap(), 3);
}

#[tokio::test]
async fn reindex_drops_stale_chunks() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = indexer_with(store.clone());

    indexer.index_document("paper", &long_document()).await.unwrap();
    let count =
        indexer.reindex("paper", "A much shorter revision. It has two sentences.").await.unwrap();

    assert_eq!(count, 1);
    assert_eq!(indexer.is_indexed("paper").await.unwrap(), (true, 1));
}

#[tokio::test]
async fn embeds_in_configured_batches() {
    let store = Arc::new(InMemoryVectorStore::new(3));
    let embedder = TopicEmbedder::new(&["attention", "graph"]);
    let calls = embedder.batch_calls.clone();
    let indexer = Indexer::new(
        Arc::new(Segmenter::new(2000, 200)),
        Arc::new(embedder),
        store.clone(),
    )
    .with_batching(2, 2);

    indexer.index_document("paper", &long_document()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.len().await.unwrap(), 3);
}

#[tokio::test]
async fn embedding_failure_leaves_index_untouched() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = Indexer::new(
        Arc::new(Segmenter::new(2000, 200)),
        Arc::new(FailingEmbedder { dimensions: DIM }),
        store.clone(),
    );

    let err = indexer.index_document("paper", &long_document()).await.unwrap_err();
    assert!(matches!(err, RagError::UpstreamUnavailable { .. }));
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn malformed_embeddings_are_rejected() {
    let store = Arc::new(InMemoryVectorStore::new(4));
    let indexer = Indexer::new(
        Arc::new(Segmenter::new(2000, 200)),
        Arc::new(WrongDimensionEmbedder { claimed: 4, actual: 3 }),
        store.clone(),
    );

    let err = indexer.index_document("paper", "One sentence. Two sentences.").await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 4, actual: 3 }));
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn rejects_blank_inputs() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = indexer_with(store.clone());

    assert!(matches!(
        indexer.index_document("  ", "Some text.").await,
        Err(RagError::EmptyInput(_))
    ));
    assert!(matches!(indexer.index_document("paper", "\n\n").await, Err(RagError::EmptyInput(_))));
    assert!(matches!(
        indexer.index_document("paper", "no sentence boundary").await,
        Err(RagError::NoSegmentableContent { .. })
    ));
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn metadata_is_attached_but_reserved_keys_win() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = Indexer::new(
        Arc::new(Segmenter::new(2000, 200).with_min_chunk_size(5).with_sections(true)),
        Arc::new(HashEmbedder { dimensions: DIM }),
        store.clone(),
    );
    let metadata = HashMap::from([
        ("title".to_string(), "Attention Is All You Need".to_string()),
        ("source".to_string(), "spoofed".to_string()),
    ]);

    indexer
        .index_document_with_metadata(
            "vaswani2017",
            "\\section{Introduction}\nRecurrent models are slow. Attention is fast.",
            metadata,
        )
        .await
        .unwrap();

    let units = store.get_by_source("vaswani2017").await.unwrap();
    assert_eq!(units.len(), 1);
    let meta = &units[0].metadata;
    assert_eq!(meta.get("title").map(String::as_str), Some("Attention Is All You Need"));
    assert_eq!(meta.get("source").map(String::as_str), Some("vaswani2017"));
    assert_eq!(meta.get("section").map(String::as_str), Some("Introduction"));
    assert_eq!(units[0].section.as_deref(), Some("Introduction"));
}

#[tokio::test]
async fn delete_document_and_is_indexed() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = indexer_with(store.clone());

    assert_eq!(indexer.is_indexed("paper").await.unwrap(), (false, 0));
    indexer.index_document("paper", &long_document()).await.unwrap();
    assert_eq!(indexer.is_indexed("paper").await.unwrap(), (true, 3));

    assert_eq!(indexer.delete_document("paper").await.unwrap(), 3);
    assert_eq!(indexer.is_indexed("paper").await.unwrap(), (false, 0));
}

#[tokio::test]
async fn indexes_text_from_analyzer() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let indexer = indexer_with(store.clone());
    let analyzer = StaticAnalyzer::new().with_document("doc-1", long_document());

    assert_eq!(indexer.index_from_analyzer(&analyzer, "doc-1").await.unwrap(), 3);

    let err = indexer.index_from_analyzer(&analyzer, "doc-2").await.unwrap_err();
    assert!(matches!(err, RagError::UpstreamUnavailable { .. }));
    assert_eq!(store.len().await.unwrap(), 3);
}
