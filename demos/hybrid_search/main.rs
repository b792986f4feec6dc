//! # Hybrid Search Example
//!
//! Ranks papers by combining three signals: semantic similarity from the
//! vector index, proximity in a citation graph, and keyword overlap with the
//! query. Papers that are only reachable through the graph still show up,
//! with an empty content sample.
//!
//! Run: `cargo run -p archivist-demos --example hybrid_search`

use std::sync::Arc;

use archivist_demos::{VocabularyEmbedder, init_logging};
use archivist_rag::{
    HybridQuery, HybridWeights, InMemoryKnowledgeGraph, InMemoryVectorStore, RagConfig,
    RagPipeline,
};

const VOCABULARY: &[&str] = &["attention", "transformer", "pretraining", "language", "graph"];

const CORPUS: &[(&str, &str)] = &[
    (
        "vaswani2017",
        "The transformer relies entirely on attention. It drops recurrence and convolutions.",
    ),
    (
        "devlin2019",
        "We pretrain a deep bidirectional transformer on unlabeled language text.",
    ),
    (
        "velickovic2018",
        "Graph attention networks apply masked attention to graph structured data.",
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");

    let graph = InMemoryKnowledgeGraph::new()
        .with_citation("devlin2019", "vaswani2017", 1.0)
        .with_citation("vaswani2017", "bahdanau2014", 0.6)
        .with_similarity("vaswani2017", "velickovic2018", 0.7)
        .with_paper("radford2018");

    let dimensions = VOCABULARY.len() + 1;
    let config = RagConfig::builder().dimensions(dimensions).build()?;
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(VocabularyEmbedder::new(VOCABULARY)))
        .vector_store(Arc::new(InMemoryVectorStore::new(dimensions)))
        .knowledge_graph(Arc::new(graph))
        .build()?;

    for (id, text) in CORPUS {
        pipeline.index_document(id, text).await?;
    }

    // Configured defaults: weights 0.6 / 0.3 / 0.1, depth 2, ten results.
    print_results("transformer attention", &pipeline.hybrid_search("transformer attention").await?);

    // A graph-heavy ranking that only walks one hop.
    let query = HybridQuery::new("transformer attention")
        .weights(HybridWeights::new(0.3, 0.6, 0.1))
        .traversal_depth(1)
        .top_k(3);
    print_results("graph-weighted, depth 1", &pipeline.hybrid().search(&query).await?);

    Ok(())
}

fn print_results(label: &str, results: &[archivist_rag::HybridResult]) {
    println!("\n== {label} ==");
    for r in results {
        println!(
            "{:>2}. {:<16} hybrid={:.3} vector={:.3} graph={:.3} keyword={:.3} {}",
            r.rank,
            r.source_id,
            r.hybrid_score,
            r.vector_score,
            r.graph_score,
            r.keyword_score,
            if r.content_sample.is_empty() { "(graph only)" } else { "" },
        );
    }
}
