//! # RAG with Gemini Embeddings
//!
//! Same flow as `rag_basic`, with real embeddings from the Gemini API and an
//! index persisted to `target/archivist-demo/index.json`. Run it twice: the
//! second run finds the document already indexed.
//!
//! Requires `GEMINI_API_KEY` (or `GOOGLE_API_KEY`).
//!
//! Run: `cargo run -p archivist-demos --example rag_gemini --features gemini`

use std::sync::Arc;

use archivist_demos::init_logging;
use archivist_rag::gemini::GeminiEmbeddingProvider;
use archivist_rag::{EmbeddingProvider, RagConfig, RagPipeline, VectorStoreConfig};

const PAPER_ID: &str = "vaswani2017";

const PAPER: &str = r"\section{Introduction}
Recurrent neural networks have been firmly established as state of the art approaches in
sequence modeling. Their inherently sequential nature precludes parallelization within training
examples. We propose the Transformer, a model architecture eschewing recurrence and instead
relying entirely on an attention mechanism to draw global dependencies between input and output.

\section{Why Self-Attention}
A self-attention layer connects all positions with a constant number of sequentially executed
operations. Self-attention layers are faster than recurrent layers when the sequence length is
smaller than the representation dimensionality.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");

    let provider = Arc::new(GeminiEmbeddingProvider::from_env()?);
    let config = RagConfig::builder()
        .chunk_size(400)
        .chunk_overlap(80)
        .dimensions(provider.dimensions())
        .vector_store(VectorStoreConfig::Persistent {
            snapshot_path: "target/archivist-demo/index.json".into(),
        })
        .build()?;
    let pipeline = RagPipeline::open(config, provider).await?;

    let (indexed, units) = pipeline.indexer().is_indexed(PAPER_ID).await?;
    if indexed {
        println!("{PAPER_ID} already indexed ({units} units)");
    } else {
        let chunks = pipeline.index_document(PAPER_ID, PAPER).await?;
        println!("indexed {PAPER_ID}: {chunks} chunk(s)");
    }

    let context = pipeline.retrieve("why is self-attention faster than recurrence?").await?;
    println!("\n{}", context.combined_text);
    if context.omitted > 0 {
        println!("({} more hit(s) did not fit the context budget)", context.omitted);
    }
    Ok(())
}
