//! # Ask Basic Demo
//!
//! Demonstrates the full ask pipeline end to end: ingest a markdown
//! document, then ask questions against it.
//!
//! Uses `InMemoryCorpusStore`, a deterministic `MockEmbeddingProvider`,
//! and an offline generator that quotes the retrieved context, so it
//! runs with **zero API keys**.
//!
//! Run: `cargo run --example ask_basic`

use std::sync::Arc;

use doctorgpt_rag::{
    AskPipeline, AskRequest, Document, EmbeddingMode, EmbeddingProvider, GenerationParams,
    GenerationProvider, InMemoryCorpusStore, PipelineConfig,
};

// ---------------------------------------------------------------------------
// MockEmbeddingProvider — deterministic hash-based embeddings for demos/tests
// ---------------------------------------------------------------------------

struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embedding(&self, text: &str) -> Vec<f32> {
        // Deterministic embedding: hash the text bytes, then generate a
        // normalised vector whose direction depends on the content.
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            *v = ((hash.wrapping_add(i as u64)) as f32).sin();
        }
        // L2-normalise so cosine similarity is just the dot product.
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        emb
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(
        &self,
        texts: &[&str],
        _mode: EmbeddingMode,
    ) -> doctorgpt_rag::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embedding(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// OfflineGenerator — quotes the top retrieved chunk instead of calling an LLM
// ---------------------------------------------------------------------------

struct OfflineGenerator;

#[async_trait::async_trait]
impl GenerationProvider for OfflineGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> doctorgpt_rag::Result<String> {
        let context = prompt
            .split("CONTEXT:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQUESTION:").next())
            .unwrap_or("");
        let top = context.split("\n\n").next().unwrap_or("").trim();
        if top.is_empty() {
            Ok("I could not find anything relevant in the corpus.".to_string())
        } else {
            Ok(format!("According to my notes: {top}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -- 1. Configure the pipeline ----------------------------------------
    // 64-dimensional mock embeddings and top_k=2 keep the demo small; the
    // remaining knobs stay at their production defaults.
    let config = PipelineConfig::builder().dimensions(64).top_k(2).build()?;

    // -- 2. Build the pipeline with in-memory components ------------------
    let pipeline = Arc::new(
        AskPipeline::builder()
            .config(config)
            .embedder(Arc::new(MockEmbeddingProvider::new(64)))
            .generator(Arc::new(OfflineGenerator))
            .store(Arc::new(InMemoryCorpusStore::new()))
            .build()?,
    );

    // -- 3. Create the default persona's collection -----------------------
    pipeline.create_collection("sinclair").await?;

    // -- 4. Ingest a sample markdown document ------------------------------
    let document = Document::markdown(
        "longevity-notes",
        "sinclair",
        "# NMN\n\
         NMN is a precursor to NAD+, a coenzyme central to cellular energy \
         production whose levels decline with age in most tissues.\n\n\
         # Fasting\n\
         Time-restricted eating windows of sixteen hours or longer activate \
         autophagy pathways and are associated with improved metabolic markers.\n\n\
         # Exercise\n\
         Regular vigorous exercise raises NAD+ levels naturally and remains \
         the intervention with the strongest evidence base for healthspan.",
    );

    let report = pipeline.ingest(&document).await?;
    println!(
        "Ingested {} of {} chunks from '{}'.",
        report.inserted, report.chunk_count, document.id
    );

    // -- 5. Ask questions ---------------------------------------------------
    let questions = ["What is NMN?", "How long should a fasting window be?"];

    for question in &questions {
        println!("\nQ: {question}");
        let answer = pipeline.ask(&AskRequest::new(*question)).await?;
        println!("A: {}", answer.answer);
        for (i, source) in answer.sources.iter().enumerate() {
            match source.page {
                Some(page) => println!("   {}. (page {page}) {}", i + 1, source.text),
                None => println!("   {}. {}", i + 1, source.text),
            }
        }
    }

    Ok(())
}
