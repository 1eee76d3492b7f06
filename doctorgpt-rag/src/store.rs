use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::error::Result;
use crate::persona::CorpusHandle;

/// Per-chunk failure recorded during an insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertFailure {
    pub chunk_id: String,
    pub message: String,
}

/// Outcome of inserting a batch of chunks.
///
/// Inserts are per-record: one rejected chunk never blocks the rest, so
/// partial success comes back as data rather than an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertReport {
    /// Chunks accepted by the store.
    pub inserted: usize,
    /// Chunks the store rejected, with the backend's message.
    pub failures: Vec<InsertFailure>,
}

impl InsertReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Trait for vector-capable corpus stores.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Ensures the corpus can hold vectors of the given dimensionality.
    async fn create_collection(&self, corpus: &CorpusHandle, dimensions: usize) -> Result<()>;

    /// Inserts embedded chunks, one record at a time.
    async fn insert(&self, corpus: &CorpusHandle, chunks: &[Chunk]) -> Result<InsertReport>;

    /// Returns up to `top_k` chunks nearest to the query embedding, most
    /// similar first.
    async fn nearest(
        &self,
        corpus: &CorpusHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Number of chunks stored in the corpus.
    async fn count(&self, corpus: &CorpusHandle) -> Result<usize>;

    /// Removes the corpus and everything in it.
    async fn delete_collection(&self, corpus: &CorpusHandle) -> Result<()>;
}

/// Cosine similarity between two vectors, 0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
