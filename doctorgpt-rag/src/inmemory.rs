use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::persona::CorpusHandle;
use crate::store::{cosine_similarity, CorpusStore, InsertFailure, InsertReport};

/// In-memory corpus store for tests and development.
///
/// Chunks are kept in insertion order, so equal-score ties resolve to the
/// earliest inserted chunk.
#[derive(Debug, Default)]
pub struct InMemoryCorpusStore {
    collections: RwLock<HashMap<String, Collection>>,
}

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    chunks: Vec<Chunk>,
}

impl InMemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(corpus: &CorpusHandle) -> RagError {
        RagError::Store {
            backend: "memory".into(),
            message: format!("collection '{}' does not exist", corpus.table()),
        }
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpusStore {
    async fn create_collection(&self, corpus: &CorpusHandle, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(corpus.table()) {
            if existing.dimensions != dimensions {
                return Err(RagError::Store {
                    backend: "memory".into(),
                    message: format!(
                        "collection '{}' already exists with {} dimensions",
                        corpus.table(),
                        existing.dimensions
                    ),
                });
            }
            return Ok(());
        }
        collections.insert(
            corpus.table().to_string(),
            Collection {
                dimensions,
                chunks: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert(&self, corpus: &CorpusHandle, chunks: &[Chunk]) -> Result<InsertReport> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(corpus.table())
            .ok_or_else(|| Self::missing(corpus))?;
        let mut report = InsertReport::default();
        for chunk in chunks {
            if chunk.embedding.len() != collection.dimensions {
                report.failures.push(InsertFailure {
                    chunk_id: chunk.id.clone(),
                    message: format!(
                        "embedding has {} dimensions, collection expects {}",
                        chunk.embedding.len(),
                        collection.dimensions
                    ),
                });
                continue;
            }
            // Re-inserting an id replaces the chunk in place, keeping its
            // original position for tie-breaking.
            match collection
                .chunks
                .iter_mut()
                .find(|existing| existing.id == chunk.id)
            {
                Some(existing) => *existing = chunk.clone(),
                None => collection.chunks.push(chunk.clone()),
            }
            report.inserted += 1;
        }
        Ok(report)
    }

    async fn nearest(
        &self,
        corpus: &CorpusHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(corpus.table())
            .ok_or_else(|| Self::missing(corpus))?;
        if embedding.len() != collection.dimensions {
            return Err(RagError::Store {
                backend: "memory".into(),
                message: format!(
                    "query embedding has {} dimensions, collection expects {}",
                    embedding.len(),
                    collection.dimensions
                ),
            });
        }
        let mut results: Vec<SearchResult> = collection
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                chunk: chunk.clone(),
                score: cosine_similarity(embedding, &chunk.embedding),
            })
            .collect();
        // Stable sort keeps insertion order for equal scores.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn count(&self, corpus: &CorpusHandle) -> Result<usize> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(corpus.table())
            .ok_or_else(|| Self::missing(corpus))?;
        Ok(collection.chunks.len())
    }

    async fn delete_collection(&self, corpus: &CorpusHandle) -> Result<()> {
        self.collections.write().await.remove(corpus.table());
        Ok(())
    }
}
