//! Ask pipeline orchestrator.
//!
//! The [`AskPipeline`] composes an [`EmbeddingProvider`], a [`CorpusStore`],
//! a [`Chunker`], a [`GenerationProvider`], the [`PersonaRegistry`], and the
//! [`AnswerCache`] into the two workflows of the service: ingesting
//! documents into a persona's corpus and answering questions against it.
//!
//! # Example
//!
//! ```rust,ignore
//! use doctorgpt_rag::{AskPipeline, AskRequest, PipelineConfig};
//!
//! let pipeline = AskPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .embedder(Arc::new(CohereEmbedder::from_env()?))
//!     .generator(Arc::new(CohereGenerator::from_env()?))
//!     .store(Arc::new(SupabaseCorpusStore::from_env()?))
//!     .build()?;
//!
//! let answer = pipeline.ask(&AskRequest::new("What is NMN?")).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::cache::AnswerCache;
use crate::chunking::{Chunker, HeadingChunker};
use crate::config::PipelineConfig;
use crate::document::{Document, SearchResult};
use crate::embedding::{EmbeddingMode, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::persona::PersonaRegistry;
use crate::store::CorpusStore;
use crate::synthesis::{Answer, AnswerSynthesizer, GenerationParams, GenerationProvider};

/// A question to answer against a persona's corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// The question text. Must not be blank.
    pub question: String,
    /// Number of chunks to retrieve; the configured default when `None`.
    pub top_k: Option<usize>,
    /// Persona whose corpus to search; the registry default when `None`.
    pub persona: Option<String>,
}

impl AskRequest {
    /// Creates a request with the default retrieval parameters.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            persona: None,
        }
    }

    /// Overrides the number of chunks to retrieve.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Overrides the persona whose corpus is searched.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }
}

/// Pipeline stage at which an ingestion failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    /// The embedding request covering the chunk failed.
    Embed,
    /// The corpus store rejected the chunk.
    Insert,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStage::Embed => write!(f, "embed"),
            IngestStage::Insert => write!(f, "insert"),
        }
    }
}

/// One chunk that did not make it into the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    pub chunk_id: String,
    pub stage: IngestStage,
    pub message: String,
}

/// Outcome of ingesting one document.
///
/// Ingestion is partial-failure tolerant: a chunk that fails to embed or
/// insert is recorded here and the rest of the document continues, so the
/// caller decides what a partial upload means.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks produced by the chunker.
    pub chunk_count: usize,
    /// Chunks that were successfully embedded.
    pub embedded: usize,
    /// Chunks accepted by the corpus store.
    pub inserted: usize,
    /// Chunks dropped on the way, with the stage that rejected them.
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    /// True when every parsed chunk reached the corpus.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The ask pipeline orchestrator.
///
/// Coordinates ingestion (chunk → embed → insert) and question answering
/// (validate → cache → embed → nearest → synthesize → cache). Construct
/// one via [`AskPipeline::builder()`].
pub struct AskPipeline {
    config: PipelineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CorpusStore>,
    chunker: Arc<dyn Chunker>,
    synthesizer: AnswerSynthesizer,
    personas: PersonaRegistry,
    cache: Arc<AnswerCache>,
}

impl fmt::Debug for AskPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AskPipeline {
    /// Create a new [`AskPipelineBuilder`].
    pub fn builder() -> AskPipelineBuilder {
        AskPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Return a reference to the persona registry.
    pub fn personas(&self) -> &PersonaRegistry {
        &self.personas
    }

    /// Return a reference to the answer cache.
    pub fn cache(&self) -> &AnswerCache {
        &self.cache
    }

    /// Create the persona's collection with the configured dimensionality.
    pub async fn create_collection(&self, persona: &str) -> Result<()> {
        let corpus = self.personas.resolve(persona)?;
        self.store.create_collection(corpus, self.config.dimensions).await
    }

    /// Number of chunks stored in the persona's corpus.
    pub async fn corpus_size(&self, persona: &str) -> Result<usize> {
        let corpus = self.personas.resolve(persona)?;
        self.store.count(corpus).await
    }

    /// Remove the persona's corpus ahead of a wholesale re-ingest.
    pub async fn delete_collection(&self, persona: &str) -> Result<()> {
        let corpus = self.personas.resolve(persona)?;
        self.store.delete_collection(corpus).await
    }

    /// Answer a question from the persona's corpus.
    ///
    /// Checks the cache before doing any embedding, retrieval, or
    /// generation work; a complete answer is cached only after the full
    /// pipeline succeeds, so failures are never served from cache.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a blank question, a zero
    /// `top_k`, an unknown persona, or a query embedding whose
    /// dimensionality does not match the corpus. Upstream and store
    /// failures propagate with their own kinds.
    pub async fn ask(&self, request: &AskRequest) -> Result<Answer> {
        if request.question.trim().is_empty() {
            return Err(RagError::Validation("question must not be empty".into()));
        }
        let top_k = request.top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be at least 1".into()));
        }
        let persona = request
            .persona
            .as_deref()
            .unwrap_or_else(|| self.personas.default_persona());
        // Reject unknown personas before the cache is consulted.
        self.personas.resolve(persona)?;

        if let Some(answer) = self.cache.get(persona, &request.question) {
            debug!(persona, "answer served from cache");
            return Ok(answer);
        }

        let results = self.retrieve(&request.question, persona, top_k).await?;
        let answer = self
            .synthesizer
            .synthesize(&request.question, persona, &results)
            .await?;
        self.cache.put(persona, &request.question, answer.clone());
        info!(persona, retrieved = results.len(), "question answered");
        Ok(answer)
    }

    /// Retrieve the `top_k` chunks nearest to the question.
    ///
    /// The query embedding's dimensionality is checked against the
    /// configured corpus dimensionality before any store call; a mismatch
    /// is a [`RagError::Validation`] since comparing vectors of different
    /// lengths can only produce garbage rankings.
    pub async fn retrieve(
        &self,
        question: &str,
        persona: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let corpus = self.personas.resolve(persona)?;
        let embedding = self.embedder.embed_query(question).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e
        })?;
        if embedding.len() != self.config.dimensions {
            return Err(RagError::Validation(format!(
                "query embedding has {} dimensions, corpus expects {}",
                embedding.len(),
                self.config.dimensions
            )));
        }
        let results = self.store.nearest(corpus, &embedding, top_k).await.map_err(|e| {
            error!(persona, error = %e, "nearest-neighbour search failed");
            e
        })?;
        debug!(persona, retrieved = results.len(), "retrieval completed");
        Ok(results)
    }

    /// Ingest a document into its persona's corpus: chunk → embed → insert.
    ///
    /// Chunk texts are embedded in batches of `embed_batch_size`; a failed
    /// batch records a failure for each of its chunk ids and the remaining
    /// batches continue. The store insert is per-record tolerant the same
    /// way. A document that parses to zero chunks is a report with
    /// `chunk_count` 0, not an error.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let corpus = self.personas.resolve(&document.persona)?;
        let chunks = self.chunker.chunk(document);
        let mut report = IngestReport {
            chunk_count: chunks.len(),
            ..IngestReport::default()
        };
        if chunks.is_empty() {
            info!(document.id = %document.id, "no chunks parsed from document");
            return Ok(report);
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            match self.embedder.embed(&texts, EmbeddingMode::Document).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        embedded.push(chunk.clone().with_embedding(vector));
                    }
                }
                Ok(vectors) => {
                    let message = format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    );
                    error!(document.id = %document.id, %message, "embedding batch miscounted");
                    for chunk in batch {
                        report.failures.push(IngestFailure {
                            chunk_id: chunk.id.clone(),
                            stage: IngestStage::Embed,
                            message: message.clone(),
                        });
                    }
                }
                Err(e) => {
                    error!(document.id = %document.id, error = %e, "embedding batch failed");
                    for chunk in batch {
                        report.failures.push(IngestFailure {
                            chunk_id: chunk.id.clone(),
                            stage: IngestStage::Embed,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        report.embedded = embedded.len();

        if !embedded.is_empty() {
            let insert = self.store.insert(corpus, &embedded).await.map_err(|e| {
                error!(document.id = %document.id, error = %e, "corpus insert failed");
                e
            })?;
            report.inserted = insert.inserted;
            for failure in insert.failures {
                report.failures.push(IngestFailure {
                    chunk_id: failure.chunk_id,
                    stage: IngestStage::Insert,
                    message: failure.message,
                });
            }
        }

        info!(
            document.id = %document.id,
            chunks = report.chunk_count,
            inserted = report.inserted,
            failed = report.failures.len(),
            "document ingested"
        );
        Ok(report)
    }
}

/// Builder for constructing an [`AskPipeline`].
///
/// `embedder`, `store`, and `generator` are required; everything else
/// falls back to the configuration defaults.
#[derive(Default)]
pub struct AskPipelineBuilder {
    config: Option<PipelineConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn CorpusStore>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    personas: Option<PersonaRegistry>,
    cache: Option<Arc<AnswerCache>>,
}

impl AskPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the corpus store backend.
    pub fn store(mut self, store: Arc<dyn CorpusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the generation provider used for answer synthesis.
    pub fn generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the document chunker. Defaults to a [`HeadingChunker`] with the
    /// configured minimum chunk length.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the persona registry. Defaults to the single "sinclair" persona.
    pub fn personas(mut self, personas: PersonaRegistry) -> Self {
        self.personas = Some(personas);
        self
    }

    /// Set the answer cache. Defaults to a fresh cache with the configured
    /// capacity.
    pub fn cache(mut self, cache: Arc<AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the [`AskPipeline`], validating the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required provider is missing or
    /// the embedder's declared dimensionality disagrees with the
    /// configured corpus dimensionality.
    pub fn build(self) -> Result<AskPipeline> {
        let config = self.config.unwrap_or_default();
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| RagError::Config("store is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::Config("generator is required".to_string()))?;
        if embedder.dimensions() != config.dimensions {
            return Err(RagError::Config(format!(
                "embedder produces {}-dimensional vectors, config expects {}",
                embedder.dimensions(),
                config.dimensions
            )));
        }
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(HeadingChunker::new(config.min_chunk_chars)));
        let personas = self.personas.unwrap_or_default();
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(AnswerCache::new(config.cache_capacity)));
        let params = GenerationParams {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        let synthesizer = AnswerSynthesizer::new(generator, params, config.preview_chars);

        Ok(AskPipeline {
            config,
            embedder,
            store,
            chunker,
            synthesizer,
            personas,
            cache,
        })
    }
}
