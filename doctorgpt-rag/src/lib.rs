//! # doctorgpt-rag
//!
//! Retrieval-augmented question answering over persona-scoped document
//! corpora. Documents are split into chunks, embedded with Cohere, and
//! stored in a vector-capable corpus store (Supabase with pgvector in
//! production, in-memory for development and tests). At query time the
//! question is embedded, the top-k most similar chunks are retrieved, and
//! a Cohere chat model generates an answer grounded in that context,
//! returned together with page-cited source previews.
//!
//! ## Components
//!
//! - [`HeadingChunker`] / [`PageChunker`] — split markdown and extracted
//!   PDF pages into bounded, titled chunks.
//! - [`EmbeddingProvider`] / [`CohereEmbedder`] — asymmetric query and
//!   document embeddings.
//! - [`CorpusStore`] / [`SupabaseCorpusStore`] / [`InMemoryCorpusStore`] —
//!   persona-scoped chunk storage with cosine nearest-neighbour search.
//! - [`GenerationProvider`] / [`CohereGenerator`] — answer synthesis.
//! - [`PersonaRegistry`] — allow-listed persona → corpus mapping.
//! - [`AnswerCache`] — bounded LRU cache of complete answers.
//! - [`AskPipeline`] — ties the above together.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use doctorgpt_rag::{
//!     AskPipeline, AskRequest, CohereEmbedder, CohereGenerator, PipelineConfig,
//!     SupabaseCorpusStore,
//! };
//!
//! let pipeline = AskPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .embedder(Arc::new(CohereEmbedder::from_env()?))
//!     .generator(Arc::new(CohereGenerator::from_env()?))
//!     .store(Arc::new(SupabaseCorpusStore::from_env()?))
//!     .build()?;
//!
//! let answer = pipeline.ask(&AskRequest::new("What about NMN?")).await?;
//! println!("{}", answer.answer);
//! ```

pub mod cache;
pub mod chunking;
pub mod cohere;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod persona;
pub mod pipeline;
pub mod store;
pub mod supabase;
pub mod synthesis;

pub use cache::AnswerCache;
pub use chunking::{Chunker, HeadingChunker, PageChunker};
pub use cohere::{CohereEmbedder, CohereGenerator};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::{EmbeddingMode, EmbeddingProvider};
pub use error::{RagError, Result};
pub use inmemory::InMemoryCorpusStore;
pub use persona::{CorpusHandle, PersonaRegistry};
pub use pipeline::{
    AskPipeline, AskPipelineBuilder, AskRequest, IngestFailure, IngestReport, IngestStage,
};
pub use store::{cosine_similarity, CorpusStore, InsertFailure, InsertReport};
pub use supabase::SupabaseCorpusStore;
pub use synthesis::{
    Answer, AnswerSynthesizer, GenerationParams, GenerationProvider, SourceRef,
};
