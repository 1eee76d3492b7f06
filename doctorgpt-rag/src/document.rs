use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A source document before chunking.
///
/// Markdown sources carry a single page; extracted PDF text carries one
/// entry per physical page so chunk provenance survives chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, typically the source file stem.
    pub id: String,
    /// Persona (doctor) whose corpus this document belongs to.
    pub persona: String,
    /// Page texts in reading order. Markdown documents have exactly one.
    pub pages: Vec<String>,
}

impl Document {
    /// Wraps a markdown source as a single-page document.
    pub fn markdown(id: impl Into<String>, persona: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            persona: persona.into(),
            pages: vec![text.into()],
        }
    }

    /// Wraps pre-extracted page texts, one entry per physical page.
    pub fn paginated(id: impl Into<String>, persona: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            id: id.into(),
            persona: persona.into(),
            pages,
        }
    }
}

/// A chunk of a document, the unit of storage and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier.
    pub id: String,
    /// Persona (doctor) whose corpus this chunk belongs to.
    pub persona: String,
    /// Section heading or document id the chunk came from.
    pub title: String,
    /// Verbatim text of the chunk.
    pub text: String,
    /// One-based page number for paginated sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Link targets referenced inside the chunk text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Embedding vector, empty until the chunk has been embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Creates a chunk with a fresh id and no embedding.
    pub fn new(persona: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            persona: persona.into(),
            title: title.into(),
            text: text.into(),
            page: None,
            sources: Vec::new(),
            embedding: Vec::new(),
        }
    }

    /// Sets the one-based page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the link targets extracted from the chunk text.
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the embedding vector.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matching chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query, higher is more similar.
    pub score: f32,
}
