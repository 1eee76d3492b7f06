use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::persona::CorpusHandle;
use crate::store::{CorpusStore, InsertFailure, InsertReport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Supabase (PostgREST + pgvector) corpus store.
///
/// Each persona owns a `{persona}_chunks` table and a
/// `match_{persona}_chunks` stored function that runs the similarity
/// query server-side. Expected schema:
///
/// ```sql
/// create table sinclair_chunks (
///     id uuid primary key,
///     title text,
///     text text not null,
///     page integer,
///     sources jsonb not null default '[]',
///     embedding vector(1024)
/// );
/// ```
pub struct SupabaseCorpusStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    timeout: Duration,
}

impl SupabaseCorpusStore {
    /// Creates a store for the given Supabase project.
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            service_key: service_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a store from `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .map_err(|_| RagError::Config("SUPABASE_URL not set".to_string()))?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| RagError::Config("SUPABASE_SERVICE_ROLE_KEY not set".to_string()))?;
        if base_url.is_empty() || service_key.is_empty() {
            return Err(RagError::Config(
                "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must not be empty".to_string(),
            ));
        }
        Ok(Self::new(base_url, service_key))
    }

    /// Overrides the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .timeout(self.timeout)
    }

    async fn insert_row(
        &self,
        corpus: &CorpusHandle,
        chunk: &Chunk,
    ) -> std::result::Result<(), String> {
        let row = ChunkRow {
            id: &chunk.id,
            title: &chunk.title,
            text: &chunk.text,
            page: chunk.page,
            sources: &chunk.sources,
            embedding: &chunk.embedding,
        };
        let response = self
            .request(reqwest::Method::POST, &format!("/rest/v1/{}", corpus.table()))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("API error {status}: {body}"))
        }
    }
}

/// Extracts the total from a PostgREST `content-range` header
/// (`0-0/42`, or `*/0` for an empty table).
fn content_range_total(header: &str) -> Option<usize> {
    header.rsplit('/').next()?.parse().ok()
}

fn request_error(err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Timeout {
            service: "Supabase".to_string(),
        }
    } else {
        RagError::Store {
            backend: "supabase".to_string(),
            message: format!("request failed: {err}"),
        }
    }
}

#[async_trait]
impl CorpusStore for SupabaseCorpusStore {
    /// The table and its match function are provisioned with the database
    /// schema, so this only verifies the table answers. Dimensionality is
    /// fixed by the table's vector column.
    async fn create_collection(&self, corpus: &CorpusHandle, _dimensions: usize) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/rest/v1/{}?select=id&limit=1", corpus.table()),
            )
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RagError::Store {
            backend: "supabase".to_string(),
            message: format!(
                "table '{}' is not reachable: API error {status}: {body}",
                corpus.table()
            ),
        })
    }

    async fn insert(&self, corpus: &CorpusHandle, chunks: &[Chunk]) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        for chunk in chunks {
            match self.insert_row(corpus, chunk).await {
                Ok(()) => report.inserted += 1,
                Err(message) => {
                    tracing::warn!(chunk_id = %chunk.id, %message, "chunk insert failed");
                    report.failures.push(InsertFailure {
                        chunk_id: chunk.id.clone(),
                        message,
                    });
                }
            }
        }
        Ok(report)
    }

    async fn nearest(
        &self,
        corpus: &CorpusHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let request = MatchRequest {
            query_embedding: embedding,
            match_count: top_k,
        };
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/rest/v1/rpc/{}", corpus.match_function()),
            )
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Store {
                backend: "supabase".to_string(),
                message: format!("API error {status}: {body}"),
            });
        }

        let rows: Vec<MatchRow> = response.json().await.map_err(|e| RagError::Store {
            backend: "supabase".to_string(),
            message: format!("failed to decode match response: {e}"),
        })?;
        Ok(rows
            .into_iter()
            .map(|row| SearchResult {
                chunk: Chunk {
                    id: row.id,
                    persona: corpus.persona().to_string(),
                    title: row.title,
                    text: row.text,
                    page: row.page,
                    sources: Vec::new(),
                    embedding: Vec::new(),
                },
                score: row.similarity,
            })
            .collect())
    }

    async fn count(&self, corpus: &CorpusHandle) -> Result<usize> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/rest/v1/{}?select=id&limit=1", corpus.table()),
            )
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Store {
                backend: "supabase".to_string(),
                message: format!("API error {status}: {body}"),
            });
        }
        response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| RagError::Store {
                backend: "supabase".to_string(),
                message: "count response is missing a content-range total".to_string(),
            })
    }

    /// Clears every row in the persona's table. The table itself is
    /// schema-managed and stays in place.
    async fn delete_collection(&self, corpus: &CorpusHandle) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/rest/v1/{}?id=not.is.null", corpus.table()),
            )
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RagError::Store {
            backend: "supabase".to_string(),
            message: format!("API error {status}: {body}"),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChunkRow<'a> {
    id: &'a str,
    title: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    sources: &'a [String],
    embedding: &'a [f32],
}

#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    text: String,
    #[serde(default)]
    page: Option<u32>,
    similarity: f32,
}
