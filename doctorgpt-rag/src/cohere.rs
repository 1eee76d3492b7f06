use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingMode, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::synthesis::{GenerationParams, GenerationProvider};

const COHERE_API_URL: &str = "https://api.cohere.ai/v1";
const DEFAULT_EMBED_MODEL: &str = "embed-english-v3.0";
const DEFAULT_EMBED_DIMENSIONS: usize = 1024;
const DEFAULT_CHAT_MODEL: &str = "command-r-plus";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const EMBED_SERVICE: &str = "Cohere embed";
const CHAT_SERVICE: &str = "Cohere chat";

/// Cohere embedding provider.
///
/// Uses the v1 embed endpoint with an explicit `input_type`, so queries
/// and corpus documents are encoded on the correct side of the
/// asymmetric model.
pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl CohereEmbedder {
    /// Creates a provider with the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: COHERE_API_URL.to_string(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            dimensions: DEFAULT_EMBED_DIMENSIONS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a provider from the `COHERE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COHERE_API_KEY")
            .map_err(|_| RagError::Config("COHERE_API_KEY not set".to_string()))?;
        if api_key.is_empty() {
            return Err(RagError::Config("COHERE_API_KEY is empty".to_string()));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API base URL.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Overrides the declared embedding dimensionality.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Overrides the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbedder {
    async fn embed(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            texts,
            model: &self.model,
            input_type: input_type(mode),
        };
        let response = self
            .client
            .post(format!("{}/embed", self.api_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(EMBED_SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamService {
                service: EMBED_SERVICE.to_string(),
                message: api_error_message(status, &body),
            });
        }

        let payload: EmbedResponse = response.json().await.map_err(|e| {
            RagError::UpstreamService {
                service: EMBED_SERVICE.to_string(),
                message: format!("failed to decode response: {e}"),
            }
        })?;
        if payload.embeddings.len() != texts.len() {
            return Err(RagError::UpstreamService {
                service: EMBED_SERVICE.to_string(),
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    payload.embeddings.len()
                ),
            });
        }
        Ok(payload.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cohere chat-completion provider.
pub struct CohereGenerator {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl CohereGenerator {
    /// Creates a provider with the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: COHERE_API_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a provider from the `COHERE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COHERE_API_KEY")
            .map_err(|_| RagError::Config("COHERE_API_KEY not set".to_string()))?;
        if api_key.is_empty() {
            return Err(RagError::Config("COHERE_API_KEY is empty".to_string()));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API base URL.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Overrides the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GenerationProvider for CohereGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            message: prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };
        let response = self
            .client
            .post(format!("{}/chat", self.api_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(CHAT_SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamService {
                service: CHAT_SERVICE.to_string(),
                message: api_error_message(status, &body),
            });
        }

        let payload: ChatResponse = response.json().await.map_err(|e| {
            RagError::UpstreamService {
                service: CHAT_SERVICE.to_string(),
                message: format!("failed to decode response: {e}"),
            }
        })?;
        Ok(payload.text)
    }
}

fn input_type(mode: EmbeddingMode) -> &'static str {
    match mode {
        EmbeddingMode::Query => "search_query",
        EmbeddingMode::Document => "search_document",
    }
}

fn request_error(service: &str, err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Timeout {
            service: service.to_string(),
        }
    } else {
        RagError::UpstreamService {
            service: service.to_string(),
            message: format!("request failed: {err}"),
        }
    }
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => format!("API error {status}: {}", parsed.message),
        Err(_) => format!("API error {status}: {body}"),
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [&'a str],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    message: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
