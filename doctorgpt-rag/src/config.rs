use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Tunable parameters for the ask pipeline.
///
/// Defaults match the production Doctor GPT deployment: 1024-dimensional
/// Cohere embeddings, five retrieved chunks per question, and 750-token
/// page chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Embedding dimensionality every vector in a corpus must have.
    pub dimensions: usize,
    /// Number of chunks retrieved per question when the request does not
    /// override it.
    pub top_k: usize,
    /// Chunks whose trimmed text is this many characters or fewer are
    /// dropped during chunking.
    pub min_chunk_chars: usize,
    /// Token budget per chunk for paginated sources.
    pub max_chunk_tokens: usize,
    /// Number of chunk texts sent per embedding request during ingestion.
    pub embed_batch_size: usize,
    /// Length of the source preview attached to answers, in characters.
    pub preview_chars: usize,
    /// Maximum number of answers kept in the in-process cache.
    pub cache_capacity: usize,
    /// Sampling temperature passed to the generation provider.
    pub temperature: f32,
    /// Completion token limit passed to the generation provider.
    pub max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dimensions: 1024,
            top_k: 5,
            min_chunk_chars: 50,
            max_chunk_tokens: 750,
            embed_batch_size: 10,
            preview_chars: 120,
            cache_capacity: 256,
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

impl PipelineConfig {
    /// Creates a builder seeded with the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.config.dimensions = dimensions;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn min_chunk_chars(mut self, chars: usize) -> Self {
        self.config.min_chunk_chars = chars;
        self
    }

    pub fn max_chunk_tokens(mut self, tokens: usize) -> Self {
        self.config.max_chunk_tokens = tokens;
        self
    }

    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.config.preview_chars = chars;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<PipelineConfig> {
        if self.config.dimensions == 0 {
            return Err(RagError::Config("dimensions must be greater than 0".into()));
        }
        if self.config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than 0".into()));
        }
        if self.config.max_chunk_tokens == 0 {
            return Err(RagError::Config("max_chunk_tokens must be greater than 0".into()));
        }
        if self.config.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than 0".into()));
        }
        if self.config.cache_capacity == 0 {
            return Err(RagError::Config("cache_capacity must be greater than 0".into()));
        }
        if self.config.temperature < 0.0 {
            return Err(RagError::Config("temperature must not be negative".into()));
        }
        if self.config.max_tokens == 0 {
            return Err(RagError::Config("max_tokens must be greater than 0".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_deployment() {
        let config = PipelineConfig::default();
        assert_eq!(config.dimensions, 1024);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.min_chunk_chars, 50);
        assert_eq!(config.max_chunk_tokens, 750);
        assert_eq!(config.embed_batch_size, 10);
        assert_eq!(config.cache_capacity, 256);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = PipelineConfig::builder()
            .dimensions(768)
            .top_k(3)
            .temperature(0.0)
            .build()
            .unwrap();
        assert_eq!(config.dimensions, 768);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.temperature, 0.0);
    }

    #[test]
    fn builder_rejects_zero_top_k() {
        let result = PipelineConfig::builder().top_k(0).build();
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn builder_rejects_zero_dimensions() {
        let result = PipelineConfig::builder().dimensions(0).build();
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn builder_rejects_negative_temperature() {
        let result = PipelineConfig::builder().temperature(-0.1).build();
        assert!(matches!(result, Err(RagError::Config(_))));
    }
}
