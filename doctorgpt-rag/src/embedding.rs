use async_trait::async_trait;

use crate::error::{RagError, Result};

/// How embedded text will be used.
///
/// Asymmetric embedding models encode questions and corpus passages
/// differently; every call site must say which side it is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// The text is a question to retrieve with.
    Query,
    /// The text is corpus content being indexed.
    Document,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts under the given mode, one vector per text
    /// in input order.
    async fn embed(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single question for retrieval.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text], EmbeddingMode::Query).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::UpstreamService {
                service: "embedding".into(),
                message: "provider returned no vectors".into(),
            })
    }

    /// Dimensionality of the vectors this provider produces.
    fn dimensions(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed(&self, _texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
            Ok(self.vectors.clone())
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn embed_query_returns_first_vector() {
        let provider = FixedProvider {
            vectors: vec![vec![1.0, 0.0, 0.0]],
        };
        let vector = provider.embed_query("what is nmn").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn embed_query_rejects_empty_response() {
        let provider = FixedProvider { vectors: vec![] };
        let err = provider.embed_query("what is nmn").await.unwrap_err();
        assert!(matches!(err, RagError::UpstreamService { .. }));
    }
}
