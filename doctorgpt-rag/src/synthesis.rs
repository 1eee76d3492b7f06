use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::SearchResult;
use crate::error::Result;

/// A synthesized answer with the retrieved chunks that informed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text.
    pub answer: String,
    /// One entry per retrieved chunk, in rank order.
    pub sources: Vec<SourceRef>,
}

/// Provenance of one retrieved chunk, shortened for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// One-based page number, when the chunk came from a paginated source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Preview of the chunk text.
    pub text: String,
}

/// Sampling parameters passed to the generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

/// Trait for text generation providers.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Completes the prompt and returns the generated text.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Builds the persona prompt from retrieved chunks and produces the final
/// answer with source previews.
pub struct AnswerSynthesizer {
    provider: Arc<dyn GenerationProvider>,
    params: GenerationParams,
    preview_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        params: GenerationParams,
        preview_chars: usize,
    ) -> Self {
        Self {
            provider,
            params,
            preview_chars,
        }
    }

    /// Generates an answer for the question from the retrieved chunks.
    ///
    /// Zero retrieved chunks is not an error; the model sees an empty
    /// CONTEXT block and answers from the persona framing alone.
    pub async fn synthesize(
        &self,
        question: &str,
        persona: &str,
        results: &[SearchResult],
    ) -> Result<Answer> {
        let context = build_context(results);
        let prompt = build_prompt(persona, &context, question);
        tracing::debug!(
            persona,
            retrieved = results.len(),
            prompt_chars = prompt.len(),
            "generating answer"
        );
        let text = self.provider.generate(&prompt, &self.params).await?;
        let sources = results
            .iter()
            .map(|result| SourceRef {
                page: result.chunk.page,
                text: preview(&result.chunk.text, self.preview_chars),
            })
            .collect();
        Ok(Answer {
            answer: text,
            sources,
        })
    }
}

/// Joins retrieved chunks with blank lines, prefixing paged chunks with
/// their page number so the model can cite it.
fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| match result.chunk.page {
            Some(page) => format!("(Page {page})\n{}", result.chunk.text),
            None => result.chunk.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(persona: &str, context: &str, question: &str) -> String {
    format!(
        "You are Dr. {name}, a world-renowned expert in health and wellness. \
         Use the CONTEXT below to answer the QUESTION. Cite the page number when possible.\n\n\
         CONTEXT:\n{context}\n\nQUESTION:\n{question}\n\nANSWER:",
        name = capitalize(persona),
    )
}

fn capitalize(persona: &str) -> String {
    let mut chars = persona.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Truncates to the preview length on a character boundary; the ellipsis
/// is only appended when something was cut.
fn preview(text: &str, max_chars: usize) -> String {
    let mut shortened: String = text.chars().take(max_chars).collect();
    if shortened.len() < text.len() {
        shortened.push_str("...");
    }
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::error::RagError;

    fn result(text: &str, page: Option<u32>) -> SearchResult {
        let mut chunk = Chunk::new("sinclair", "Intro", text);
        chunk.page = page;
        SearchResult { chunk, score: 0.9 }
    }

    struct EchoProvider;

    #[async_trait]
    impl GenerationProvider for EchoProvider {
        async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl GenerationProvider for FailingProvider {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
            Err(RagError::UpstreamService {
                service: "Cohere chat".into(),
                message: "boom".into(),
            })
        }
    }

    #[test]
    fn context_prefixes_page_numbers() {
        let results = vec![result("NMN raises NAD levels.", Some(12)), result("General text.", None)];
        let context = build_context(&results);
        assert_eq!(context, "(Page 12)\nNMN raises NAD levels.\n\nGeneral text.");
    }

    #[test]
    fn prompt_frames_the_persona() {
        let prompt = build_prompt("sinclair", "(Page 1)\nText.", "What is NMN?");
        assert!(prompt.starts_with("You are Dr. Sinclair, a world-renowned expert"));
        assert!(prompt.contains("CONTEXT:\n(Page 1)\nText."));
        assert!(prompt.contains("QUESTION:\nWhat is NMN?"));
        assert!(prompt.ends_with("ANSWER:"));
    }

    #[test]
    fn preview_truncates_only_when_needed() {
        assert_eq!(preview("short", 120), "short");
        let long = "z".repeat(150);
        let shortened = preview(&long, 120);
        assert_eq!(shortened.chars().count(), 123);
        assert!(shortened.ends_with("..."));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "héllo wörld";
        let shortened = preview(text, 4);
        assert_eq!(shortened, "héll...");
    }

    #[tokio::test]
    async fn synthesize_collects_sources_in_rank_order() {
        let synthesizer = AnswerSynthesizer::new(
            Arc::new(EchoProvider),
            GenerationParams::default(),
            120,
        );
        let results = vec![result("First chunk.", Some(12)), result("Second chunk.", None)];
        let answer = synthesizer
            .synthesize("What is NMN?", "sinclair", &results)
            .await
            .unwrap();
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].page, Some(12));
        assert_eq!(answer.sources[0].text, "First chunk.");
        assert_eq!(answer.sources[1].page, None);
    }

    #[tokio::test]
    async fn synthesize_propagates_provider_errors() {
        let synthesizer = AnswerSynthesizer::new(
            Arc::new(FailingProvider),
            GenerationParams::default(),
            120,
        );
        let err = synthesizer
            .synthesize("What is NMN?", "sinclair", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UpstreamService { .. }));
    }
}
