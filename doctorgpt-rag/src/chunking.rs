use std::sync::LazyLock;

use regex::Regex;
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::document::{Chunk, Document};

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\(([^)]+)\)").expect("link pattern is valid"));

static TOKENIZER: LazyLock<CoreBPE> =
    LazyLock::new(|| cl100k_base().expect("cl100k_base tokenizer loads"));

/// Counts tokens under the cl100k_base encoding.
pub fn count_tokens(text: &str) -> usize {
    TOKENIZER.encode_ordinary(text).len()
}

/// Splits documents into chunks.
pub trait Chunker: Send + Sync {
    /// Chunk a document into pieces suitable for embedding.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Chunker for markdown sources.
///
/// Sections start at level 1-3 headings; text before the first heading
/// becomes an implicit "Introduction" section. Each blank-line-separated
/// paragraph within a section becomes one chunk, titled with the section
/// heading. Paragraphs at or below the minimum length are dropped.
#[derive(Debug, Clone)]
pub struct HeadingChunker {
    min_chars: usize,
}

impl HeadingChunker {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl Default for HeadingChunker {
    fn default() -> Self {
        Self { min_chars: 50 }
    }
}

impl Chunker for HeadingChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.pages.join("\n\n");
        let mut chunks = Vec::new();
        for section in parse_sections(&text) {
            for paragraph in section.body.split("\n\n") {
                let trimmed = paragraph.trim();
                if trimmed.chars().count() <= self.min_chars {
                    continue;
                }
                chunks.push(
                    Chunk::new(&document.persona, &section.title, trimmed)
                        .with_sources(extract_links(trimmed)),
                );
            }
        }
        chunks
    }
}

/// Chunker for paginated sources such as extracted PDF text.
///
/// Accumulates whitespace-delimited words per page until the token budget
/// is crossed, then flushes the buffer as one chunk. Chunks are titled
/// with the document id and tagged with their one-based page number.
#[derive(Debug, Clone)]
pub struct PageChunker {
    max_tokens: usize,
    min_chars: usize,
}

impl PageChunker {
    pub fn new(max_tokens: usize, min_chars: usize) -> Self {
        Self { max_tokens, min_chars }
    }
}

impl Default for PageChunker {
    fn default() -> Self {
        Self {
            max_tokens: 750,
            min_chars: 50,
        }
    }
}

impl Chunker for PageChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (index, page) in document.pages.iter().enumerate() {
            let page_no = (index + 1) as u32;
            for piece in split_by_tokens(page, self.max_tokens) {
                let trimmed = piece.trim();
                if trimmed.chars().count() <= self.min_chars {
                    continue;
                }
                chunks.push(
                    Chunk::new(&document.persona, &document.id, trimmed)
                        .with_page(page_no)
                        .with_sources(extract_links(trimmed)),
                );
            }
        }
        chunks
    }
}

struct Section {
    title: String,
    body: String,
}

/// Walks lines, opening a new section at every level 1-3 heading. A chunk
/// flushed at a heading keeps the previous section's title.
fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title = String::from("Introduction");
    let mut body: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(heading) = heading_title(line) {
            if !body.is_empty() {
                sections.push(Section {
                    title: title.clone(),
                    body: body.join("\n"),
                });
                body.clear();
            }
            title = heading.to_string();
        } else {
            body.push(line);
        }
    }
    if !body.is_empty() {
        sections.push(Section {
            title,
            body: body.join("\n"),
        });
    }
    sections
}

/// Returns the heading title when the line is a level 1-3 ATX heading.
fn heading_title(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 3 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim())
}

/// Accumulates words until the running token count crosses the budget,
/// then flushes. The word that crosses the budget stays in the flushed
/// piece, so a piece may exceed the budget by one word. Token counts are
/// accumulated per word with its joining space, which tracks the
/// full-buffer encoding closely enough for budgeting.
fn split_by_tokens(text: &str, max_tokens: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut tokens = 0usize;
    for word in text.split_whitespace() {
        if current.is_empty() {
            tokens = count_tokens(word);
            current.push_str(word);
        } else {
            tokens += TOKENIZER.encode_ordinary(&format!(" {word}")).len();
            current.push(' ');
            current.push_str(word);
        }
        if tokens > max_tokens {
            pieces.push(std::mem::take(&mut current));
            tokens = 0;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Extracts inline link targets (`[label](target)`) from chunk text.
fn extract_links(text: &str) -> Vec<String> {
    LINK_RE
        .captures_iter(text)
        .map(|captures| captures[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markdown(text: &str) -> Document {
        Document::markdown("notes", "sinclair", text)
    }

    #[test]
    fn splits_sections_into_titled_chunks() {
        let doc = markdown(
            "# Intro\nHello world this is a long enough paragraph to count as a chunk for testing purposes.\n\n# Details\nAnother section with sufficiently long text to pass the minimum length filter as well.",
        );
        let chunks = HeadingChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title, "Intro");
        assert!(chunks[0].text.starts_with("Hello world"));
        assert_eq!(chunks[1].title, "Details");
        assert_eq!(chunks[0].persona, "sinclair");
        assert_eq!(chunks[0].page, None);
    }

    #[test]
    fn preamble_becomes_introduction_section() {
        let doc = markdown(
            "This paragraph appears before any heading and is comfortably past fifty characters.\n\n# Later\nshort",
        );
        let chunks = HeadingChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "Introduction");
    }

    #[test]
    fn drops_paragraphs_at_or_below_minimum_length() {
        let at_limit = "x".repeat(50);
        let past_limit = "y".repeat(51);
        let doc = markdown(&format!("# Size\n{at_limit}\n\n{past_limit}"));
        let chunks = HeadingChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, past_limit);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunks = HeadingChunker::default().chunk(&markdown(""));
        assert!(chunks.is_empty());
    }

    #[test]
    fn deep_headings_stay_in_the_body() {
        let doc = markdown(
            "# Top\n#### Not a section boundary, this line is part of the paragraph body instead.",
        );
        let chunks = HeadingChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "Top");
        assert!(chunks[0].text.contains("#### Not a section boundary"));
    }

    #[test]
    fn multiple_paragraphs_share_the_section_title() {
        let doc = markdown(
            "# Protocol\nFirst paragraph with enough characters to clear the minimum length bar.\n\nSecond paragraph, also long enough to clear the minimum length bar easily.",
        );
        let chunks = HeadingChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.title == "Protocol"));
    }

    #[test]
    fn collects_inline_link_targets() {
        let doc = markdown(
            "# Refs\nSee [the trial](https://example.org/trial) and [notes](paper.pdf) for the full details behind this claim.",
        );
        let chunks = HeadingChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].sources,
            vec!["https://example.org/trial".to_string(), "paper.pdf".to_string()]
        );
    }

    #[test]
    fn page_chunker_tags_one_based_pages() {
        let doc = Document::paginated(
            "lifespan",
            "sinclair",
            vec![
                "Page one body text that is long enough to survive the minimum length filter.".into(),
                "Page two body text that is long enough to survive the minimum length filter.".into(),
            ],
        );
        let chunks = PageChunker::default().chunk(&doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[1].page, Some(2));
        assert!(chunks.iter().all(|c| c.title == "lifespan"));
    }

    #[test]
    fn page_chunker_splits_on_token_budget_without_losing_words() {
        let words: Vec<String> = (0..40).map(|i| format!("word{i:02}")).collect();
        let page = words.join(" ");
        let doc = Document::paginated("book", "sinclair", vec![page.clone()]);
        let chunks = PageChunker::new(10, 5).chunk(&doc);
        assert!(chunks.len() > 1);
        let rejoined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, page);
    }

    #[test]
    fn token_counts_use_cl100k_base() {
        assert_eq!(count_tokens("hello world"), 2);
        assert_eq!(count_tokens(""), 0);
    }
}
