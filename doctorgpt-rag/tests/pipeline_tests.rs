//! End-to-end tests for the ask pipeline against mock providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use doctorgpt_rag::{
    AskPipeline, AskRequest, Chunk, CorpusHandle, CorpusStore, Document, EmbeddingMode,
    EmbeddingProvider, GenerationParams, GenerationProvider, InMemoryCorpusStore, IngestStage,
    InsertFailure, InsertReport, PersonaRegistry, PipelineConfig, RagError, Result, SearchResult,
};

const DIM: usize = 8;

/// Deterministic hash-based embeddings, normalized so cosine similarity of
/// a text with itself is 1.
fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let hash = text
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let mut embedding = vec![0.0f32; dimensions];
    for (i, value) in embedding.iter_mut().enumerate() {
        *value = ((hash.wrapping_add(i as u64)) as f32).sin();
    }
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= norm);
    }
    embedding
}

struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_embedding(t, DIM)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Declares the configured dimensionality but returns shorter vectors,
/// like an embedding service configured with the wrong model.
struct WrongLengthEmbedder;

#[async_trait]
impl EmbeddingProvider for WrongLengthEmbedder {
    async fn embed(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embedding(t, DIM / 2)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Fails any batch containing the `[flaky]` marker.
struct FlakyEmbedder;

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("[flaky]")) {
            return Err(RagError::UpstreamService {
                service: "Cohere embed".into(),
                message: "rate limited".into(),
            });
        }
        Ok(texts.iter().map(|t| hash_embedding(t, DIM)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

struct CannedGenerator {
    calls: AtomicUsize,
    answer: String,
}

impl CannedGenerator {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: answer.to_string(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for CannedGenerator {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// Wraps the in-memory store and counts nearest-neighbour calls, so tests
/// can assert that validation fires before any store traffic.
struct CountingStore {
    inner: InMemoryCorpusStore,
    nearest_calls: AtomicUsize,
}

impl CountingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryCorpusStore::new(),
            nearest_calls: AtomicUsize::new(0),
        })
    }

    fn nearest_calls(&self) -> usize {
        self.nearest_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorpusStore for CountingStore {
    async fn create_collection(&self, corpus: &CorpusHandle, dimensions: usize) -> Result<()> {
        self.inner.create_collection(corpus, dimensions).await
    }

    async fn insert(&self, corpus: &CorpusHandle, chunks: &[Chunk]) -> Result<InsertReport> {
        self.inner.insert(corpus, chunks).await
    }

    async fn nearest(
        &self,
        corpus: &CorpusHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.nearest_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.nearest(corpus, embedding, top_k).await
    }

    async fn count(&self, corpus: &CorpusHandle) -> Result<usize> {
        self.inner.count(corpus).await
    }

    async fn delete_collection(&self, corpus: &CorpusHandle) -> Result<()> {
        self.inner.delete_collection(corpus).await
    }
}

/// Delegates to the in-memory store but rejects chunks whose text carries
/// the `[reject]` marker, mimicking per-record store failures.
struct RejectingStore {
    inner: InMemoryCorpusStore,
}

impl RejectingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self { inner: InMemoryCorpusStore::new() })
    }
}

#[async_trait]
impl CorpusStore for RejectingStore {
    async fn create_collection(&self, corpus: &CorpusHandle, dimensions: usize) -> Result<()> {
        self.inner.create_collection(corpus, dimensions).await
    }

    async fn insert(&self, corpus: &CorpusHandle, chunks: &[Chunk]) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        for chunk in chunks {
            if chunk.text.contains("[reject]") {
                report.failures.push(InsertFailure {
                    chunk_id: chunk.id.clone(),
                    message: "duplicate key".into(),
                });
                continue;
            }
            let partial = self.inner.insert(corpus, std::slice::from_ref(chunk)).await?;
            report.inserted += partial.inserted;
            report.failures.extend(partial.failures);
        }
        Ok(report)
    }

    async fn nearest(
        &self,
        corpus: &CorpusHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.inner.nearest(corpus, embedding, top_k).await
    }

    async fn count(&self, corpus: &CorpusHandle) -> Result<usize> {
        self.inner.count(corpus).await
    }

    async fn delete_collection(&self, corpus: &CorpusHandle) -> Result<()> {
        self.inner.delete_collection(corpus).await
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig::builder()
        .dimensions(DIM)
        .top_k(3)
        .embed_batch_size(1)
        .build()
        .expect("test config is valid")
}

fn build_pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CorpusStore>,
    generator: Arc<dyn GenerationProvider>,
) -> AskPipeline {
    AskPipeline::builder()
        .config(test_config())
        .embedder(embedder)
        .store(store)
        .generator(generator)
        .personas(PersonaRegistry::default())
        .build()
        .expect("pipeline builds")
}

fn corpus_handle() -> CorpusHandle {
    PersonaRegistry::default().resolve("sinclair").unwrap().clone()
}

async fn seed_chunk(store: &dyn CorpusStore, text: &str, page: Option<u32>) -> Chunk {
    let corpus = corpus_handle();
    let mut chunk = Chunk::new("sinclair", "Notes", text)
        .with_embedding(hash_embedding(text, DIM));
    chunk.page = page;
    let report = store.insert(&corpus, std::slice::from_ref(&chunk)).await.unwrap();
    assert_eq!(report.inserted, 1);
    chunk
}

#[tokio::test]
async fn ask_answers_with_page_cited_sources() {
    let embedder = HashEmbedder::new();
    let generator = CannedGenerator::new("NMN raises NAD+ levels (see page 12).");
    let store = Arc::new(InMemoryCorpusStore::new());
    store.create_collection(&corpus_handle(), DIM).await.unwrap();
    seed_chunk(
        store.as_ref(),
        "NMN supplementation raised NAD+ levels in the trial cohort over twelve weeks.",
        Some(12),
    )
    .await;
    seed_chunk(
        store.as_ref(),
        "Resveratrol activates sirtuins in combination with a high-fat carrier meal.",
        None,
    )
    .await;

    let pipeline = build_pipeline(embedder, store, generator);
    let answer = pipeline
        .ask(&AskRequest::new("What about NMN?").with_top_k(3))
        .await
        .unwrap();

    assert!(!answer.answer.is_empty());
    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources.iter().any(|s| s.page == Some(12)));
    assert!(answer.sources.iter().all(|s| !s.text.is_empty()));
}

#[tokio::test]
async fn repeated_question_is_served_from_cache() {
    let embedder = HashEmbedder::new();
    let generator = CannedGenerator::new("Cached answer.");
    let store = Arc::new(InMemoryCorpusStore::new());
    store.create_collection(&corpus_handle(), DIM).await.unwrap();
    seed_chunk(
        store.as_ref(),
        "NAD+ precursors decline with age according to the referenced rodent studies.",
        Some(3),
    )
    .await;

    let pipeline = build_pipeline(embedder.clone(), store, generator.clone());
    let request = AskRequest::new("Does NAD+ decline with age?");

    let first = pipeline.ask(&request).await.unwrap();
    assert_eq!(embedder.calls(), 1);
    assert_eq!(generator.calls(), 1);

    let second = pipeline.ask(&request).await.unwrap();
    assert_eq!(first, second);
    // No further upstream calls after the cache hit.
    assert_eq!(embedder.calls(), 1);
    assert_eq!(generator.calls(), 1);
    assert_eq!(pipeline.cache().len(), 1);
}

#[tokio::test]
async fn different_personas_do_not_share_cache_entries() {
    let embedder = HashEmbedder::new();
    let generator = CannedGenerator::new("Answer.");
    let store = Arc::new(InMemoryCorpusStore::new());
    let personas = PersonaRegistry::new(["sinclair", "attia"]).unwrap();
    for persona in ["sinclair", "attia"] {
        let corpus = personas.resolve(persona).unwrap();
        store.create_collection(corpus, DIM).await.unwrap();
    }

    let pipeline = AskPipeline::builder()
        .config(test_config())
        .embedder(embedder)
        .store(store)
        .generator(generator.clone())
        .personas(personas)
        .build()
        .unwrap();

    let question = "What about zone 2 training?";
    pipeline.ask(&AskRequest::new(question)).await.unwrap();
    pipeline
        .ask(&AskRequest::new(question).with_persona("attia"))
        .await
        .unwrap();
    assert_eq!(generator.calls(), 2);
    assert_eq!(pipeline.cache().len(), 2);
}

#[tokio::test]
async fn dimension_mismatch_is_rejected_before_the_store_is_queried() {
    let store = CountingStore::new();
    store.create_collection(&corpus_handle(), DIM).await.unwrap();
    let pipeline = build_pipeline(
        Arc::new(WrongLengthEmbedder),
        store.clone(),
        CannedGenerator::new("unused"),
    );

    let err = pipeline
        .ask(&AskRequest::new("What about NMN?"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
    assert!(err.to_string().contains("4 dimensions"));
    assert_eq!(store.nearest_calls(), 0);
}

#[tokio::test]
async fn inserted_chunk_is_its_own_nearest_neighbour() {
    let store = Arc::new(InMemoryCorpusStore::new());
    store.create_collection(&corpus_handle(), DIM).await.unwrap();
    let text = "Fasting for sixteen hours activates autophagy pathways in the liver.";
    let chunk = seed_chunk(store.as_ref(), text, None).await;

    let pipeline = build_pipeline(
        HashEmbedder::new(),
        store,
        CannedGenerator::new("unused"),
    );
    let results = pipeline.retrieve(text, "sinclair", 1).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, chunk.id);
    assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn retrieve_is_bounded_and_sorted() {
    let store = Arc::new(InMemoryCorpusStore::new());
    store.create_collection(&corpus_handle(), DIM).await.unwrap();
    for i in 0..5 {
        seed_chunk(
            store.as_ref(),
            &format!("Corpus paragraph number {i} about longevity interventions and trials."),
            None,
        )
        .await;
    }

    let pipeline = build_pipeline(
        HashEmbedder::new(),
        store,
        CannedGenerator::new("unused"),
    );
    let results = pipeline
        .retrieve("What do the trials say?", "sinclair", 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for window in results.windows(2) {
        assert!(window[0].score >= window[1].score);
    }
}

#[tokio::test]
async fn blank_question_zero_top_k_and_unknown_persona_are_validation_errors() {
    let store = CountingStore::new();
    let embedder = HashEmbedder::new();
    let pipeline = build_pipeline(embedder.clone(), store.clone(), CannedGenerator::new("unused"));

    let err = pipeline.ask(&AskRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = pipeline
        .ask(&AskRequest::new("What about NMN?").with_top_k(0))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = pipeline
        .ask(&AskRequest::new("What about NMN?").with_persona("unknown"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    // None of the rejected requests did any upstream work.
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.nearest_calls(), 0);
}

#[tokio::test]
async fn generation_failures_are_not_cached() {
    struct FailingGenerator;

    #[async_trait]
    impl GenerationProvider for FailingGenerator {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
            Err(RagError::UpstreamService {
                service: "Cohere chat".into(),
                message: "model overloaded".into(),
            })
        }
    }

    let store = Arc::new(InMemoryCorpusStore::new());
    store.create_collection(&corpus_handle(), DIM).await.unwrap();
    let pipeline = build_pipeline(HashEmbedder::new(), store, Arc::new(FailingGenerator));

    let err = pipeline
        .ask(&AskRequest::new("What about NMN?"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::UpstreamService { .. }));
    assert!(pipeline.cache().is_empty());
}

#[tokio::test]
async fn ingest_uploads_every_chunk_of_a_markdown_document() {
    let store = Arc::new(InMemoryCorpusStore::new());
    let embedder = HashEmbedder::new();
    let pipeline = build_pipeline(embedder.clone(), store, CannedGenerator::new("unused"));
    pipeline.create_collection("sinclair").await.unwrap();

    let document = Document::markdown(
        "protocol",
        "sinclair",
        "# Intro\nHello world this is a long enough paragraph to count as a chunk for testing purposes.\n\n# Details\nAnother section with sufficiently long text to pass the minimum length filter as well.",
    );
    let report = pipeline.ingest(&document).await.unwrap();

    assert_eq!(report.chunk_count, 2);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.inserted, 2);
    assert!(report.is_complete());
    // embed_batch_size is 1 in the test config, one call per chunk.
    assert_eq!(embedder.calls(), 2);
    assert_eq!(pipeline.corpus_size("sinclair").await.unwrap(), 2);
}

#[tokio::test]
async fn ingest_of_an_empty_document_reports_zero_chunks() {
    let embedder = HashEmbedder::new();
    let pipeline = build_pipeline(
        embedder.clone(),
        Arc::new(InMemoryCorpusStore::new()),
        CannedGenerator::new("unused"),
    );

    let report = pipeline
        .ingest(&Document::markdown("empty", "sinclair", ""))
        .await
        .unwrap();
    assert_eq!(report.chunk_count, 0);
    assert_eq!(report.inserted, 0);
    assert!(report.is_complete());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn deleting_a_collection_supports_wholesale_reingest() {
    let store = Arc::new(InMemoryCorpusStore::new());
    let pipeline = build_pipeline(HashEmbedder::new(), store, CannedGenerator::new("unused"));
    pipeline.create_collection("sinclair").await.unwrap();

    let first = Document::markdown(
        "protocol",
        "sinclair",
        "# Intro\nThe first revision of the protocol document with enough text to form a chunk.\n\n# Details\nA second section of the first revision, also long enough to survive the filter.",
    );
    pipeline.ingest(&first).await.unwrap();
    assert_eq!(pipeline.corpus_size("sinclair").await.unwrap(), 2);

    pipeline.delete_collection("sinclair").await.unwrap();
    pipeline.create_collection("sinclair").await.unwrap();
    assert_eq!(pipeline.corpus_size("sinclair").await.unwrap(), 0);

    let second = Document::markdown(
        "protocol",
        "sinclair",
        "# Intro\nThe replacement revision carries a single section long enough to form one chunk.",
    );
    pipeline.ingest(&second).await.unwrap();
    // Only the replacement revision remains after the re-ingest.
    assert_eq!(pipeline.corpus_size("sinclair").await.unwrap(), 1);
}

#[tokio::test]
async fn failed_embedding_batches_are_recorded_per_chunk_and_skipped() {
    let store = Arc::new(InMemoryCorpusStore::new());
    let pipeline = build_pipeline(
        Arc::new(FlakyEmbedder),
        store,
        CannedGenerator::new("unused"),
    );
    pipeline.create_collection("sinclair").await.unwrap();

    let document = Document::markdown(
        "notes",
        "sinclair",
        "# Section\nFirst paragraph long enough to clear the fifty character minimum easily.\n\nSecond paragraph [flaky] also long enough to clear the minimum length bar here.\n\nThird paragraph, again comfortably past the fifty character minimum threshold.",
    );
    let report = pipeline.ingest(&document).await.unwrap();

    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, IngestStage::Embed);
    assert!(report.failures[0].message.contains("rate limited"));
    assert_eq!(pipeline.corpus_size("sinclair").await.unwrap(), 2);
}

#[tokio::test]
async fn rejected_inserts_are_recorded_and_do_not_block_the_batch() {
    let store = RejectingStore::new();
    let pipeline = build_pipeline(
        HashEmbedder::new(),
        store,
        CannedGenerator::new("unused"),
    );
    pipeline.create_collection("sinclair").await.unwrap();

    let document = Document::markdown(
        "notes",
        "sinclair",
        "# Section\nFirst paragraph long enough to clear the fifty character minimum easily.\n\nSecond paragraph [reject] also long enough to clear the minimum length bar.\n\nThird paragraph, again comfortably past the fifty character minimum threshold.",
    );
    let report = pipeline.ingest(&document).await.unwrap();

    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.embedded, 3);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, IngestStage::Insert);
    assert_eq!(report.failures[0].message, "duplicate key");
    assert_eq!(pipeline.corpus_size("sinclair").await.unwrap(), 2);
}
