//! Command-line launcher for Doctor GPT: serve the HTTP API or ingest
//! documents into a persona's corpus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};

use doctorgpt_rag::{
    AskPipeline, CohereEmbedder, CohereGenerator, Document, HeadingChunker, InMemoryCorpusStore,
    PageChunker, PersonaRegistry, PipelineConfig, SupabaseCorpusStore,
};
use doctorgpt_server::{AppState, ServerConfig, run_server};

#[derive(Parser)]
#[command(name = "doctorgpt")]
#[command(about = "Doctor GPT: retrieval-augmented question answering over curated corpora")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Bind address; DOCTORGPT_HOST or 127.0.0.1 when omitted
        #[arg(long)]
        host: Option<String>,

        /// Bind port; DOCTORGPT_PORT or 8000 when omitted
        #[arg(long)]
        port: Option<u16>,
    },

    /// Chunk, embed, and upload a document into a persona's corpus
    Ingest {
        /// Markdown file, or a .json array of extracted page texts
        #[arg(long)]
        file: PathBuf,

        /// Persona whose corpus receives the chunks
        #[arg(long, default_value = "sinclair")]
        persona: String,

        /// Corpus store backend
        #[arg(long, value_enum, default_value_t = StoreBackend::Supabase)]
        store: StoreBackend,

        /// Create the persona's collection before uploading
        #[arg(long)]
        create_collection: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Ephemeral in-process store, for dry runs
    Memory,
    /// Supabase with pgvector, the production backend
    Supabase,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { host, port } => serve(host, port).await,
        Command::Ingest { file, persona, store, create_collection } => {
            ingest(&file, &persona, store, create_collection).await
        }
    }
}

async fn serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_env();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    let state = AppState::from_env()?;
    run_server(config, state).await
}

async fn ingest(
    file: &Path,
    persona: &str,
    backend: StoreBackend,
    create_collection: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig::default();
    let document = load_document(file, persona)
        .with_context(|| format!("failed to load {}", file.display()))?;

    let mut builder = AskPipeline::builder()
        .config(config.clone())
        .embedder(Arc::new(CohereEmbedder::from_env()?))
        .generator(Arc::new(CohereGenerator::from_env()?))
        .personas(PersonaRegistry::new([persona])?);
    builder = match source_kind(file) {
        SourceKind::Pages => builder.chunker(Arc::new(PageChunker::new(
            config.max_chunk_tokens,
            config.min_chunk_chars,
        ))),
        SourceKind::Markdown => {
            builder.chunker(Arc::new(HeadingChunker::new(config.min_chunk_chars)))
        }
    };
    let pipeline = match backend {
        StoreBackend::Memory => builder.store(Arc::new(InMemoryCorpusStore::new())).build()?,
        StoreBackend::Supabase => {
            builder.store(Arc::new(SupabaseCorpusStore::from_env()?)).build()?
        }
    };

    // The in-memory store starts empty, so it always needs its collection.
    if create_collection || backend == StoreBackend::Memory {
        pipeline.create_collection(persona).await?;
    }

    let report = pipeline.ingest(&document).await?;
    if report.chunk_count == 0 {
        println!("No chunks parsed from {}.", file.display());
        return Ok(());
    }

    println!(
        "{} of {} chunks uploaded to the {persona} corpus.",
        report.inserted, report.chunk_count
    );
    for failure in &report.failures {
        println!("  {} [{}]: {}", failure.chunk_id, failure.stage, failure.message);
    }
    if report.inserted == 0 {
        bail!("no chunks were uploaded");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Markdown,
    Pages,
}

fn source_kind(file: &Path) -> SourceKind {
    match file.extension().and_then(|e| e.to_str()) {
        Some("json") => SourceKind::Pages,
        _ => SourceKind::Markdown,
    }
}

fn document_id(file: &Path) -> String {
    file.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document")
        .to_string()
}

fn load_document(file: &Path, persona: &str) -> anyhow::Result<Document> {
    let raw = std::fs::read_to_string(file)?;
    let id = document_id(file);
    match source_kind(file) {
        SourceKind::Pages => {
            let pages: Vec<String> =
                serde_json::from_str(&raw).context("expected a JSON array of page strings")?;
            Ok(Document::paginated(id, persona, pages))
        }
        SourceKind::Markdown => Ok(Document::markdown(id, persona, raw)),
    }
}
