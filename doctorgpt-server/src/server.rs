use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use doctorgpt_rag::{
    Answer, AskPipeline, AskRequest, CohereEmbedder, CohereGenerator, PersonaRegistry,
    PipelineConfig, RagError, SupabaseCorpusStore,
};

use crate::log::QueryLog;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AskPipeline>,
    pub query_log: Option<Arc<QueryLog>>,
}

impl AppState {
    /// Creates state around a pipeline, with no query log.
    pub fn new(pipeline: Arc<AskPipeline>) -> Self {
        Self {
            pipeline,
            query_log: None,
        }
    }

    /// Attaches a query log appended to after every served question.
    pub fn with_query_log(mut self, log: QueryLog) -> Self {
        self.query_log = Some(Arc::new(log));
        self
    }

    /// Builds the production pipeline from the environment: Cohere
    /// embedding and chat providers, the Supabase corpus store, personas
    /// from `DOCTORGPT_PERSONAS` (comma-separated, default "sinclair"),
    /// and the query log at `DOCTORGPT_QUERY_LOG` (default
    /// `query_log.txt`; set it empty to disable).
    pub fn from_env() -> doctorgpt_rag::Result<Self> {
        let personas = match std::env::var("DOCTORGPT_PERSONAS") {
            Ok(raw) => PersonaRegistry::new(
                raw.split(',').map(str::trim).filter(|name| !name.is_empty()),
            )?,
            Err(_) => PersonaRegistry::default(),
        };
        let pipeline = AskPipeline::builder()
            .config(PipelineConfig::default())
            .embedder(Arc::new(CohereEmbedder::from_env()?))
            .generator(Arc::new(CohereGenerator::from_env()?))
            .store(Arc::new(SupabaseCorpusStore::from_env()?))
            .personas(personas)
            .build()?;

        let state = Self::new(Arc::new(pipeline));
        let log_path = std::env::var("DOCTORGPT_QUERY_LOG")
            .unwrap_or_else(|_| "query_log.txt".to_string());
        if log_path.is_empty() {
            Ok(state)
        } else {
            Ok(state.with_query_log(QueryLog::new(log_path)))
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Reads `DOCTORGPT_HOST` and `DOCTORGPT_PORT`, keeping the defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("DOCTORGPT_HOST").unwrap_or(defaults.host),
            port: std::env::var("DOCTORGPT_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// Request body for `POST /ask`.
#[derive(Debug, Deserialize)]
pub struct AskBody {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    doctor: Option<String>,
}

/// Error body for failed requests.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    detail: String,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route("/ask", post(ask))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for the Doctor GPT server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("doctorgpt listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn welcome() -> impl IntoResponse {
    Json(json!({"message": "Welcome to the Doctor GPT RAG API!"}))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<Answer>, (StatusCode, Json<ErrorBody>)> {
    let request = AskRequest {
        question: body.question,
        top_k: body.top_k,
        persona: body.doctor,
    };
    let answer = state.pipeline.ask(&request).await.map_err(error_response)?;

    if let Some(log) = &state.query_log {
        let doctor = request
            .persona
            .as_deref()
            .unwrap_or_else(|| state.pipeline.personas().default_persona());
        // The log is a debugging aid; a failed append never fails the request.
        if let Err(e) = log.append(doctor, &request.question, &answer.answer).await {
            error!(error = %e, path = %log.path().display(), "query log append failed");
        }
    }

    Ok(Json(answer))
}

/// Client mistakes are 400s, everything else is a 500; either way the
/// body is `{"detail": "<message>"}`.
fn error_response(err: RagError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { detail: err.to_string() }))
}
