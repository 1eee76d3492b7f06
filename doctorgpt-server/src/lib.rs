//! HTTP surface for the Doctor GPT RAG API.
//!
//! Exposes the ask pipeline over three routes: a welcome message at `/`,
//! a health probe at `/health`, and the question endpoint at `POST /ask`.
//! Served questions and answers are appended to a plain-text query log.

pub mod log;
pub mod server;

pub use log::QueryLog;
pub use server::{app_router, run_server, AppState, ServerConfig};
