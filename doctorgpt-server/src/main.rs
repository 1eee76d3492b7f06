use doctorgpt_server::{AppState, ServerConfig, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let state = AppState::from_env()?;
    run_server(ServerConfig::from_env(), state).await
}
