use clap::Parser;
use doctorgpt_cli::{Cli, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    run(Cli::parse()).await
}
