use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cardworks::config;
use cardworks::database::setup_database;
use cardworks::exporter::WkHtmlToImage;
use cardworks::generator::{ArkClient, LlmService, SimulatedLlm};
use cardworks::scraper::JinaReader;
use cardworks::{setup_router, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let llm: Arc<dyn LlmService> = if cfg.llm_enabled() {
        info!(model = %cfg.llm.model, "using chat-completions backend");
        Arc::new(ArkClient::from_config(&cfg)?)
    } else {
        warn!("no LLM API key configured, generation is simulated");
        Arc::new(SimulatedLlm)
    };
    let fetcher = Arc::new(JinaReader::from_config(&cfg)?);
    let renderer = WkHtmlToImage::new(cfg.export.renderer.clone(), cfg.export.default_width);
    if let Err(err) = renderer.ensure_available().await {
        warn!(%err, "image export will fail until the renderer is installed");
    }

    let pool = setup_database(&cfg.server.database_url).await?;

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("invalid server.host / server.port")?;

    let state = AppState {
        pool,
        config: Arc::new(cfg),
        llm,
        fetcher,
        renderer: Arc::new(renderer),
    };
    let app = setup_router(state);

    info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
