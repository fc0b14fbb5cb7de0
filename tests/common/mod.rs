#![allow(dead_code)]

use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use sqlx::SqlitePool;
use tempfile::TempDir;

use cardworks::config::Config;
use cardworks::database::setup_database;
use cardworks::exporter::ImageRenderer;
use cardworks::generator::{Completion, CompletionOptions, LlmService};
use cardworks::models::ImageExportOptions;
use cardworks::scraper::PageFetcher;
use cardworks::{setup_router, AppState};

/// Replies with a fenced HTML document echoing the last prompt line.
#[derive(Default)]
pub struct FakeLlm {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LlmService for FakeLlm {
    async fn complete(&self, system: &str, prompt: &str, _o: &CompletionOptions) -> anyhow::Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = prompt.lines().last().unwrap_or_default();
        let text = if system == cardworks::generator::SYSTEM_PROMPT_SUMMARIZE {
            format!("- summary of {}", last)
        } else {
            format!(
                "Here is your card:\n```html\n<html><body><h1>Fake card</h1><p>{}</p></body></html>\n```",
                last
            )
        };
        Ok(Completion { text, tokens: 42 })
    }
}

pub const READER_PAGE: &str =
    "Title: Example Domain\nURL Source: https://example.com/\n\nMarkdown Content:\n# Example Domain\n\nThis domain is for use in examples.";

pub struct FakeFetcher;

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, _url: &Url) -> anyhow::Result<String> {
        Ok(READER_PAGE.to_string())
    }

    fn is_configured(&self) -> bool {
        true
    }
}

pub fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

pub struct FakeRenderer;

#[async_trait]
impl ImageRenderer for FakeRenderer {
    async fn render(&self, _html: &Path, out: &Path, _o: &ImageExportOptions) -> anyhow::Result<()> {
        tokio::fs::write(out, tiny_png(800, 600)).await?;
        Ok(())
    }
}

pub struct TestServer {
    pub base: String,
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub llm: Arc<FakeLlm>,
    pub http: reqwest::Client,
    // keeps the database and output files alive for the test
    pub dir: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

pub async fn spawn() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.output_dir = dir.path().join("out").to_string_lossy().to_string();
    config.server.database_url = format!("sqlite://{}/test.db", dir.path().display());
    config.tuner.delay_ms = 0;
    config.ensure_dirs().unwrap();

    let pool = setup_database(&config.server.database_url).await.unwrap();
    let config = Arc::new(config);
    let llm = Arc::new(FakeLlm::default());
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        llm: llm.clone(),
        fetcher: Arc::new(FakeFetcher),
        renderer: Arc::new(FakeRenderer),
    };

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(setup_router(state).into_make_service());
    tokio::spawn(server);

    TestServer {
        base: format!("http://{}", addr),
        pool,
        config,
        llm,
        http: reqwest::Client::new(),
        dir,
    }
}
