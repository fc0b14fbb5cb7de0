//! Web page scraping through a reader service that returns Markdown.
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::generator::{CompletionOptions, LlmService, SYSTEM_PROMPT_SUMMARIZE};
use crate::models::{
    ExtractionType, ScrapeMetadata, WebFetchResponse, WebScrapingRequest, WebScrapingResponse,
};

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> anyhow::Result<String>;
    fn is_configured(&self) -> bool;
}

/// Client for the Jina reader (`{endpoint}{url}` returns the page as Markdown).
#[derive(Clone)]
pub struct JinaReader {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for JinaReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinaReader")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl JinaReader {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("cardworks/0.1")
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build reader http client")?;
        Ok(Self {
            http,
            endpoint: cfg.scraper.endpoint.clone(),
            api_key: cfg.scraper.api_key.clone(),
        })
    }
}

#[async_trait]
impl PageFetcher for JinaReader {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url) -> anyhow::Result<String> {
        let target = format!("{}{}", self.endpoint, url);
        info!("fetching web content");
        let resp = self
            .http
            .get(&target)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("reader request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("reader returned {}", status));
        }
        resp.text().await.context("failed to read reader response")
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

pub fn parse_target_url(raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("a URL is required"));
    }
    let url = Url::parse(raw).with_context(|| format!("invalid URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("unsupported URL scheme: {}", other)),
    }
}

/// A reader reply split into its header title and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderPage {
    pub title: String,
    pub content: String,
}

pub fn parse_reader_page(raw: &str, url: &Url) -> ReaderPage {
    let header_title = raw
        .lines()
        .take_while(|l| !l.starts_with("Markdown Content:"))
        .find_map(|l| l.strip_prefix("Title:"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let content = match raw.find("Markdown Content:") {
        Some(idx) => raw[idx + "Markdown Content:".len()..].trim().to_string(),
        None => raw.trim().to_string(),
    };

    let title = header_title
        .or_else(|| {
            content
                .lines()
                .find_map(|l| l.strip_prefix("# "))
                .map(|t| t.trim().to_string())
        })
        .unwrap_or_else(|| url.host_str().unwrap_or("untitled").to_string());

    ReaderPage { title, content }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF)
}

/// CJK characters count one word each; other text splits on whitespace.
pub fn word_count(text: &str) -> usize {
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    let latin = text
        .split(|c: char| c.is_whitespace() || is_cjk(c))
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .count();
    cjk + latin
}

fn markdown_headings(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|l| {
            let trimmed = l.trim_start();
            let hashes = trimmed.chars().take_while(|c| *c == '#').count();
            if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
                Some(trimmed[hashes..].trim().to_string())
            } else {
                None
            }
        })
        .collect()
}

fn markdown_link_count(content: &str) -> usize {
    content.matches("](http").count()
}

pub async fn scrape_website(
    fetcher: &dyn PageFetcher,
    llm: &dyn LlmService,
    req: &WebScrapingRequest,
) -> WebScrapingResponse {
    let started = Instant::now();
    let url = match parse_target_url(&req.url) {
        Ok(url) => url,
        Err(err) => return WebScrapingResponse::failure(err.to_string()),
    };
    if !fetcher.is_configured() {
        error!("reader API key is not configured");
        return WebScrapingResponse::failure("reader API key is not configured");
    }

    let raw = match fetcher.fetch(&url).await {
        Ok(raw) => raw,
        Err(err) => {
            error!(?err, %url, "web scraping failed");
            return WebScrapingResponse::failure(format!("web scraping failed: {}", err));
        }
    };
    let page = parse_reader_page(&raw, &url);
    let words = word_count(&page.content);

    let mut resp = WebScrapingResponse {
        success: true,
        title: page.title.clone(),
        content: page.content.clone(),
        ..Default::default()
    };

    match req.extraction_type {
        ExtractionType::Content => {}
        ExtractionType::Summary => {
            let instruction = req
                .custom_prompt
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or("Summarize the following page concisely, keeping the key information:");
            let prompt = format!("{}\n\n# {}\n\n{}", instruction, page.title, page.content);
            match llm
                .complete(SYSTEM_PROMPT_SUMMARIZE, &prompt, &CompletionOptions::default())
                .await
            {
                Ok(c) => resp.summary = Some(c.text.trim().to_string()),
                Err(err) => {
                    error!(?err, "summary of scraped page failed");
                    return WebScrapingResponse {
                        error: Some(format!("summary generation failed: {}", err)),
                        success: false,
                        ..resp
                    };
                }
            }
        }
        ExtractionType::Structured => {
            resp.structured_data = Some(json!({
                "url": url.as_str(),
                "title": page.title,
                "headings": markdown_headings(&page.content),
                "links": markdown_link_count(&page.content),
                "wordCount": words,
            }));
        }
    }

    resp.metadata = Some(ScrapeMetadata {
        processing_time: started.elapsed().as_millis() as u64,
        word_count: words,
    });
    resp
}

/// Raw reader text for `POST /api/fetch-web`.
pub async fn fetch_web(fetcher: &dyn PageFetcher, raw_url: &str) -> WebFetchResponse {
    let failure = |message: String| WebFetchResponse {
        content: String::new(),
        success: false,
        message: Some(message),
    };
    let url = match parse_target_url(raw_url) {
        Ok(url) => url,
        Err(err) => return failure(err.to_string()),
    };
    if !fetcher.is_configured() {
        return failure("reader API key is not configured".into());
    }
    match fetcher.fetch(&url).await {
        Ok(content) => WebFetchResponse {
            content,
            success: true,
            message: None,
        },
        Err(err) => {
            error!(?err, %url, "fetching web content failed");
            failure(format!("fetching web content failed: {}", err))
        }
    }
}
