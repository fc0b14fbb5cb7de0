//! HTTP client for the card REST API.
//!
//! The plain methods log failures and degrade to an empty or failure-shaped
//! value; the `try_*` variants hand the error back. There are no retries.
use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::{Client, Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::models::{
    AiGenerationRequest, AiGenerationResponse, Card, CardPatch, CardTemplate, ImageExportRequest,
    ImageExportResponse, NewCard, TuneRequest, TuneResponse, WebScrapingRequest,
    WebScrapingResponse,
};

pub const DEFAULT_API_ENDPOINT: &str = "http://localhost:8081";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn card_path(id: &str, suffix: &str) -> String {
    format!("cards/{}{}", urlencoding::encode(id), suffix)
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("invalid API endpoint: {}", base_url))?;
        let http = Client::builder()
            .user_agent("cardworks-client/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build API http client")?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        debug!(%method, %url, "api request");
        let mut req = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.with_context(|| format!("{} {} failed", method, url))?;
        let status = resp.status();
        debug!(%status, %url, "api response");
        if !status.is_success() {
            let detail = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or_else(|| status.to_string());
            return Err(anyhow!("{} {}: {}", method, url.path(), detail));
        }
        resp.json::<T>().await.context("invalid response body")
    }

    async fn request_status(&self, method: Method, path: &str) -> anyhow::Result<()> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        debug!(%method, %url, "api request");
        let resp = self.http.request(method.clone(), url.clone()).send().await?;
        let status = resp.status();
        debug!(%status, %url, "api response");
        if !status.is_success() {
            return Err(anyhow!("{} {}: {}", method, url.path(), status));
        }
        Ok(())
    }

    pub async fn try_get_cards(&self) -> anyhow::Result<Vec<Card>> {
        self.request::<(), _>(Method::GET, "cards", None).await
    }

    pub async fn try_create_card(&self, card: &NewCard) -> anyhow::Result<Card> {
        self.request(Method::POST, "cards", Some(card)).await
    }

    pub async fn try_update_card(&self, id: &str, patch: &CardPatch) -> anyhow::Result<Card> {
        self.request(Method::PUT, &card_path(id, ""), Some(patch)).await
    }

    pub async fn try_delete_card(&self, id: &str) -> anyhow::Result<()> {
        self.request_status(Method::DELETE, &card_path(id, "")).await
    }

    pub async fn try_fork_card(&self, id: &str) -> anyhow::Result<Card> {
        self.request::<(), _>(Method::POST, &card_path(id, "/fork"), None).await
    }

    pub async fn try_get_templates(&self) -> anyhow::Result<Vec<CardTemplate>> {
        self.request::<(), _>(Method::GET, "templates", None).await
    }

    pub async fn get_cards(&self) -> Vec<Card> {
        self.try_get_cards().await.unwrap_or_else(|err| {
            error!(?err, "failed to fetch cards");
            Vec::new()
        })
    }

    pub async fn create_card(&self, card: &NewCard) -> Option<Card> {
        self.try_create_card(card)
            .await
            .map_err(|err| error!(?err, "failed to create card"))
            .ok()
    }

    pub async fn update_card(&self, id: &str, patch: &CardPatch) -> Option<Card> {
        self.try_update_card(id, patch)
            .await
            .map_err(|err| error!(?err, %id, "failed to update card"))
            .ok()
    }

    pub async fn delete_card(&self, id: &str) -> bool {
        self.try_delete_card(id)
            .await
            .map_err(|err| error!(?err, %id, "failed to delete card"))
            .is_ok()
    }

    pub async fn fork_card(&self, id: &str) -> Option<Card> {
        self.try_fork_card(id)
            .await
            .map_err(|err| error!(?err, %id, "failed to fork card"))
            .ok()
    }

    pub async fn get_templates(&self) -> Vec<CardTemplate> {
        self.try_get_templates().await.unwrap_or_else(|err| {
            error!(?err, "failed to fetch templates");
            Vec::new()
        })
    }

    pub async fn generate_content(&self, req: &AiGenerationRequest) -> AiGenerationResponse {
        self.request(Method::POST, "ai/generate", Some(req))
            .await
            .unwrap_or_else(|err| {
                error!(?err, "AI generation request failed");
                AiGenerationResponse::failure(err.to_string())
            })
    }

    pub async fn scrape_website(&self, req: &WebScrapingRequest) -> WebScrapingResponse {
        self.request(Method::POST, "scrape/website", Some(req))
            .await
            .unwrap_or_else(|err| {
                error!(?err, "scrape request failed");
                WebScrapingResponse::failure(err.to_string())
            })
    }

    pub async fn export_image(&self, req: &ImageExportRequest) -> ImageExportResponse {
        self.request(Method::POST, "export/image", Some(req))
            .await
            .unwrap_or_else(|err| {
                error!(?err, "image export request failed");
                ImageExportResponse::failure(err.to_string())
            })
    }

    pub async fn tune(&self, req: &TuneRequest) -> TuneResponse {
        self.request(Method::POST, "ai/tune", Some(req))
            .await
            .unwrap_or_else(|err| {
                error!(?err, "tune request failed");
                TuneResponse {
                    success: false,
                    html: req.html.clone(),
                    reply: err.to_string(),
                }
            })
    }

    /// Absolute URL for a path the server returned (e.g. an export image).
    pub fn resolve(&self, path: &str) -> Option<Url> {
        self.base_url.join(path.trim_start_matches('/')).ok()
    }

    pub async fn download(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let url = self
            .resolve(path)
            .ok_or_else(|| anyhow!("invalid download path: {}", path))?;
        let resp = self.http.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("GET {}: {}", url.path(), resp.status()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
