//! Local card state mirrored from the API and persisted to a JSON file.
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::client::{ApiClient, DEFAULT_API_ENDPOINT};
use crate::models::{Card, CardPatch, CardTemplate, ImageFormat, NewCard};

pub const DEFAULT_MAX_CARD_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub api_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ark_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jina_api_key: Option<String>,
    /// Upper bound on `htmlContent`, in bytes.
    pub max_card_size: usize,
    /// File extensions the client offers for export.
    pub supported_formats: Vec<String>,
    pub default_template: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            ark_api_key: None,
            jina_api_key: None,
            max_card_size: DEFAULT_MAX_CARD_SIZE,
            supported_formats: vec!["png".into(), "jpg".into(), "pdf".into()],
            default_template: "modern-card".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `CARDWORKS_API`, `ARK_API_KEY` and `JINA_API_KEY`.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();
        if let Some(endpoint) = var("CARDWORKS_API") {
            cfg.api_endpoint = endpoint;
        }
        cfg.ark_api_key = var("ARK_API_KEY");
        cfg.jina_api_key = var("JINA_API_KEY");
        cfg
    }

    pub fn supports(&self, format: ImageFormat) -> bool {
        let ext = format.extension();
        self.supported_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(ext) || (ext == "jpg" && f.eq_ignore_ascii_case("jpeg")))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardState {
    pub cards: Vec<Card>,
    pub templates: Vec<CardTemplate>,
    pub current_card: Option<Card>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// The part of [`CardState`] that survives restarts.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Persisted {
    #[serde(default)]
    cards: Vec<Card>,
    #[serde(default)]
    templates: Vec<CardTemplate>,
}

#[derive(Debug)]
pub struct CardStore {
    state: CardState,
    config: AppConfig,
    client: ApiClient,
    path: Option<PathBuf>,
}

impl CardStore {
    /// In-memory store; nothing is written to disk.
    pub fn new(client: ApiClient, config: AppConfig) -> Self {
        Self {
            state: CardState::default(),
            config,
            client,
            path: None,
        }
    }

    /// Store backed by `path`; previously saved cards and templates are restored.
    /// An unreadable file is logged and ignored.
    pub fn open(path: impl Into<PathBuf>, client: ApiClient, config: AppConfig) -> Self {
        let path = path.into();
        let mut store = Self::new(client, config);
        match load_persisted(&path) {
            Ok(Some(saved)) => {
                info!(path = %path.display(), cards = saved.cards.len(), "card store restored");
                store.state.cards = saved.cards;
                store.state.templates = saved.templates;
            }
            Ok(None) => {}
            Err(err) => warn!(?err, path = %path.display(), "ignoring unreadable card store"),
        }
        store.path = Some(path);
        store
    }

    pub fn state(&self) -> &CardState {
        &self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn set_cards(&mut self, cards: Vec<Card>) {
        self.state.cards = cards;
        self.persist();
    }

    pub fn set_templates(&mut self, templates: Vec<CardTemplate>) {
        self.state.templates = templates;
        self.persist();
    }

    pub fn set_current_card(&mut self, card: Option<Card>) {
        self.state.current_card = card;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.state.is_loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.state.error = error;
    }

    pub fn find(&self, id: &str) -> Option<&Card> {
        self.state.cards.iter().find(|c| c.id == id)
    }

    fn begin(&mut self) {
        self.state.is_loading = true;
        self.state.error = None;
    }

    fn fail(&mut self, action: &str, err: anyhow::Error) {
        error!(?err, action, "card store action failed");
        self.state.error = Some(format!("{}: {}", action, err));
        self.state.is_loading = false;
    }

    pub async fn load_cards(&mut self) -> bool {
        self.begin();
        match self.client.try_get_cards().await {
            Ok(cards) => {
                self.state.is_loading = false;
                self.set_cards(cards);
                true
            }
            Err(err) => {
                self.fail("failed to load cards", err);
                false
            }
        }
    }

    pub async fn load_templates(&mut self) -> bool {
        self.begin();
        match self.client.try_get_templates().await {
            Ok(templates) => {
                self.state.is_loading = false;
                self.set_templates(templates);
                true
            }
            Err(err) => {
                self.fail("failed to load templates", err);
                false
            }
        }
    }

    pub async fn create_card(&mut self, input: NewCard) -> Option<Card> {
        if input.html_content.len() > self.config.max_card_size {
            let msg = format!(
                "card HTML is {} bytes, the limit is {}",
                input.html_content.len(),
                self.config.max_card_size
            );
            warn!(%msg, "card rejected");
            self.state.error = Some(msg);
            return None;
        }
        self.begin();
        match self.client.try_create_card(&input).await {
            Ok(card) => {
                self.state.cards.insert(0, card.clone());
                self.state.current_card = Some(card.clone());
                self.state.is_loading = false;
                self.persist();
                Some(card)
            }
            Err(err) => {
                self.fail("failed to create card", err);
                None
            }
        }
    }

    pub async fn update_card(&mut self, id: &str, patch: CardPatch) -> Option<Card> {
        self.begin();
        match self.client.try_update_card(id, &patch).await {
            Ok(card) => {
                if let Some(slot) = self.state.cards.iter_mut().find(|c| c.id == card.id) {
                    *slot = card.clone();
                }
                self.state.current_card = Some(card.clone());
                self.state.is_loading = false;
                self.persist();
                Some(card)
            }
            Err(err) => {
                self.fail("failed to update card", err);
                None
            }
        }
    }

    pub async fn delete_card(&mut self, id: &str) -> bool {
        self.begin();
        match self.client.try_delete_card(id).await {
            Ok(()) => {
                self.state.cards.retain(|c| c.id != id);
                if self.state.current_card.as_ref().map_or(false, |c| c.id == id) {
                    self.state.current_card = None;
                }
                self.state.is_loading = false;
                self.persist();
                true
            }
            Err(err) => {
                self.fail("failed to delete card", err);
                false
            }
        }
    }

    pub async fn fork_card(&mut self, id: &str) -> Option<Card> {
        self.begin();
        match self.client.try_fork_card(id).await {
            Ok(card) => {
                self.state.cards.insert(0, card.clone());
                self.state.is_loading = false;
                self.persist();
                Some(card)
            }
            Err(err) => {
                self.fail("failed to fork card", err);
                None
            }
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        if let Err(err) = save_persisted(path, &self.state) {
            error!(?err, path = %path.display(), "failed to persist card store");
        }
    }
}

fn load_persisted(path: &Path) -> anyhow::Result<Option<Persisted>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let saved = serde_json::from_str(&raw).context("invalid card store file")?;
    Ok(Some(saved))
}

/// Write through a sibling temp file so a crash never leaves a torn file.
fn save_persisted(path: &Path, state: &CardState) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct View<'a> {
        cards: &'a [Card],
        templates: &'a [CardTemplate],
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let body = serde_json::to_vec_pretty(&View {
        cards: &state.cards,
        templates: &state.templates,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn card(id: &str) -> Card {
        let now = Utc::now();
        Card {
            id: id.into(),
            title: format!("card {}", id),
            content: String::new(),
            html_content: "<p>x</p>".into(),
            image_url: None,
            tags: vec![],
            author: None,
            category: None,
            forked_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn offline_client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9").unwrap()
    }

    #[test]
    fn cards_and_templates_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/cards.json");
        let mut store = CardStore::open(&path, offline_client(), AppConfig::default());
        store.set_cards(vec![card("a"), card("b")]);
        store.set_current_card(Some(card("a")));
        store.set_error(Some("boom".into()));

        let reopened = CardStore::open(&path, offline_client(), AppConfig::default());
        let ids: Vec<&str> = reopened.state().cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        // transient fields are not persisted
        assert!(reopened.state().current_card.is_none());
        assert!(reopened.state().error.is_none());
    }

    #[test]
    fn default_formats() {
        let config = AppConfig::default();
        assert_eq!(config.supported_formats, vec!["png", "jpg", "pdf"]);
        assert!(config.supports(ImageFormat::Png));
        assert!(config.supports(ImageFormat::Jpeg));

        let png_only = AppConfig {
            supported_formats: vec!["PNG".into()],
            ..Default::default()
        };
        assert!(!png_only.supports(ImageFormat::Jpeg));
        let jpeg_spelling = AppConfig {
            supported_formats: vec!["jpeg".into()],
            ..Default::default()
        };
        assert!(jpeg_spelling.supports(ImageFormat::Jpeg));
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = CardStore::open(&path, offline_client(), AppConfig::default());
        assert!(store.state().cards.is_empty());
    }

    #[tokio::test]
    async fn oversized_card_is_rejected_without_request() {
        let config = AppConfig {
            max_card_size: 8,
            ..Default::default()
        };
        let mut store = CardStore::new(offline_client(), config);
        let created = store
            .create_card(NewCard {
                title: "big".into(),
                html_content: "<p>0123456789</p>".into(),
                ..Default::default()
            })
            .await;
        assert!(created.is_none());
        assert!(store.state().error.as_deref().unwrap().contains("limit is 8"));
        assert!(!store.state().is_loading);
    }

    #[tokio::test]
    async fn failed_request_sets_error() {
        let mut store = CardStore::new(offline_client(), AppConfig::default());
        store.set_cards(vec![card("a")]);
        assert!(!store.delete_card("a").await);
        assert!(store.state().error.is_some());
        assert!(!store.state().is_loading);
        assert_eq!(store.state().cards.len(), 1);
    }
}
