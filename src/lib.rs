pub mod client;
pub mod config;
pub mod database;
pub mod editor;
pub mod error;
pub mod exporter;
pub mod generator;
pub mod handlers;
pub mod models;
pub mod scraper;
pub mod showcase;
pub mod store;
pub mod toast;
pub mod tuner;
pub mod utils;
pub mod views;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::exporter::ImageRenderer;
use crate::generator::LlmService;
use crate::scraper::PageFetcher;

pub use crate::error::{AppError, Result};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmService>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub renderer: Arc<dyn ImageRenderer>,
}

pub fn setup_router(state: AppState) -> Router {
    Router::new()
        // pages
        .route("/", get(handlers::handle_home_request))
        .route("/dashboard", get(handlers::handle_dashboard_request))
        .route("/create", get(handlers::handle_create_request))
        .route("/create/generate", post(handlers::handle_generate_form))
        .route("/create/scrape", post(handlers::handle_scrape_form))
        .route("/create/paste", post(handlers::handle_paste_form))
        .route("/view/:id", get(handlers::handle_view_request))
        .route("/view/:id/delete", post(handlers::handle_delete_form))
        .route("/view/:id/fork", post(handlers::handle_fork_form))
        .route("/view/:id/tune", post(handlers::handle_tune_form))
        .route("/view/:id/export", post(handlers::handle_export_form))
        .route("/showcase", get(handlers::handle_showcase_page))
        .route("/showcase/like/:id", post(handlers::handle_like_form))
        // REST
        .route(
            "/cards",
            get(handlers::list_cards).post(handlers::create_card),
        )
        .route(
            "/cards/:id",
            get(handlers::get_card)
                .put(handlers::update_card)
                .delete(handlers::delete_card),
        )
        .route("/cards/:id/fork", post(handlers::fork_card))
        .route("/templates", get(handlers::list_templates))
        .route("/showcase/cards", get(handlers::list_showcase))
        .route("/showcase/cards/:id", get(handlers::get_showcase_card))
        .route("/showcase/cards/:id/like", post(handlers::like_showcase_card))
        .route("/ai/generate", post(handlers::generate_content))
        .route("/ai/tune", post(handlers::tune_html))
        .route("/scrape/website", post(handlers::scrape_website))
        .route("/export/image", post(handlers::export_image))
        .route("/editor/apply", post(handlers::apply_editor_commands))
        .route("/exports/:file", get(handlers::download_export))
        // endpoints kept compatible with the single-page generator
        .route("/api/generate", post(handlers::generate_files))
        .route("/api/download-html/:file_id", get(handlers::download_html))
        .route("/api/summarize", post(handlers::summarize_content))
        .route("/api/fetch-web", post(handlers::fetch_web_content))
        .fallback(|| async { utils::handle_404() })
        .with_state(state)
}
