use std::time::Duration;

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use maud::Markup;
use tracing::{info, warn};

use crate::editor::{self, EditRequest, EditResponse};
use crate::models::{
    AiGenerationRequest, AiGenerationResponse, Card, CardPatch, CardTemplate, ExportInput,
    GenerationRequest, GenerationResponseData, ImageExportOptions, ImageFormat, ImageExportRequest,
    ImageExportResponse, NewCard, PasteInput, PromptInput, ScrapeInput, ShowcaseCard,
    ShowcaseQuery, SummarizeRequest, SummarizeResponse, TuneInput, TuneRequest, TuneResponse,
    WebFetchRequest, WebFetchResponse, WebScrapingRequest, WebScrapingResponse,
};
use crate::toast::Toast;
use crate::tuner::FineTuner;
use crate::utils::{
    clean, convert_markdown_to_html, create_htmx_redirect_response, extract_title_from_html,
    generate_qr_svg, handle_404, html_to_plain_text, is_safe_file_id, truncate_chars,
};
use crate::{database, exporter, generator, scraper, showcase, views, AppError, AppState, Result};

const PREVIEW_CHARS: usize = 160;
const FALLBACK_TEMPLATE: &str = "modern-card";

fn page(markup: Markup) -> Html<String> {
    Html(markup.into_string())
}

/// Toast fragment that htmx appends to `#toasts`, whatever the form targeted.
fn toast(t: Toast) -> Response {
    (
        [("hx-retarget", "#toasts"), ("hx-reswap", "beforeend")],
        Html(views::create_toast_fragment(&t).into_string()),
    )
        .into_response()
}

/// Turn a not-found lookup into the 404 page; other errors propagate.
fn or_404(result: Result<Html<String>>) -> Result<Response> {
    match result {
        Ok(html) => Ok(html.into_response()),
        Err(AppError::NotFound(what)) => {
            info!(%what, "page lookup missed");
            Ok(handle_404().into_response())
        }
        Err(err) => Err(err),
    }
}

/// Page forms report a missing card as an error toast.
fn or_toast(result: Result<Response>) -> Result<Response> {
    match result {
        Err(AppError::NotFound(what)) => {
            info!(%what, "form target missing");
            let description = format!("{} not found", what);
            Ok(toast(Toast::error("Card not found").with_description(description)))
        }
        other => other,
    }
}

fn card_from_html(title: Option<&str>, html: String, fallback_title: &str, category: &str) -> NewCard {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| extract_title_from_html(&html).map(html_to_plain_text))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| truncate_chars(fallback_title.trim(), 40));
    NewCard {
        title,
        content: truncate_chars(&html_to_plain_text(&html), PREVIEW_CHARS),
        html_content: html,
        category: Some(category.to_string()),
        ..Default::default()
    }
}

async fn optional_template(state: &AppState, id: Option<&str>) -> Option<CardTemplate> {
    let id = id.map(str::trim).filter(|t| !t.is_empty())?;
    match database::get_template(&state.pool, id).await {
        Ok(t) => Some(t),
        Err(err) => {
            warn!(%id, %err, "template unavailable, generating without it");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// pages

pub async fn handle_home_request(State(state): State<AppState>) -> Result<Html<String>> {
    let all = database::list_showcase(&state.pool).await?;
    let featured: Vec<ShowcaseCard> = showcase::filter_and_sort(all, &ShowcaseQuery::default())
        .into_iter()
        .take(3)
        .collect();
    Ok(page(views::create_home_page(&featured)))
}

pub async fn handle_dashboard_request(State(state): State<AppState>) -> Result<Html<String>> {
    let cards = database::list_cards(&state.pool).await?;
    Ok(page(views::create_dashboard_page(&cards)))
}

pub async fn handle_create_request(State(state): State<AppState>) -> Result<Html<String>> {
    let templates = database::list_templates(&state.pool).await?;
    Ok(page(views::create_create_page(&templates)))
}

pub async fn handle_generate_form(
    State(state): State<AppState>,
    Form(input): Form<PromptInput>,
) -> Result<Response> {
    if input.prompt.trim().is_empty() {
        return Ok(toast(Toast::warning("Please describe the card first")).into_response());
    }
    let template = optional_template(&state, input.template.as_deref()).await;
    let req = AiGenerationRequest {
        prompt: input.prompt.clone(),
        template: input.template,
        style: input.style,
        language: input.language,
    };
    let resp = generator::generate_content(&*state.llm, &req, template.as_ref()).await;
    if !resp.success {
        let reason = resp.error.unwrap_or_default();
        return Ok(toast(Toast::error("Generation failed").with_description(reason)).into_response());
    }

    let card = database::insert_card(
        &state.pool,
        card_from_html(None, resp.html_content, &input.prompt, "ai"),
    )
    .await?;
    Ok(create_htmx_redirect_response(&format!("/view/{}", card.id)).into_response())
}

pub async fn handle_scrape_form(
    State(state): State<AppState>,
    Form(input): Form<ScrapeInput>,
) -> Result<Response> {
    if input.url.trim().is_empty() {
        return Ok(toast(Toast::warning("Please enter a URL")).into_response());
    }
    let req = WebScrapingRequest {
        url: input.url.trim().to_string(),
        extraction_type: input.extraction_type.unwrap_or_default(),
        custom_prompt: None,
    };
    let resp = scraper::scrape_website(&*state.fetcher, &*state.llm, &req).await;
    if !resp.success {
        let reason = resp.error.unwrap_or_default();
        return Ok(toast(Toast::error("Scraping failed").with_description(reason)).into_response());
    }

    let markdown = resp.summary.as_deref().unwrap_or(&resp.content);
    let body = convert_markdown_to_html(markdown);
    let html = match optional_template(&state, Some(FALLBACK_TEMPLATE)).await {
        Some(t) => t.render(&html_escape::encode_text(&resp.title), &body),
        None => body,
    };
    let mut new_card = card_from_html(Some(resp.title.as_str()), html, &req.url, "scraped");
    new_card.tags = vec!["web".to_string()];
    let card = database::insert_card(&state.pool, new_card).await?;
    Ok(create_htmx_redirect_response(&format!("/view/{}", card.id)).into_response())
}

pub async fn handle_paste_form(
    State(state): State<AppState>,
    Form(input): Form<PasteInput>,
) -> Result<Response> {
    let sanitized = clean(&input.html);
    if sanitized.trim().is_empty() {
        return Ok(toast(
            Toast::warning("Nothing to save").with_description("Paste some HTML first"),
        )
        .into_response());
    }
    let card = database::insert_card(
        &state.pool,
        card_from_html(input.title.as_deref(), sanitized, "Pasted card", "pasted"),
    )
    .await?;
    Ok(create_htmx_redirect_response(&format!("/view/{}", card.id)).into_response())
}

pub async fn handle_view_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    or_404(render_card_page(&state, &id).await)
}

async fn render_card_page(state: &AppState, id: &str) -> Result<Html<String>> {
    let card = database::get_card(&state.pool, id).await?;
    let public_url = &state.config.server.public_url;
    let share_url = format!("{}/view/{}", public_url.trim_end_matches('/'), card.id);
    let qr = generate_qr_svg(public_url, &card.id);
    Ok(page(views::create_card_page(&card, qr.as_deref(), &share_url)))
}

pub async fn handle_delete_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    if !database::delete_card(&state.pool, &id).await? {
        return Ok(toast(Toast::error("Card not found")).into_response());
    }
    Ok(create_htmx_redirect_response("/dashboard").into_response())
}

pub async fn handle_fork_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    or_toast(fork_from_page(&state, &id).await)
}

async fn fork_from_page(state: &AppState, id: &str) -> Result<Response> {
    let card = database::fork_card(&state.pool, id).await?;
    Ok(create_htmx_redirect_response(&format!("/view/{}", card.id)).into_response())
}

pub async fn handle_tune_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(input): Form<TuneInput>,
) -> Result<Response> {
    or_toast(tune_from_page(&state, &id, &input.prompt).await)
}

async fn tune_from_page(state: &AppState, id: &str, prompt: &str) -> Result<Response> {
    let card = database::get_card(&state.pool, id).await?;
    let mut tuner = FineTuner::new(
        card.html_content,
        Duration::from_millis(state.config.tuner.delay_ms),
    );
    if tuner.tune(prompt).await.is_none() {
        return Ok(toast(Toast::warning("Describe the change you want")).into_response());
    }
    let patch = CardPatch {
        html_content: Some(tuner.into_html()),
        ..Default::default()
    };
    database::update_card(&state.pool, id, patch).await?;
    Ok(create_htmx_redirect_response(&format!("/view/{}", id)).into_response())
}

pub async fn handle_export_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(input): Form<ExportInput>,
) -> Result<Response> {
    or_toast(export_from_page(&state, &id, input.format).await)
}

async fn export_from_page(state: &AppState, id: &str, format: ImageFormat) -> Result<Response> {
    let card = database::get_card(&state.pool, id).await?;
    let options = ImageExportOptions {
        format,
        ..Default::default()
    };
    let resp = exporter::export_image(
        &*state.renderer,
        &card.html_content,
        &options,
        &state.config.exports_dir(),
        state.config.export.default_width,
    )
    .await;
    match (resp.image_url, resp.metadata) {
        (Some(url), Some(meta)) if resp.success => Ok(page(views::create_export_result(
            &url,
            meta.dimensions.width,
            meta.dimensions.height,
        ))
        .into_response()),
        _ => {
            let reason = resp.error.unwrap_or_default();
            Ok(toast(Toast::error("Export failed").with_description(reason)).into_response())
        }
    }
}

pub async fn handle_showcase_page(
    State(state): State<AppState>,
    Query(query): Query<ShowcaseQuery>,
) -> Result<Html<String>> {
    let all = database::list_showcase(&state.pool).await?;
    let categories = showcase::categories(&all);
    let items = showcase::filter_and_sort(all, &query);
    Ok(page(views::create_showcase_page(&items, &categories, &query)))
}

/// htmx like button: answers with the new like count.
pub async fn handle_like_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String> {
    let item = database::record_like(&state.pool, &id).await?;
    Ok(item.likes.to_string())
}

// ---------------------------------------------------------------------------
// cards & templates

pub async fn list_cards(State(state): State<AppState>) -> Result<Json<Vec<Card>>> {
    Ok(Json(database::list_cards(&state.pool).await?))
}

pub async fn create_card(
    State(state): State<AppState>,
    Json(input): Json<NewCard>,
) -> Result<(StatusCode, Json<Card>)> {
    let card = database::insert_card(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn get_card(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Card>> {
    Ok(Json(database::get_card(&state.pool, &id).await?))
}

pub async fn update_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<CardPatch>,
) -> Result<Json<Card>> {
    Ok(Json(database::update_card(&state.pool, &id, patch).await?))
}

pub async fn delete_card(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    if database::delete_card(&state.pool, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("card {}", id)))
    }
}

pub async fn fork_card(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Card>> {
    Ok(Json(database::fork_card(&state.pool, &id).await?))
}

pub async fn list_templates(State(state): State<AppState>) -> Result<Json<Vec<CardTemplate>>> {
    Ok(Json(database::list_templates(&state.pool).await?))
}

// ---------------------------------------------------------------------------
// showcase

pub async fn list_showcase(
    State(state): State<AppState>,
    Query(query): Query<ShowcaseQuery>,
) -> Result<Json<Vec<ShowcaseCard>>> {
    let all = database::list_showcase(&state.pool).await?;
    Ok(Json(showcase::filter_and_sort(all, &query)))
}

pub async fn get_showcase_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShowcaseCard>> {
    Ok(Json(database::record_view(&state.pool, &id).await?))
}

pub async fn like_showcase_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShowcaseCard>> {
    Ok(Json(database::record_like(&state.pool, &id).await?))
}

// ---------------------------------------------------------------------------
// services

pub async fn generate_content(
    State(state): State<AppState>,
    Json(req): Json<AiGenerationRequest>,
) -> Json<AiGenerationResponse> {
    let template = optional_template(&state, req.template.as_deref()).await;
    Json(generator::generate_content(&*state.llm, &req, template.as_ref()).await)
}

pub async fn tune_html(State(state): State<AppState>, Json(req): Json<TuneRequest>) -> Json<TuneResponse> {
    let mut tuner = FineTuner::new(req.html, Duration::from_millis(state.config.tuner.delay_ms));
    match tuner.tune(&req.prompt).await {
        Some(reply) => Json(TuneResponse {
            success: true,
            html: tuner.into_html(),
            reply,
        }),
        None => Json(TuneResponse {
            success: false,
            html: tuner.into_html(),
            reply: "prompt must not be empty".into(),
        }),
    }
}

pub async fn scrape_website(
    State(state): State<AppState>,
    Json(req): Json<WebScrapingRequest>,
) -> Json<WebScrapingResponse> {
    Json(scraper::scrape_website(&*state.fetcher, &*state.llm, &req).await)
}

pub async fn export_image(
    State(state): State<AppState>,
    Json(req): Json<ImageExportRequest>,
) -> Json<ImageExportResponse> {
    Json(
        exporter::export_image(
            &*state.renderer,
            &req.html_content,
            &req.options,
            &state.config.exports_dir(),
            state.config.export.default_width,
        )
        .await,
    )
}

pub async fn apply_editor_commands(Json(req): Json<EditRequest>) -> Json<EditResponse> {
    Json(editor::apply_commands(&req))
}

pub async fn download_export(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response> {
    let (stem, _) = file.rsplit_once('.').unwrap_or((file.as_str(), ""));
    let content_type = exporter::content_type_for(&file)
        .filter(|_| is_safe_file_id(stem))
        .ok_or_else(|| AppError::NotFound(format!("export {}", file)))?;
    let bytes = read_or_not_found(state.config.exports_dir().join(&file), &file).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn read_or_not_found(path: std::path::PathBuf, name: &str) -> Result<Vec<u8>> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound(format!("file {}", name)))
        }
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// single-page generator API

pub async fn generate_files(
    State(state): State<AppState>,
    Json(payload): Json<GenerationRequest>,
) -> Result<Json<GenerationResponseData>> {
    let data = generator::generate_card(&*state.llm, payload, &state.config.output_dir()).await?;
    Ok(Json(data))
}

pub async fn download_html(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    if !is_safe_file_id(&file_id) {
        return Err(AppError::BadRequest("invalid file id".into()));
    }
    let name = format!("{}.html", file_id);
    let bytes = read_or_not_found(state.config.output_dir().join(&name), &name).await?;
    let disposition = format!("attachment; filename=\"{}\"", name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn summarize_content(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Json<SummarizeResponse> {
    Json(generator::summarize(&*state.llm, &req).await)
}

pub async fn fetch_web_content(
    State(state): State<AppState>,
    Json(req): Json<WebFetchRequest>,
) -> Json<WebFetchResponse> {
    Json(scraper::fetch_web(&*state.fetcher, &req.url).await)
}
