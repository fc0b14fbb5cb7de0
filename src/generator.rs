//! AI card generation: the LLM seam, prompt assembly and HTML extraction.
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AiGenerationRequest, AiGenerationResponse, CardTemplate, GenerationMetadata, GenerationMode,
    GenerationRequest, GenerationResponseData, SummarizeRequest, SummarizeResponse,
};
use crate::utils::{convert_markdown_to_html, generate_short_uuid};

pub const SYSTEM_PROMPT_WEB_DESIGNER: &str = "You are a senior web designer. Produce one self-contained \
HTML document (inline <style>, no external scripts) that presents the user's content as a \
visually polished card. Reply with the HTML only.";

pub const SYSTEM_PROMPT_SUMMARIZE: &str = "You summarize text into concise Markdown, keeping the key \
facts and dropping filler.";

/// Per-call overrides; `None` falls back to the client's configured values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens: u32,
}

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> anyhow::Result<Completion>;
}

/// Chat-completions client for Ark (and any OpenAI-compatible endpoint).
#[derive(Clone)]
pub struct ArkClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for ArkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArkClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl ArkClient {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let mut endpoint = cfg.llm.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base_url = Url::parse(&endpoint).context("invalid llm.endpoint")?;
        let http = Client::builder()
            .user_agent("cardworks/0.1")
            .timeout(Duration::from_secs(cfg.llm.timeout_secs))
            .build()
            .context("failed to build LLM http client")?;
        Ok(Self {
            http,
            base_url,
            api_key: cfg.llm.api_key.clone(),
            model: cfg.llm.model.clone(),
            temperature: cfg.llm.temperature,
        })
    }
}

#[async_trait]
impl LlmService for ArkClient {
    #[instrument(skip_all, fields(model = tracing::field::Empty))]
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> anyhow::Result<Completion> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        tracing::Span::current().record("model", model);
        let endpoint = self
            .base_url
            .join("chat/completions")
            .context("invalid LLM base URL")?;
        let body = json!({
            "model": model,
            "temperature": options.temperature.unwrap_or(self.temperature),
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        info!(url = %endpoint, "calling LLM");
        let resp = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("LLM returned {}: {}", status, text));
        }
        let parsed: ChatResponse = resp.json().await.context("invalid LLM response body")?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("LLM response contained no choices"))?;
        let tokens = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok(Completion { text, tokens })
    }
}

/// Offline stand-in used when no LLM key is configured: the prompt is
/// concatenated into a fixed card skeleton.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLlm;

#[async_trait]
impl LlmService for SimulatedLlm {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> anyhow::Result<Completion> {
        let text = if system == SYSTEM_PROMPT_SUMMARIZE {
            let words: Vec<&str> = prompt.split_whitespace().take(60).collect();
            words.join(" ")
        } else {
            let body = html_escape::encode_text(prompt.trim());
            format!(
                "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><style>\
                 .card{{max-width:640px;margin:2rem auto;padding:2rem;border-radius:16px;\
                 font-family:sans-serif;background:#f8fafc;box-shadow:0 4px 24px rgba(0,0,0,.08)}}\
                 </style></head><body><article class=\"card\"><p>{}</p></article></body></html>",
                body
            )
        };
        let tokens = prompt.split_whitespace().count() as u32;
        Ok(Completion { text, tokens })
    }
}

/// Pull the HTML document out of a model reply.
pub fn extract_html_from_response(text: &str) -> String {
    if let Some(start) = text.find("```html") {
        let body = &text[start + "```html".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
        return body.trim().to_string();
    }

    let lower = text.to_ascii_lowercase();
    let start = lower.find("<!doctype").or_else(|| lower.find("<html"));
    if let Some(start) = start {
        if let Some(end) = lower.rfind("</html>") {
            if end > start {
                return text[start..end + "</html>".len()].to_string();
            }
        }
        return text[start..].trim().to_string();
    }

    text.trim().to_string()
}

fn style_hint(style: Option<&str>) -> &'static str {
    match style.unwrap_or("modern") {
        "classic" => "a classic, print-inspired look with serif type",
        "minimal" => "a minimal look with generous whitespace",
        "creative" => "a playful, creative look with bold colors",
        "professional" => "a restrained, professional business look",
        _ => "a modern look with soft gradients and rounded corners",
    }
}

fn language_hint(language: Option<&str>) -> &'static str {
    match language.unwrap_or("zh-CN") {
        "en-US" => "Write all visible text in English.",
        _ => "Write all visible text in Simplified Chinese.",
    }
}

pub fn build_generation_prompt(req: &AiGenerationRequest, template: Option<&CardTemplate>) -> String {
    let mut prompt = format!(
        "Design an HTML card with {}. {}\n",
        style_hint(req.style.as_deref()),
        language_hint(req.language.as_deref())
    );
    if let Some(t) = template {
        prompt.push_str(&format!(
            "Follow the structure of this template ({}):\n{}\n",
            t.name, t.html_template
        ));
    }
    prompt.push_str("Content:\n");
    prompt.push_str(req.prompt.trim());
    prompt
}

/// `POST /ai/generate`. Failures come back as `success: false`.
pub async fn generate_content(
    llm: &dyn LlmService,
    req: &AiGenerationRequest,
    template: Option<&CardTemplate>,
) -> AiGenerationResponse {
    if req.prompt.trim().is_empty() {
        return AiGenerationResponse::failure("prompt must not be empty");
    }
    let started = Instant::now();
    let prompt = build_generation_prompt(req, template);
    match llm
        .complete(SYSTEM_PROMPT_WEB_DESIGNER, &prompt, &CompletionOptions::default())
        .await
    {
        Ok(completion) => {
            let html = extract_html_from_response(&completion.text);
            info!(tokens = completion.tokens, bytes = html.len(), "card generated");
            AiGenerationResponse {
                success: true,
                html_content: html,
                error: None,
                metadata: Some(GenerationMetadata {
                    token_used: completion.tokens,
                    processing_time: started.elapsed().as_millis() as u64,
                }),
            }
        }
        Err(err) => {
            error!(?err, "AI generation failed");
            AiGenerationResponse::failure(format!("AI generation failed: {}", err))
        }
    }
}

/// Wrap rendered markdown in the card shell used by `direct` mode.
pub fn render_markdown_card(markdown: &str, style: &str) -> String {
    let body = convert_markdown_to_html(markdown);
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>card</title></head>\
         <body class=\"card-style-{}\"><article class=\"card\">{}</article></body></html>",
        html_escape::encode_double_quoted_attribute(style),
        body
    )
}

/// `POST /api/generate`: writes `{file_id}.html` under `output_dir`.
pub async fn generate_card(
    llm: &dyn LlmService,
    payload: GenerationRequest,
    output_dir: &Path,
) -> Result<GenerationResponseData> {
    let file_id = generate_short_uuid();
    let html_path = output_dir.join(format!("{}.html", file_id));
    let mut raw_llm_response = None;

    match payload.mode {
        GenerationMode::Prompt => {
            let prompt = payload
                .prompt
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| AppError::BadRequest("prompt mode requires a prompt".into()))?;
            info!(%file_id, "generating card from prompt");
            tokio::fs::write(output_dir.join(format!("{}_prompt.txt", file_id)), prompt).await?;

            let options = CompletionOptions {
                model: payload.model.clone(),
                temperature: payload.temperature,
            };
            let combined = format!("{}\n{}", style_hint(payload.style.as_deref()), prompt);
            let completion = llm
                .complete(SYSTEM_PROMPT_WEB_DESIGNER, &combined, &options)
                .await
                .map_err(|err| {
                    error!(?err, %file_id, "LLM call failed");
                    AppError::Upstream(format!("LLM call failed: {}", err))
                })?;
            let html = extract_html_from_response(&completion.text);
            tokio::fs::write(&html_path, html).await?;
            raw_llm_response = Some(completion.text);
        }
        GenerationMode::Paste => {
            let html = payload
                .html_input
                .as_deref()
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| AppError::BadRequest("paste mode requires html input".into()))?;
            info!(%file_id, "saving pasted HTML");
            tokio::fs::write(&html_path, html).await?;
        }
        GenerationMode::Direct => {
            let markdown = payload
                .markdown
                .as_deref()
                .or(payload.prompt.as_deref())
                .filter(|m| !m.trim().is_empty())
                .ok_or_else(|| AppError::BadRequest("direct mode requires markdown".into()))?;
            let style = payload.style.as_deref().unwrap_or("default");
            tokio::fs::write(&html_path, render_markdown_card(markdown, style)).await?;
        }
    }

    info!(path = %html_path.display(), "HTML file generated");
    Ok(GenerationResponseData {
        file_id: file_id.clone(),
        success: true,
        html_path: Some(format!("/api/download-html/{}", file_id)),
        message: Some("HTML card generated".into()),
        raw_llm_response,
    })
}

pub async fn summarize(llm: &dyn LlmService, req: &SummarizeRequest) -> SummarizeResponse {
    if req.content.trim().is_empty() {
        return SummarizeResponse {
            summary: String::new(),
            success: false,
            message: Some("content to summarize is required".into()),
        };
    }
    let prompt = format!(
        "Summarize the following content concisely, keeping the key information:\n\n{}\n\nSummary:\n",
        req.content
    );
    let options = CompletionOptions {
        model: req.model.clone(),
        temperature: Some(0.5),
    };
    match llm.complete(SYSTEM_PROMPT_SUMMARIZE, &prompt, &options).await {
        Ok(c) => SummarizeResponse {
            summary: c.text.trim().to_string(),
            success: true,
            message: None,
        },
        Err(err) => {
            warn!(?err, "summarization failed");
            SummarizeResponse {
                summary: String::new(),
                success: false,
                message: Some(format!("summary generation failed: {}", err)),
            }
        }
    }
}
