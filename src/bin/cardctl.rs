use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cardworks::client::ApiClient;
use cardworks::editor::{self, Command as EditCommand, EditRequest};
use cardworks::models::{
    AiGenerationRequest, ExtractionType, ImageExportOptions, ImageExportRequest, ImageFormat,
    NewCard, TuneRequest, WebScrapingRequest,
};
use cardworks::store::{AppConfig, CardStore};
use cardworks::toast::{Toast, ToastKind, ToastQueue};

#[derive(Debug, Parser)]
#[command(author, version, about = "Command-line client for a cardworks server")]
struct Args {
    /// API base URL (defaults to $CARDWORKS_API or http://localhost:8081)
    #[arg(long)]
    api: Option<String>,

    /// Local card cache
    #[arg(long, default_value = "cardworks-store.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Extract {
    Summary,
    Content,
    Structured,
}

impl From<Extract> for ExtractionType {
    fn from(e: Extract) -> Self {
        match e {
            Extract::Summary => ExtractionType::Summary,
            Extract::Content => ExtractionType::Content,
            Extract::Structured => ExtractionType::Structured,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Png,
    Jpeg,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// List my cards
    List,
    /// List card templates
    Templates,
    /// Generate a card from a prompt and save it
    Generate {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        template: Option<String>,
    },
    /// Scrape a page and save it as a card
    Scrape {
        #[arg(long)]
        url: String,
        #[arg(long, value_enum, default_value = "summary")]
        extract: Extract,
    },
    /// Save an HTML file as a card
    Paste {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
    },
    /// Apply a fine-tuning instruction to a card
    Tune {
        id: String,
        #[arg(long)]
        prompt: String,
    },
    /// Export a card as an image
    Export {
        id: String,
        #[arg(long, value_enum, default_value = "png")]
        format: Format,
        #[arg(long)]
        out: PathBuf,
    },
    /// Apply editor toolbar commands (JSON) to an HTML file and print the result
    Format {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        anchor: usize,
        #[arg(long, default_value_t = usize::MAX)]
        focus: usize,
        /// e.g. '{"op":"toggleMark","mark":{"format":"bold"}}'
        #[arg(long = "op", required = true)]
        ops: Vec<String>,
    },
    Fork {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(api) = args.api {
        config.api_endpoint = api;
    }
    let client = ApiClient::new(&config.api_endpoint)?;
    let mut store = CardStore::open(&args.store, client, config);
    let mut toasts = ToastQueue::new();

    let result = run(&mut store, &mut toasts, args.command).await;
    for toast in toasts.drain() {
        print_toast(&toast);
    }
    result
}

async fn run(store: &mut CardStore, toasts: &mut ToastQueue, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::List => {
            if !store.load_cards().await {
                toasts.add(store_error_toast(store, "Could not load cards"));
            }
            for card in &store.state().cards {
                println!("{}\t{}\t{}", card.id, card.updated_at.format("%Y-%m-%d"), card.title);
            }
        }
        Cmd::Templates => {
            if !store.load_templates().await {
                toasts.add(store_error_toast(store, "Could not load templates"));
            }
            for t in &store.state().templates {
                println!("{}\t{}\t{}", t.id, t.category, t.name);
            }
        }
        Cmd::Generate {
            prompt,
            style,
            language,
            template,
        } => {
            if prompt.trim().is_empty() {
                toasts.add(Toast::warning("Please describe the card first"));
                return Ok(());
            }
            let req = AiGenerationRequest {
                prompt: prompt.clone(),
                template: template.or_else(|| Some(store.config().default_template.clone())),
                style,
                language,
            };
            let resp = store.client().generate_content(&req).await;
            if !resp.success {
                toasts.add(Toast::error("Generation failed").with_description(resp.error.unwrap_or_default()));
                return Ok(());
            }
            let title: String = prompt.trim().chars().take(40).collect();
            save_card(store, toasts, title, resp.html_content).await;
        }
        Cmd::Scrape { url, extract } => {
            if url.trim().is_empty() {
                toasts.add(Toast::warning("Please enter a URL"));
                return Ok(());
            }
            let req = WebScrapingRequest {
                url,
                extraction_type: extract.into(),
                custom_prompt: None,
            };
            let resp = store.client().scrape_website(&req).await;
            if !resp.success {
                toasts.add(Toast::error("Scraping failed").with_description(resp.error.unwrap_or_default()));
                return Ok(());
            }
            let body = resp.summary.as_deref().unwrap_or(&resp.content);
            let html = cardworks::utils::convert_markdown_to_html(body);
            save_card(store, toasts, resp.title.clone(), html).await;
        }
        Cmd::Paste { file, title } => {
            let html = read_file(&file)?;
            if html.trim().is_empty() {
                toasts.add(Toast::warning("Nothing to save").with_description("The HTML file is empty"));
                return Ok(());
            }
            let title = title
                .or_else(|| cardworks::utils::extract_title_from_html(&html).map(str::to_string))
                .unwrap_or_else(|| "Pasted card".to_string());
            save_card(store, toasts, title, html).await;
        }
        Cmd::Tune { id, prompt } => {
            if prompt.trim().is_empty() {
                toasts.add(Toast::warning("Describe the change you want"));
                return Ok(());
            }
            let card = find_card(store, &id).await?;
            let resp = store
                .client()
                .tune(&TuneRequest {
                    html: card.html_content,
                    prompt,
                })
                .await;
            if !resp.success {
                toasts.add(Toast::error("Tuning failed").with_description(resp.reply));
                return Ok(());
            }
            let patch = cardworks::models::CardPatch {
                html_content: Some(resp.html),
                ..Default::default()
            };
            match store.update_card(&id, patch).await {
                Some(_) => toasts.add(Toast::success("Card tuned").with_description(resp.reply)),
                None => toasts.add(store_error_toast(store, "Could not save the tuned card")),
            }
        }
        Cmd::Export { id, format, out } => {
            let format = match format {
                Format::Png => ImageFormat::Png,
                Format::Jpeg => ImageFormat::Jpeg,
            };
            if !store.config().supports(format) {
                toasts.add(Toast::warning("Unsupported image format"));
                return Ok(());
            }
            let card = find_card(store, &id).await?;
            let resp = store
                .client()
                .export_image(&ImageExportRequest {
                    html_content: card.html_content,
                    options: ImageExportOptions {
                        format,
                        ..Default::default()
                    },
                })
                .await;
            let url = match (resp.success, resp.image_url) {
                (true, Some(url)) => url,
                _ => {
                    toasts.add(Toast::error("Export failed").with_description(resp.error.unwrap_or_default()));
                    return Ok(());
                }
            };
            let bytes = store.client().download(&url).await?;
            std::fs::write(&out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
            toasts.add(Toast::success("Image exported").with_description(out.display().to_string()));
        }
        Cmd::Format {
            file,
            anchor,
            focus,
            ops,
        } => {
            let commands = ops
                .iter()
                .map(|op| serde_json::from_str::<EditCommand>(op).with_context(|| format!("invalid command: {}", op)))
                .collect::<Result<Vec<_>>>()?;
            let resp = editor::apply_commands(&EditRequest {
                html: read_file(&file)?,
                anchor,
                focus,
                commands,
            });
            println!("{}", resp.html);
        }
        Cmd::Fork { id } => match store.fork_card(&id).await {
            Some(card) => {
                println!("{}", card.id);
                toasts.add(Toast::success("Card forked"));
            }
            None => toasts.add(store_error_toast(store, "Could not fork the card")),
        },
        Cmd::Delete { id } => {
            if store.delete_card(&id).await {
                toasts.add(Toast::success("Card deleted"));
            } else {
                toasts.add(store_error_toast(store, "Could not delete the card"));
            }
        }
    }
    Ok(())
}

async fn save_card(store: &mut CardStore, toasts: &mut ToastQueue, title: String, html: String) {
    let input = NewCard {
        title,
        content: cardworks::utils::truncate_chars(&cardworks::utils::html_to_plain_text(&html), 160),
        html_content: html,
        ..Default::default()
    };
    match store.create_card(input).await {
        Some(card) => {
            println!("{}", card.id);
            toasts.add(Toast::success("Card saved"));
        }
        None => toasts.add(store_error_toast(store, "Could not save the card")),
    }
}

async fn find_card(store: &mut CardStore, id: &str) -> Result<cardworks::models::Card> {
    if store.find(id).is_none() {
        store.load_cards().await;
    }
    store
        .find(id)
        .cloned()
        .ok_or_else(|| anyhow!("card {} not found", id))
}

fn store_error_toast(store: &CardStore, title: &str) -> Toast {
    let toast = Toast::error(title);
    match &store.state().error {
        Some(err) => toast.with_description(err.clone()),
        None => toast,
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_toast(toast: &Toast) {
    let marker = match toast.kind {
        ToastKind::Success => "ok",
        ToastKind::Error => "error",
        ToastKind::Warning => "warning",
        ToastKind::Info => "info",
    };
    match &toast.description {
        Some(d) => eprintln!("[{}] {}: {}", marker, toast.title, d),
        None => eprintln!("[{}] {}", marker, toast.title),
    }
}
