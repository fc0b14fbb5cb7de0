use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse};
use pulldown_cmark::{html::push_html, Options, Parser};
use qrcode::{render::svg, QrCode};
use uuid::Uuid;

/// Sanitize user-supplied HTML while keeping inline styling intact.
pub fn clean(content: &str) -> String {
    ammonia::Builder::default()
        .add_generic_attributes(&["style", "class"])
        .add_tags(&["style", "section", "article", "header", "footer", "main"])
        .rm_clean_content_tags(&["style"])
        .clean(content)
        .to_string()
}

pub fn convert_markdown_to_html(markdown_content: &str) -> String {
    let markdown_options = set_markdown_parser_options();
    let parser = Parser::new_ext(markdown_content, markdown_options);
    let mut html_output = String::new();
    push_html(&mut html_output, parser);

    add_syntax_highlighting_containers(html_output)
}

fn set_markdown_parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

fn add_syntax_highlighting_containers(html: String) -> String {
    html.replace("<pre>", "<div class=\"highlighter-rouge\"><pre>")
        .replace("</pre>", "</pre></div>")
}

/// Inner text of the first `<h1>`, if any.
pub fn extract_title_from_html(html_content: &str) -> Option<&str> {
    let start = html_content.find("<h1")?;
    let open_end = html_content[start..].find('>')? + start + 1;
    let end = html_content[open_end..].find("</h1>")? + open_end;
    Some(html_content[open_end..end].trim())
}

/// Strip tags and collapse whitespace; used for card `content` previews.
pub fn html_to_plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;
    let lower = html.to_ascii_lowercase();
    let mut i = 0;
    while i < html.len() {
        if let Some(end) = skip_until {
            match lower[i..].find(end) {
                Some(off) => {
                    i += off + end.len();
                    skip_until = None;
                    continue;
                }
                None => break,
            }
        }
        let Some(c) = html[i..].chars().next() else { break };
        if !in_tag && c == '<' {
            if lower[i..].starts_with("<style") {
                skip_until = Some("</style>");
                continue;
            }
            if lower[i..].starts_with("<script") {
                skip_until = Some("</script>");
                continue;
            }
            in_tag = true;
            out.push(' ');
        } else if in_tag && c == '>' {
            in_tag = false;
        } else if !in_tag {
            out.push(c);
        }
        i += c.len_utf8();
    }
    let decoded = html_escape::decode_html_entities(&out);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn create_htmx_redirect_response(location: &str) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(location) {
        headers.insert("hx-redirect", value);
    }
    (headers, "")
}

pub fn generate_short_uuid() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Share QR code for a card view, rendered as inline SVG.
pub fn generate_qr_svg(public_url: &str, card_id: &str) -> Option<String> {
    let url = format!("{}/view/{}", public_url.trim_end_matches('/'), card_id);
    let code = QrCode::new(url).ok()?;
    Some(code.render::<svg::Color>().min_dimensions(96, 96).build())
}

/// File ids come from `generate_short_uuid`; anything else is rejected
/// before it can reach the filesystem.
pub fn is_safe_file_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn handle_404() -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        Html(crate::views::create_404_page().into_string()),
    )
}
