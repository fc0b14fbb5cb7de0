use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::models::{Card, CardTemplate, ShowcaseCard, ShowcaseQuery};
use crate::showcase::{SortBy, SORT_OPTIONS};
use crate::toast::Toast;

const SITE_NAME: &str = "cardworks";

const BASE_STYLE: &str = "
body{font-family:system-ui,sans-serif;margin:0;color:#1e293b;background:#f8fafc}
.w{max-width:960px;margin:0 auto;padding:0 1.5rem}
nav{display:flex;gap:1.5rem;align-items:center;padding:1rem 0}
nav a{color:inherit;text-decoration:none}
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(260px,1fr));gap:1rem}
.tile{background:#fff;border-radius:12px;padding:1rem;box-shadow:0 1px 4px rgba(0,0,0,.08)}
.tile img{width:100%;border-radius:8px}
.muted{color:#64748b;font-size:.9em}
.badge{display:inline-block;background:#e2e8f0;border-radius:999px;padding:0 .6em;margin-right:.3em;font-size:.8em}
textarea,input,select{width:100%;box-sizing:border-box;margin:.3rem 0 .8rem;padding:.5rem}
button{padding:.5rem 1rem;border-radius:8px;border:0;background:#4f46e5;color:#fff;cursor:pointer}
button[disabled]{opacity:.5}
iframe.card{width:100%;height:70vh;border:1px solid #e2e8f0;border-radius:12px;background:#fff}
#toasts{position:fixed;right:1rem;bottom:1rem;display:flex;flex-direction:column;gap:.5rem}
.toast{padding:.75rem 1rem;border-radius:8px;color:#fff;min-width:220px}
.toast-success{background:#16a34a}.toast-error{background:#dc2626}
.toast-warning{background:#d97706}.toast-info{background:#2563eb}
";

fn create_html_head(page_title: Option<&str>) -> Markup {
    html! {
        head {
            title { (page_title.map(|t| format!("{} · {}", t, SITE_NAME)).unwrap_or_else(|| SITE_NAME.to_string())) }
            meta charset="utf-8";
            meta name="viewport" content="width=device-width, initial-scale=1";
            link rel="icon" href="data:image/svg+xml,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 100 100'><text y='.9em' font-size='90'>🃏</text></svg>";
            style { (PreEscaped(BASE_STYLE)) }
            script src="https://unpkg.com/htmx.org@1.9.10" {}
            script src="https://unpkg.com/hyperscript.org@0.9.12" {}
        }
    }
}

fn create_page_header() -> Markup {
    html! {
        header class="w" {
            nav {
                a href="/" { b { (SITE_NAME) } }
                a href="/create" { "Create" }
                a href="/dashboard" { "My cards" }
                a href="/showcase" { "Showcase" }
            }
        }
    }
}

fn create_page_footer() -> Markup {
    html! {
        footer {
            div class="w" {
                p class="muted" { (SITE_NAME) " :: generate, scrape, paste and tune HTML cards" }
            }
        }
        div id="toasts" {}
    }
}

fn page(title: Option<&str>, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            (create_html_head(title))
            body {
                (create_page_header())
                main class="content" aria-label="Content" {
                    div class="w" { (body) }
                }
                (create_page_footer())
            }
        }
    }
}

fn tags(tags: &[String]) -> Markup {
    html! {
        @for tag in tags {
            span class="badge" { (tag) }
        }
    }
}

fn showcase_tile(item: &ShowcaseCard) -> Markup {
    html! {
        div class="tile" {
            @if !item.thumbnail_url.is_empty() {
                img src=(item.thumbnail_url) alt=(item.card.title) loading="lazy";
            }
            h3 { a href=(format!("/view/{}", item.card.id)) { (item.card.title) } }
            p { (tags(&item.card.tags)) }
            p class="muted" {
                (item.views) " views · "
                span id=(format!("likes-{}", item.card.id)) { (item.likes) } " likes · "
                (item.forks) " forks"
            }
            button
                hx-post=(format!("/showcase/like/{}", item.card.id))
                hx-target=(format!("#likes-{}", item.card.id))
                hx-swap="innerHTML"
                { "Like" }
        }
    }
}

pub fn create_home_page(featured: &[ShowcaseCard]) -> Markup {
    page(
        None,
        html! {
            h1 { "Turn ideas into shareable cards" }
            p { "Describe what you want, point at a web page, or paste your own HTML. "
                "The workshop turns it into a polished card you can tune, export and share." }
            p { a href="/create" { button { "Start creating" } } }
            h2 { "Three ways in" }
            div class="grid" {
                div class="tile" { h3 { "AI generation" } p { "Write a prompt, pick a style and a template." } }
                div class="tile" { h3 { "Web scraping" } p { "Summarize any article into a card." } }
                div class="tile" { h3 { "Paste HTML" } p { "Bring your own markup; it is sanitized before saving." } }
            }
            @if !featured.is_empty() {
                h2 { "From the showcase" }
                div class="grid" {
                    @for item in featured {
                        (showcase_tile(item))
                    }
                }
            }
        },
    )
}

pub fn create_dashboard_page(cards: &[Card]) -> Markup {
    page(
        Some("My cards"),
        html! {
            h1 { "My cards" }
            @if cards.is_empty() {
                p { "No cards yet. " a href="/create" { "Create your first card" } "." }
            } @else {
                p class="muted" { (cards.len()) " cards" }
                div class="grid" {
                    @for card in cards {
                        div class="tile" {
                            h3 { a href=(format!("/view/{}", card.id)) { (card.title) } }
                            p class="muted" { (card.content) }
                            p { (tags(&card.tags)) }
                            p class="muted" {
                                "updated " (card.updated_at.format("%Y-%m-%d %H:%M"))
                                @if let Some(parent) = &card.forked_from {
                                    " · forked from " a href=(format!("/view/{}", parent)) { (parent) }
                                }
                            }
                        }
                    }
                }
            }
        },
    )
}

pub fn create_create_page(templates: &[CardTemplate]) -> Markup {
    page(
        Some("Create"),
        html! {
            h1 { "Create a card" }
            section class="tile" {
                h2 { "AI generation" }
                form hx-post="/create/generate" hx-target="#toasts" hx-swap="beforeend" hx-disabled-elt="find button" {
                    label for="prompt" { "What should the card say?" }
                    textarea id="prompt" name="prompt" rows="5" placeholder="A poster for our summer product launch..." {}
                    label for="style" { "Style" }
                    select id="style" name="style" {
                        @for (value, label) in [("modern", "Modern"), ("classic", "Classic"), ("minimal", "Minimal"), ("creative", "Creative"), ("professional", "Professional")] {
                            option value=(value) { (label) }
                        }
                    }
                    label for="language" { "Language" }
                    select id="language" name="language" {
                        option value="zh-CN" { "简体中文" }
                        option value="en-US" { "English" }
                    }
                    label for="template" { "Template" }
                    select id="template" name="template" {
                        option value="" { "None" }
                        @for t in templates {
                            option value=(t.id) { (t.name) " · " (t.description) }
                        }
                    }
                    button type="submit" { "Generate" }
                }
            }
            br;
            section class="tile" {
                h2 { "Web scraping" }
                form hx-post="/create/scrape" hx-target="#toasts" hx-swap="beforeend" hx-disabled-elt="find button" {
                    label for="url" { "Page URL" }
                    input id="url" name="url" type="url" placeholder="https://example.com/article";
                    label for="extraction_type" { "Extract" }
                    select id="extraction_type" name="extraction_type" {
                        option value="summary" { "Summary" }
                        option value="content" { "Full content" }
                        option value="structured" { "Structure" }
                    }
                    button type="submit" { "Scrape" }
                }
            }
            br;
            section class="tile" {
                h2 { "Paste HTML" }
                form hx-post="/create/paste" hx-target="#toasts" hx-swap="beforeend" hx-disabled-elt="find button" {
                    label for="title" { "Title" }
                    input id="title" name="title" type="text" placeholder="Optional";
                    label for="html" { "HTML" }
                    textarea id="html" name="html" rows="10" placeholder="<div class=\"card\">...</div>" {}
                    button type="submit" { "Save card" }
                }
            }
        },
    )
}

pub fn create_card_page(card: &Card, share_qr: Option<&str>, share_url: &str) -> Markup {
    page(
        Some(card.title.as_str()),
        html! {
            h1 { (card.title) }
            p { (tags(&card.tags)) }
            p class="muted" {
                "created " (card.created_at.format("%Y-%m-%d"))
                @if let Some(author) = &card.author { " by " (author) }
                @if let Some(parent) = &card.forked_from {
                    " · forked from " a href=(format!("/view/{}", parent)) { (parent) }
                }
            }
            iframe class="card" sandbox="" title=(card.title) srcdoc=(card.html_content) {}
            div class="grid" {
                div class="tile" {
                    h3 { "Fine-tune" }
                    form hx-post=(format!("/view/{}/tune", card.id)) hx-target="#toasts" hx-swap="beforeend" hx-disabled-elt="find button" {
                        textarea name="prompt" rows="3" placeholder="Make the title red" {}
                        button type="submit" { "Apply" }
                    }
                }
                div class="tile" {
                    h3 { "Export" }
                    form hx-post=(format!("/view/{}/export", card.id)) hx-target="#export-result" hx-disabled-elt="find button" {
                        select name="format" {
                            option value="png" { "PNG" }
                            option value="jpeg" { "JPEG" }
                        }
                        button type="submit" { "Export image" }
                    }
                    div id="export-result" {}
                }
                div class="tile" {
                    h3 { "Share" }
                    @if let Some(svg) = share_qr {
                        (PreEscaped(svg))
                    }
                    p class="muted" { (share_url) }
                    button
                        hx-post=(format!("/view/{}/fork", card.id))
                        hx-target="#toasts"
                        hx-swap="beforeend"
                        { "Fork" }
                    " "
                    button
                        hx-post=(format!("/view/{}/delete", card.id))
                        hx-target="#toasts"
                        hx-swap="beforeend"
                        hx-confirm="Delete this card?"
                        { "Delete" }
                }
            }
        },
    )
}

pub fn create_export_result(image_url: &str, width: u32, height: u32) -> Markup {
    html! {
        p {
            a href=(image_url) download { "Download image" }
            span class="muted" { " " (width) "×" (height) }
        }
    }
}

pub fn create_showcase_page(items: &[ShowcaseCard], categories: &[String], query: &ShowcaseQuery) -> Markup {
    let sort = SortBy::parse(query.sort.as_deref());
    let selected_category = query.category.as_deref().unwrap_or("");
    page(
        Some("Showcase"),
        html! {
            h1 { "Showcase" }
            form method="get" action="/showcase" {
                input type="search" name="q" placeholder="Search titles and tags" value=(query.q.as_deref().unwrap_or(""));
                select name="category" {
                    option value="all" { "All categories" }
                    @for c in categories {
                        option value=(c) selected[c == selected_category] { (c) }
                    }
                }
                select name="sort" {
                    @for (label, sort_by) in SORT_OPTIONS {
                        option value=(sort_by.as_str()) selected[sort_by == sort] { (label) }
                    }
                }
                button type="submit" { "Filter" }
            }
            @if items.is_empty() {
                p { "Nothing matches your search." }
            } @else {
                div class="grid" {
                    @for item in items {
                        (showcase_tile(item))
                    }
                }
            }
        },
    )
}

pub fn create_404_page() -> Markup {
    page(
        Some("404"),
        html! {
            h1 { "404 - Page Not Found" }
            p { "The page you're looking for doesn't exist." }
            p { a href="/" { "Return to homepage" } }
        },
    )
}

/// A toast swapped into `#toasts`; hyperscript removes it once its duration elapses.
pub fn create_toast_fragment(toast: &Toast) -> Markup {
    let duration = if toast.duration == 0 {
        crate::toast::DEFAULT_TOAST_DURATION_MS
    } else {
        toast.duration
    };
    html! {
        div class=(format!("toast toast-{}", toast.kind.as_str()))
            role="status"
            _=(format!("on load wait {}ms then remove me", duration)) {
            strong { (toast.title) }
            @if let Some(description) = &toast.description {
                div { (description) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toast_fragment_carries_kind_and_timer() {
        let markup = create_toast_fragment(&Toast::warning("Nothing to save").with_description("Paste some HTML first"))
            .into_string();
        assert!(markup.contains("toast-warning"));
        assert!(markup.contains("wait 3000ms"));
        assert!(markup.contains("Paste some HTML first"));
    }

    #[test]
    fn card_html_is_escaped_into_srcdoc() {
        let now = chrono::Utc::now();
        let card = Card {
            id: "abc".into(),
            title: "T".into(),
            content: String::new(),
            html_content: "<p onclick=\"x\">hi</p>".into(),
            image_url: None,
            tags: vec![],
            author: None,
            category: None,
            forked_from: None,
            created_at: now,
            updated_at: now,
        };
        let markup = create_card_page(&card, None, "http://localhost/view/abc").into_string();
        assert!(markup.contains("srcdoc=\"&lt;p onclick=&quot;x&quot;&gt;hi&lt;/p&gt;\""));
        assert!(markup.contains("sandbox=\"\""));
        // fork and delete failures come back as toasts
        assert_eq!(markup.matches("hx-target=\"#toasts\"").count(), 3);
    }
}
