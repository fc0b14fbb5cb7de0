mod common;

use std::sync::atomic::Ordering;

use reqwest::StatusCode;
use serde_json::{json, Value};

use cardworks::models::{Card, CardTemplate, ShowcaseCard};

#[tokio::test]
async fn card_crud_round_trip() {
    let srv = common::spawn().await;

    let created: Card = srv
        .http
        .post(srv.url("/cards"))
        .json(&json!({
            "title": "Launch",
            "content": "summer launch",
            "htmlContent": "<h1>Launch</h1>",
            "tags": ["poster", "summer"]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created.title, "Launch");
    assert_eq!(created.tags, vec!["poster", "summer"]);

    let listed: Vec<Card> = srv.http.get(srv.url("/cards")).send().await.unwrap().json().await.unwrap();
    assert_eq!(listed.len(), 1, "showcase cards are not listed as mine");

    let updated: Card = srv
        .http
        .put(srv.url(&format!("/cards/{}", created.id)))
        .json(&json!({ "title": "Launch v2" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated.title, "Launch v2");
    assert_eq!(updated.html_content, "<h1>Launch</h1>");
    assert!(updated.updated_at > created.updated_at);

    let resp = srv.http.delete(srv.url(&format!("/cards/{}", created.id))).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = srv.http.get(srv.url(&format!("/cards/{}", created.id))).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let srv = common::spawn().await;
    let resp = srv
        .http
        .post(srv.url("/cards"))
        .json(&json!({ "title": "  ", "htmlContent": "<p/>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fork_showcase_card_counts_fork() {
    let srv = common::spawn().await;
    let before: ShowcaseCard = srv
        .http
        .get(srv.url("/showcase/cards/showcase-kyoto-trip"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let fork: Card = srv
        .http
        .post(srv.url("/cards/showcase-kyoto-trip/fork"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_ne!(fork.id, "showcase-kyoto-trip");
    assert_eq!(fork.forked_from.as_deref(), Some("showcase-kyoto-trip"));
    assert_eq!(fork.title, before.card.title);

    let after: ShowcaseCard = srv
        .http
        .get(srv.url("/showcase/cards/showcase-kyoto-trip"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after.forks, before.forks + 1);
    assert_eq!(after.views, before.views + 1, "each GET counts a view");

    let mine: Vec<Card> = srv.http.get(srv.url("/cards")).send().await.unwrap().json().await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn showcase_search_and_like() {
    let srv = common::spawn().await;
    let all: Vec<ShowcaseCard> = srv
        .http
        .get(srv.url("/showcase/cards"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let latest: Vec<ShowcaseCard> = srv
        .http
        .get(srv.url("/showcase/cards?sort=latest&category=all"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(latest.windows(2).all(|w| w[0].card.created_at >= w[1].card.created_at));

    let office: Vec<ShowcaseCard> = srv
        .http
        .get(srv.url("/showcase/cards?category=office"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(office.len(), 1);

    let liked: ShowcaseCard = srv
        .http
        .post(srv.url(&format!("/showcase/cards/{}/like", office[0].card.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(liked.likes, office[0].likes + 1);

    let resp = srv.http.post(srv.url("/showcase/cards/nope/like")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn templates_are_seeded() {
    let srv = common::spawn().await;
    let templates: Vec<CardTemplate> =
        srv.http.get(srv.url("/templates")).send().await.unwrap().json().await.unwrap();
    let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
    assert!(ids.contains(&"modern-card"));
    assert!(templates.iter().all(|t| t.html_template.contains("{{content}}")));
}

#[tokio::test]
async fn ai_generate_success_and_empty_prompt() {
    let srv = common::spawn().await;
    let ok: Value = srv
        .http
        .post(srv.url("/ai/generate"))
        .json(&json!({ "prompt": "a card about tea", "template": "modern-card", "style": "minimal" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ok["success"], true);
    assert!(ok["htmlContent"].as_str().unwrap().starts_with("<html>"));
    assert_eq!(ok["metadata"]["tokenUsed"], 42);

    let calls = srv.llm.calls.load(Ordering::SeqCst);
    let empty: Value = srv
        .http
        .post(srv.url("/ai/generate"))
        .json(&json!({ "prompt": "   " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(empty["success"], false);
    assert!(empty["error"].is_string());
    assert_eq!(srv.llm.calls.load(Ordering::SeqCst), calls, "no LLM call for an empty prompt");
}

#[tokio::test]
async fn scrape_modes() {
    let srv = common::spawn().await;
    let summary: Value = srv
        .http
        .post(srv.url("/scrape/website"))
        .json(&json!({ "url": "https://example.com", "extractionType": "summary" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["success"], true);
    assert_eq!(summary["title"], "Example Domain");
    assert!(summary["summary"].as_str().unwrap().starts_with("- summary of"));

    let structured: Value = srv
        .http
        .post(srv.url("/scrape/website"))
        .json(&json!({ "url": "https://example.com", "extractionType": "structured" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(structured["structuredData"]["headings"][0], "Example Domain");

    let bad: Value = srv
        .http
        .post(srv.url("/scrape/website"))
        .json(&json!({ "url": "file:///etc/passwd" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bad["success"], false);
}

#[tokio::test]
async fn export_and_download_image() {
    let srv = common::spawn().await;
    let resp: Value = srv
        .http
        .post(srv.url("/export/image"))
        .json(&json!({ "htmlContent": "<p>hi</p>", "options": { "format": "png", "quality": 90 } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);
    assert_eq!(resp["metadata"]["dimensions"]["width"], 800);
    let image_url = resp["imageUrl"].as_str().unwrap();

    let img = srv.http.get(srv.url(image_url)).send().await.unwrap();
    assert_eq!(img.status(), StatusCode::OK);
    assert_eq!(img.headers()["content-type"], "image/png");
    assert_eq!(img.bytes().await.unwrap().to_vec(), common::tiny_png(800, 600));

    let missing = srv.http.get(srv.url("/exports/deadbeef0000.png")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let sneaky = srv.http.get(srv.url("/exports/..%2Ftest.db")).send().await.unwrap();
    assert_eq!(sneaky.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_rejects_out_of_range_options() {
    let srv = common::spawn().await;
    for options in [
        json!({ "format": "png", "quality": 300 }),
        json!({ "format": "png", "width": -1 }),
    ] {
        let resp = srv
            .http
            .post(srv.url("/export/image"))
            .json(&json!({ "htmlContent": "<p>hi</p>", "options": options }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false, "{}", options);
        assert!(body["error"].as_str().unwrap().contains("between 1 and"));
    }
}

#[tokio::test]
async fn tune_appends_marker() {
    let srv = common::spawn().await;
    let resp: Value = srv
        .http
        .post(srv.url("/ai/tune"))
        .json(&json!({ "html": "<p>x</p>", "prompt": "bigger title" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);
    assert!(resp["html"].as_str().unwrap().ends_with("<!-- AI-Tuning based on prompt: \"bigger title\" -->"));
}

#[tokio::test]
async fn editor_apply_commands() {
    let srv = common::spawn().await;
    let resp: Value = srv
        .http
        .post(srv.url("/editor/apply"))
        .json(&json!({
            "html": "<p>one</p><p>two</p>",
            "anchor": 0,
            "focus": 1,
            "commands": [
                { "op": "toggleBlock", "format": "numbered-list" },
                { "op": "toggleMark", "mark": { "format": "bold" } }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        resp["html"],
        "<ol><li><strong>one</strong></li><li><strong>two</strong></li></ol>"
    );
    assert_eq!(resp["document"]["blocks"][0]["block"], "list");
}

#[tokio::test]
async fn legacy_generate_and_download() {
    let srv = common::spawn().await;
    let data: Value = srv
        .http
        .post(srv.url("/api/generate"))
        .json(&json!({ "mode": "paste", "htmlInput": "<p>pasted</p>" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(data["success"], true);
    let path = data["html_path"].as_str().unwrap();
    assert_eq!(path, format!("/api/download-html/{}", data["file_id"].as_str().unwrap()));

    let file = srv.http.get(srv.url(path)).send().await.unwrap();
    assert_eq!(file.status(), StatusCode::OK);
    assert!(file.headers()["content-disposition"].to_str().unwrap().contains("attachment"));
    assert_eq!(file.text().await.unwrap(), "<p>pasted</p>");

    let resp = srv
        .http
        .post(srv.url("/api/generate"))
        .json(&json!({ "mode": "prompt" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv.http.get(srv.url("/api/download-html/not_safe!")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn legacy_summarize_and_fetch() {
    let srv = common::spawn().await;
    let summary: Value = srv
        .http
        .post(srv.url("/api/summarize"))
        .json(&json!({ "content": "long text" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["success"], true);

    let page: Value = srv
        .http
        .post(srv.url("/api/fetch-web"))
        .json(&json!({ "url": "https://example.com" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["success"], true);
    assert_eq!(page["content"], common::READER_PAGE);
}
