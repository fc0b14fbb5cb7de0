mod common;

use cardworks::client::ApiClient;
use cardworks::models::{AiGenerationRequest, CardPatch, ImageExportRequest, NewCard};
use cardworks::store::{AppConfig, CardStore};

fn new_card(title: &str) -> NewCard {
    NewCard {
        title: title.into(),
        html_content: format!("<h1>{}</h1>", title),
        ..Default::default()
    }
}

#[tokio::test]
async fn store_mirrors_server_and_persists() {
    let srv = common::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let config = AppConfig {
        api_endpoint: srv.base.clone(),
        ..Default::default()
    };

    let mut store = CardStore::open(&path, ApiClient::new(&srv.base).unwrap(), config.clone());
    assert!(store.load_templates().await);
    assert_eq!(store.state().templates.len(), 3);

    let first = store.create_card(new_card("first")).await.unwrap();
    let second = store.create_card(new_card("second")).await.unwrap();
    let ids: Vec<&str> = store.state().cards.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()], "new cards are prepended");
    assert_eq!(store.state().current_card.as_ref().map(|c| c.id.as_str()), Some(second.id.as_str()));

    let renamed = store
        .update_card(
            &first.id,
            CardPatch {
                title: Some("first, renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(store.state().cards[1].title, "first, renamed");
    assert_eq!(store.state().current_card.as_ref().unwrap().id, renamed.id);

    let fork = store.fork_card(&second.id).await.unwrap();
    assert_eq!(store.state().cards[0].id, fork.id);

    store.set_current_card(Some(second.clone()));
    assert!(store.delete_card(&second.id).await);
    assert!(store.state().current_card.is_none());
    assert!(store.find(&second.id).is_none());

    // a second process sees the same cards without talking to the server
    let reopened = CardStore::open(&path, ApiClient::new("http://127.0.0.1:9").unwrap(), config);
    let titles: Vec<&str> = reopened.state().cards.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["second", "first, renamed"]);
    assert_eq!(reopened.state().templates.len(), 3);

    // and the server agrees
    assert!(store.load_cards().await);
    assert_eq!(store.state().cards.len(), 2);
}

#[tokio::test]
async fn store_surfaces_server_errors() {
    let srv = common::spawn().await;
    let mut store = CardStore::new(ApiClient::new(&srv.base).unwrap(), AppConfig::default());

    assert!(store.update_card("missing", CardPatch::default()).await.is_none());
    let err = store.state().error.clone().unwrap();
    assert!(err.contains("not found"), "{}", err);

    assert!(store.create_card(new_card("  ")).await.is_none());
    assert!(store.state().error.as_deref().unwrap().contains("title must not be empty"));
    assert!(store.state().cards.is_empty());
}

#[tokio::test]
async fn client_failure_shapes() {
    let srv = common::spawn().await;
    let client = ApiClient::new(&srv.base).unwrap();

    let resp = client
        .generate_content(&AiGenerationRequest {
            prompt: "".into(),
            ..Default::default()
        })
        .await;
    assert!(!resp.success);

    let resp = client
        .export_image(&ImageExportRequest {
            html_content: "<p>x</p>".into(),
            options: Default::default(),
        })
        .await;
    assert!(resp.success);
    let bytes = client.download(resp.image_url.as_deref().unwrap()).await.unwrap();
    assert_eq!(bytes, common::tiny_png(800, 600));

    assert!(client.fork_card("missing").await.is_none());
    assert!(!client.delete_card("missing").await);
}
