use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Card, CardPatch, CardTemplate, NewCard, ShowcaseCard};

pub async fn setup_database(db_path: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(
            SqliteConnectOptions::from_str(db_path)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(30)),
        )
        .await?;

    create_schema(&pool).await?;
    seed(&pool).await?;

    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            html_content TEXT NOT NULL,
            image_url TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            author TEXT,
            category TEXT,
            forked_from TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            html_template TEXT NOT NULL,
            preview_image TEXT NOT NULL,
            category TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Showcase cards are regular cards plus engagement counters.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS showcase_stats (
            card_id TEXT PRIMARY KEY REFERENCES cards(id) ON DELETE CASCADE,
            thumbnail_url TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            forks INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(FromRow)]
struct CardRow {
    id: String,
    title: String,
    content: String,
    html_content: String,
    image_url: Option<String>,
    tags: String,
    author: Option<String>,
    category: Option<String>,
    forked_from: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CardRow> for Card {
    fn from(row: CardRow) -> Self {
        Card {
            id: row.id,
            title: row.title,
            content: row.content,
            html_content: row.html_content,
            image_url: row.image_url,
            tags: decode_tags(&row.tags),
            author: row.author,
            category: row.category,
            forked_from: row.forked_from,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ShowcaseRow {
    #[sqlx(flatten)]
    card: CardRow,
    thumbnail_url: String,
    views: i64,
    likes: i64,
    forks: i64,
}

impl From<ShowcaseRow> for ShowcaseCard {
    fn from(row: ShowcaseRow) -> Self {
        ShowcaseCard {
            card: row.card.into(),
            thumbnail_url: row.thumbnail_url,
            views: row.views,
            likes: row.likes,
            forks: row.forks,
        }
    }
}

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    description: String,
    html_template: String,
    preview_image: String,
    category: String,
    tags: String,
}

impl From<TemplateRow> for CardTemplate {
    fn from(row: TemplateRow) -> Self {
        CardTemplate {
            id: row.id,
            name: row.name,
            description: row.description,
            html_template: row.html_template,
            preview_image: row.preview_image,
            category: row.category,
            tags: decode_tags(&row.tags),
        }
    }
}

fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn decode_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

const SHOWCASE_SELECT: &str = r#"
    SELECT c.*, s.thumbnail_url, s.views, s.likes, s.forks
    FROM cards c JOIN showcase_stats s ON s.card_id = c.id
"#;

#[instrument(skip(pool))]
pub async fn list_cards(pool: &SqlitePool) -> Result<Vec<Card>> {
    let rows = sqlx::query_as::<_, CardRow>(
        "SELECT * FROM cards WHERE id NOT IN (SELECT card_id FROM showcase_stats) ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Card::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_card(pool: &SqlitePool, id: &str) -> Result<Card> {
    sqlx::query_as::<_, CardRow>("SELECT * FROM cards WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Card::from)
        .ok_or_else(|| AppError::NotFound(format!("card {}", id)))
}

#[instrument(skip(pool, input), fields(title = %input.title))]
pub async fn insert_card(pool: &SqlitePool, input: NewCard) -> Result<Card> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }
    let now = Utc::now();
    let card = Card {
        id: Uuid::new_v4().to_string(),
        title: input.title,
        content: input.content,
        html_content: input.html_content,
        image_url: input.image_url,
        tags: input.tags,
        author: input.author,
        category: input.category,
        forked_from: None,
        created_at: now,
        updated_at: now,
    };
    save_card(pool, &card).await?;
    info!(id = %card.id, "card created");
    Ok(card)
}

async fn save_card(pool: &SqlitePool, card: &Card) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cards (id, title, content, html_content, image_url, tags, author, category, forked_from, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&card.id)
    .bind(&card.title)
    .bind(&card.content)
    .bind(&card.html_content)
    .bind(&card.image_url)
    .bind(encode_tags(&card.tags))
    .bind(&card.author)
    .bind(&card.category)
    .bind(&card.forked_from)
    .bind(card.created_at)
    .bind(card.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip(pool, patch))]
pub async fn update_card(pool: &SqlitePool, id: &str, patch: CardPatch) -> Result<Card> {
    if patch.title.as_deref().map_or(false, |t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }
    let mut card = get_card(pool, id).await?;
    patch.apply(&mut card);
    // Keep timestamps strictly increasing even on coarse clocks.
    card.updated_at = Utc::now().max(card.updated_at + chrono::Duration::milliseconds(1));

    sqlx::query(
        r#"
        UPDATE cards
        SET title = ?, content = ?, html_content = ?, image_url = ?, tags = ?, author = ?, category = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&card.title)
    .bind(&card.content)
    .bind(&card.html_content)
    .bind(&card.image_url)
    .bind(encode_tags(&card.tags))
    .bind(&card.author)
    .bind(&card.category)
    .bind(card.updated_at)
    .bind(&card.id)
    .execute(pool)
    .await?;

    Ok(card)
}

/// Returns whether a card was removed.
#[instrument(skip(pool))]
pub async fn delete_card(pool: &SqlitePool, id: &str) -> Result<bool> {
    sqlx::query("DELETE FROM showcase_stats WHERE card_id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    let result = sqlx::query("DELETE FROM cards WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Copy a card (own or showcase) into the user's collection.
#[instrument(skip(pool))]
pub async fn fork_card(pool: &SqlitePool, id: &str) -> Result<Card> {
    let source = get_card(pool, id).await?;
    let now = Utc::now();
    let forked = Card {
        id: Uuid::new_v4().to_string(),
        forked_from: Some(source.id.clone()),
        created_at: now,
        updated_at: now,
        ..source
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO cards (id, title, content, html_content, image_url, tags, author, category, forked_from, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&forked.id)
    .bind(&forked.title)
    .bind(&forked.content)
    .bind(&forked.html_content)
    .bind(&forked.image_url)
    .bind(encode_tags(&forked.tags))
    .bind(&forked.author)
    .bind(&forked.category)
    .bind(&forked.forked_from)
    .bind(forked.created_at)
    .bind(forked.updated_at)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE showcase_stats SET forks = forks + 1 WHERE card_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(source = %id, id = %forked.id, "card forked");
    Ok(forked)
}

pub async fn list_templates(pool: &SqlitePool) -> Result<Vec<CardTemplate>> {
    let rows = sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(CardTemplate::from).collect())
}

pub async fn get_template(pool: &SqlitePool, id: &str) -> Result<CardTemplate> {
    sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(CardTemplate::from)
        .ok_or_else(|| AppError::NotFound(format!("template {}", id)))
}

pub async fn list_showcase(pool: &SqlitePool) -> Result<Vec<ShowcaseCard>> {
    let rows = sqlx::query_as::<_, ShowcaseRow>(SHOWCASE_SELECT)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(ShowcaseCard::from).collect())
}

pub async fn get_showcase_card(pool: &SqlitePool, id: &str) -> Result<ShowcaseCard> {
    sqlx::query_as::<_, ShowcaseRow>(&format!("{} WHERE c.id = ?", SHOWCASE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(ShowcaseCard::from)
        .ok_or_else(|| AppError::NotFound(format!("showcase card {}", id)))
}

pub async fn record_view(pool: &SqlitePool, id: &str) -> Result<ShowcaseCard> {
    bump_counter(pool, id, "views").await
}

pub async fn record_like(pool: &SqlitePool, id: &str) -> Result<ShowcaseCard> {
    bump_counter(pool, id, "likes").await
}

async fn bump_counter(pool: &SqlitePool, id: &str, column: &'static str) -> Result<ShowcaseCard> {
    let result = sqlx::query(&format!(
        "UPDATE showcase_stats SET {col} = {col} + 1 WHERE card_id = ?",
        col = column
    ))
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("showcase card {}", id)));
    }
    get_showcase_card(pool, id).await
}

async fn seed(pool: &SqlitePool) -> Result<()> {
    let (templates,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM templates")
        .fetch_one(pool)
        .await?;
    if templates == 0 {
        for t in seed_templates() {
            sqlx::query(
                r#"
                INSERT INTO templates (id, name, description, html_template, preview_image, category, tags)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&t.id)
            .bind(&t.name)
            .bind(&t.description)
            .bind(&t.html_template)
            .bind(&t.preview_image)
            .bind(&t.category)
            .bind(encode_tags(&t.tags))
            .execute(pool)
            .await?;
        }
        info!("seeded card templates");
    }

    let (showcase,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM showcase_stats")
        .fetch_one(pool)
        .await?;
    if showcase == 0 {
        for sc in seed_showcase() {
            save_card(pool, &sc.card).await?;
            sqlx::query(
                "INSERT INTO showcase_stats (card_id, thumbnail_url, views, likes, forks) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&sc.card.id)
            .bind(&sc.thumbnail_url)
            .bind(sc.views)
            .bind(sc.likes)
            .bind(sc.forks)
            .execute(pool)
            .await?;
        }
        info!("seeded showcase cards");
    }
    Ok(())
}

fn seed_templates() -> Vec<CardTemplate> {
    let tpl = |id: &str, name: &str, description: &str, style: &str, category: &str, tags: &[&str]| CardTemplate {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        html_template: format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><style>{}</style></head>\
             <body><article class=\"card\"><h1>{{{{title}}}}</h1><section>{{{{content}}}}</section></article></body></html>",
            style
        ),
        preview_image: format!("/static/templates/{}.png", id),
        category: category.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    };
    vec![
        tpl(
            "modern-card",
            "Modern",
            "Gradient header with rounded corners",
            ".card{max-width:640px;margin:2rem auto;border-radius:16px;padding:2rem;\
             background:linear-gradient(135deg,#eef2ff,#fff);font-family:sans-serif}",
            "general",
            &["modern", "gradient"],
        ),
        tpl(
            "minimal-card",
            "Minimal",
            "Plain black on white",
            ".card{max-width:640px;margin:2rem auto;padding:2rem;font-family:serif;border:1px solid #ddd}",
            "general",
            &["minimal"],
        ),
        tpl(
            "poster-card",
            "Poster",
            "Bold, high-contrast event poster",
            ".card{max-width:640px;margin:2rem auto;padding:3rem;background:#111;color:#fafafa;\
             font-family:sans-serif}.card h1{font-size:3rem}",
            "poster",
            &["poster", "event"],
        ),
    ]
}

fn seed_showcase() -> Vec<ShowcaseCard> {
    let at = |y, m, d, h| Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap_or_else(Utc::now);
    let sc = |id: &str,
              title: &str,
              content: &str,
              tags: &[&str],
              author: &str,
              category: &str,
              created: DateTime<Utc>,
              (views, likes, forks): (i64, i64, i64)| ShowcaseCard {
        card: Card {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            html_content: format!(
                "<article class=\"card\"><h1>{}</h1><p>{}</p></article>",
                html_escape::encode_text(title),
                html_escape::encode_text(content)
            ),
            image_url: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            author: Some(author.into()),
            category: Some(category.into()),
            forked_from: None,
            created_at: created,
            updated_at: created,
        },
        thumbnail_url: format!("/static/showcase/{}.png", id),
        views,
        likes,
        forks,
    };
    vec![
        sc(
            "showcase-summer-launch",
            "Summer product launch",
            "Cool down this summer: join us for the new collection launch.",
            &["marketing", "launch"],
            "Brand team",
            "poster",
            at(2024, 7, 20, 10),
            (12000, 2300, 450),
        ),
        sc(
            "showcase-kyoto-trip",
            "My Kyoto trip",
            "From Kiyomizu-dera to Kinkaku-ji, every moment worth keeping.",
            &["travel", "japan"],
            "traveller",
            "sharing",
            at(2024, 7, 19, 14),
            (8900, 1800, 320),
        ),
        sc(
            "showcase-weekly-report",
            "Weekly report",
            "Shipped the export pipeline, fixed three regressions, planned Q3.",
            &["office", "report"],
            "pm",
            "office",
            at(2024, 7, 22, 9),
            (3100, 420, 610),
        ),
    ]
}
