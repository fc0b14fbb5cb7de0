//! Gallery filtering and ordering.
use std::cmp::Reverse;

use crate::models::{ShowcaseCard, ShowcaseQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Recommended,
    Popularity,
    Latest,
}

impl SortBy {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("popularity") => SortBy::Popularity,
            Some("latest") => SortBy::Latest,
            _ => SortBy::Recommended,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Recommended => "recommended",
            SortBy::Popularity => "popularity",
            SortBy::Latest => "latest",
        }
    }
}

pub const SORT_OPTIONS: [(&str, SortBy); 3] = [
    ("Recommended", SortBy::Recommended),
    ("Most popular", SortBy::Popularity),
    ("Latest", SortBy::Latest),
];

fn recommended_score(card: &ShowcaseCard) -> i64 {
    card.likes + card.views + card.forks * 2
}

fn popularity_score(card: &ShowcaseCard) -> i64 {
    card.likes + card.views
}

fn is_all_categories(category: &str) -> bool {
    category.is_empty() || category.eq_ignore_ascii_case("all") || category == "全部"
}

pub fn filter_and_sort(mut cards: Vec<ShowcaseCard>, query: &ShowcaseQuery) -> Vec<ShowcaseCard> {
    if let Some(term) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let term = term.to_lowercase();
        cards.retain(|c| {
            c.card.title.to_lowercase().contains(&term)
                || c.card.tags.iter().any(|t| t.to_lowercase().contains(&term))
        });
    }

    if let Some(category) = query.category.as_deref().map(str::trim) {
        if !is_all_categories(category) {
            cards.retain(|c| c.card.category.as_deref() == Some(category));
        }
    }

    match SortBy::parse(query.sort.as_deref()) {
        SortBy::Recommended => cards.sort_by_key(|c| Reverse(recommended_score(c))),
        SortBy::Popularity => cards.sort_by_key(|c| Reverse(popularity_score(c))),
        SortBy::Latest => cards.sort_by_key(|c| Reverse(c.card.created_at)),
    }
    cards
}

/// Distinct categories in first-seen order.
pub fn categories(cards: &[ShowcaseCard]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for category in cards.iter().filter_map(|c| c.card.category.as_ref()) {
        if !out.contains(category) {
            out.push(category.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Card;
    use chrono::{Duration, Utc};

    fn sc(id: &str, category: &str, tags: &[&str], (views, likes, forks): (i64, i64, i64), age_days: i64) -> ShowcaseCard {
        let created = Utc::now() - Duration::days(age_days);
        ShowcaseCard {
            card: Card {
                id: id.into(),
                title: format!("Title {}", id),
                content: String::new(),
                html_content: String::new(),
                image_url: None,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                author: None,
                category: Some(category.into()),
                forked_from: None,
                created_at: created,
                updated_at: created,
            },
            thumbnail_url: String::new(),
            views,
            likes,
            forks,
        }
    }

    fn ids(cards: &[ShowcaseCard]) -> Vec<&str> {
        cards.iter().map(|c| c.card.id.as_str()).collect()
    }

    fn fixture() -> Vec<ShowcaseCard> {
        vec![
            sc("a", "poster", &["Launch"], (100, 10, 0), 3),
            sc("b", "office", &["report"], (90, 10, 20), 1),
            sc("c", "poster", &["travel"], (200, 50, 0), 5),
        ]
    }

    #[test]
    fn recommended_weights_forks_double() {
        let out = filter_and_sort(fixture(), &ShowcaseQuery::default());
        assert_eq!(ids(&out), vec!["c", "b", "a"]);
    }

    #[test]
    fn popularity_ignores_forks() {
        let q = ShowcaseQuery { sort: Some("popularity".into()), ..Default::default() };
        let out = filter_and_sort(fixture(), &q);
        assert_eq!(ids(&out), vec!["c", "a", "b"]);
    }

    #[test]
    fn latest_first() {
        let q = ShowcaseQuery { sort: Some("latest".into()), ..Default::default() };
        assert_eq!(ids(&filter_and_sort(fixture(), &q)), vec!["b", "a", "c"]);
    }

    #[test]
    fn search_matches_title_or_tag_case_insensitive() {
        let q = ShowcaseQuery { q: Some("launch".into()), ..Default::default() };
        assert_eq!(ids(&filter_and_sort(fixture(), &q)), vec!["a"]);
        let q = ShowcaseQuery { q: Some("TITLE B".into()), ..Default::default() };
        assert_eq!(ids(&filter_and_sort(fixture(), &q)), vec!["b"]);
    }

    #[test]
    fn category_filter_and_all() {
        let q = ShowcaseQuery { category: Some("poster".into()), ..Default::default() };
        assert_eq!(ids(&filter_and_sort(fixture(), &q)), vec!["c", "a"]);
        let q = ShowcaseQuery { category: Some("all".into()), ..Default::default() };
        assert_eq!(filter_and_sort(fixture(), &q).len(), 3);
    }

    #[test]
    fn unknown_sort_falls_back_to_recommended() {
        assert_eq!(SortBy::parse(Some("random")), SortBy::Recommended);
    }

    #[test]
    fn categories_are_distinct() {
        assert_eq!(categories(&fixture()), vec!["poster", "office"]);
    }
}
