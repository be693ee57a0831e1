//! Accent- and punctuation-insensitive place search.
//!
//! A query is matched twice: once against the lowercased raw name, so typing
//! the exact characters ("St-A") ranks "St-André" above "St. André", and once
//! against the normalized key as a fallback ("st andre" still finds both).

use crate::context::AppContext;
use crate::types::{Category, Place, PlaceId};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static SAINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsaint\b").unwrap());
static SAINTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsainte\b").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase and drop combining marks (U+0300..U+036F) after NFD.
pub fn fold_accents(s: &str) -> String {
    s.to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

fn collapse_saints(s: &str) -> String {
    let s = SAINT.replace_all(s, "st");
    SAINTE.replace_all(&s, "ste").into_owned()
}

/// Search key for fuzzy matching. Idempotent.
pub fn normalize(s: &str) -> String {
    let s = collapse_saints(&fold_accents(s));
    let s: String = s
        .chars()
        .filter(|c| *c != '\'' && *c != '.')
        .map(|c| if c == '-' { ' ' } else { c })
        .collect();
    // Stripping punctuation can join a new "saint" ("sain.te").
    let s = collapse_saints(&s);
    WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Strength of a match; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "u8")]
pub enum MatchScore {
    NormalizedSubstring = 40,
    NormalizedPrefix = 60,
    RawSubstring = 80,
    RawPrefix = 100,
}

impl From<MatchScore> for u8 {
    fn from(score: MatchScore) -> u8 {
        score as u8
    }
}

/// A query in both of its matched forms.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub raw: String,
    pub flat: String,
}

impl SearchQuery {
    pub fn new(input: &str) -> Self {
        Self { raw: input.to_lowercase(), flat: normalize(input) }
    }

    pub fn score(&self, place: &Place) -> Option<MatchScore> {
        let raw_name = place.name.to_lowercase();
        if raw_name.starts_with(&self.raw) {
            Some(MatchScore::RawPrefix)
        } else if raw_name.contains(&self.raw) {
            Some(MatchScore::RawSubstring)
        } else if place.search_key.starts_with(&self.flat) {
            Some(MatchScore::NormalizedPrefix)
        } else if place.search_key.contains(&self.flat) {
            Some(MatchScore::NormalizedSubstring)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: PlaceId,
    pub name: String,
    pub province: String,
    pub category: Category,
    pub score: MatchScore,
}

/// Alphabetical order ignoring case and accents, raw text as tie-break.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    fold_accents(a).cmp(&fold_accents(b)).then_with(|| a.cmp(b))
}

/// Rank places against free text: score, then category precedence, then name.
pub fn search(ctx: &AppContext, input: &str) -> Vec<SearchHit> {
    let settings = &ctx.config.search;
    if input.chars().count() < settings.min_query_len {
        return Vec::new();
    }
    let query = SearchQuery::new(input);
    if query.flat.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<(MatchScore, &Place)> = ctx
        .places
        .iter()
        .filter(|p| p.search_key.contains(&query.flat))
        .filter_map(|p| query.score(p).map(|score| (score, p)))
        .collect();

    hits.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| compare_names(&a.name, &b.name))
    });
    hits.truncate(settings.limit);

    tracing::debug!("search {:?} -> {} hits", input, hits.len());

    hits.into_iter()
        .map(|(score, p)| SearchHit {
            id: p.id,
            name: p.name.clone(),
            province: p.province.clone(),
            category: p.category,
            score,
        })
        .collect()
}
