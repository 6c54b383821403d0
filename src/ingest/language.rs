// src/ingest/language.rs
//! Stop-word profile language detection.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};

use crate::ingest::types::LanguageDetector;

pub const UNKNOWN_LANGUAGE: &str = "unknown";

static PROFILES: Lazy<BTreeMap<String, HashSet<String>>> = Lazy::new(|| {
    let raw = include_str!("../../lang_stopwords.json");
    let lists: BTreeMap<String, Vec<String>> =
        serde_json::from_str(raw).expect("valid stop-word profiles");
    lists
        .into_iter()
        .map(|(lang, words)| (lang, words.into_iter().collect()))
        .collect()
});

/// Picks the language whose stop words cover the text best. Gives up when the
/// text is too short or two profiles score too close to call.
#[derive(Debug, Clone)]
pub struct StopwordDetector {
    min_hits: usize,
    min_margin: f32,
}

impl StopwordDetector {
    pub fn new() -> Self {
        Self {
            min_hits: 3,
            min_margin: 1.3,
        }
    }

    /// (language, hits) sorted by hits descending, then code ascending.
    fn score(&self, text: &str) -> Vec<(&'static str, usize)> {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut scores: Vec<(&'static str, usize)> = PROFILES
            .iter()
            .map(|(lang, words)| {
                let hits = tokens.iter().filter(|t| words.contains(t.as_str())).count();
                (lang.as_str(), hits)
            })
            .collect();
        scores.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        scores
    }
}

impl Default for StopwordDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for StopwordDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let scores = self.score(text);
        let (best_lang, best) = *scores.first()?;
        let second = scores.get(1).map(|s| s.1).unwrap_or(0);

        if best < self.min_hits || (best as f32) < (second as f32) * self.min_margin {
            return None;
        }
        Some(best_lang.to_string())
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
