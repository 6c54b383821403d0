// src/ingest/mod.rs
pub mod language;
pub mod providers;
pub mod types;

use crate::dedup::{DedupIndex, Fingerprint};
use crate::health::HealthTracker;
use crate::ingest::language::UNKNOWN_LANGUAGE;
use crate::ingest::types::{
    Article, ArticleExtractor, Category, FeedEntry, FeedFetcher, LanguageDetector,
};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_ENTRIES_PER_SOURCE: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_articles_total",
            "New articles accepted into a category batch."
        );
        describe_counter!(
            "ingest_duplicates_total",
            "Entries dropped because their link was already seen."
        );
        describe_counter!(
            "ingest_sources_failed_total",
            "Feed fetches that errored, timed out or returned no entries."
        );
        describe_counter!(
            "ingest_sources_skipped_total",
            "Feeds skipped because they are disabled by health tracking."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(&decoded, " ");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// `clean_text` plus a 1500-char cap, for feed-supplied summaries.
pub fn clean_summary(s: &str) -> String {
    let out = clean_text(s);
    if out.chars().count() > 1500 {
        out.chars().take(1500).collect()
    } else {
        out
    }
}

/// RFC 2822 (RSS) and RFC 3339 (Atom) dates become RFC 3339 UTC; anything
/// else is kept verbatim since the field is best-effort.
pub fn normalize_published(raw: &str) -> String {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .unwrap_or_else(|_| raw.to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub max_entries_per_source: usize,
    pub fetch_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_entries_per_source: DEFAULT_MAX_ENTRIES_PER_SOURCE,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

/// What happened to a single source this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Disabled by health tracking; no fetch attempted.
    Skipped,
    /// Fetch errored, timed out or returned zero entries.
    Failed { reason: String },
    Fetched {
        accepted: usize,
        duplicates: usize,
        missing_link: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
}

/// Output of one category's fetch stage.
#[derive(Debug, Clone, Default)]
pub struct CategoryBatch {
    pub articles: Vec<Article>,
    pub sources: Vec<SourceReport>,
}

impl CategoryBatch {
    pub fn count_where(&self, pred: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.sources.iter().filter(|s| pred(&s.outcome)).count()
    }

    pub fn duplicates(&self) -> usize {
        self.sources
            .iter()
            .map(|s| match s.outcome {
                SourceOutcome::Fetched { duplicates, .. } => duplicates,
                _ => 0,
            })
            .sum()
    }
}

/// Walks a category's sources, applying feed health and dedup, and builds
/// article records.
pub struct FetchOrchestrator {
    feeds: Arc<dyn FeedFetcher>,
    extractor: Option<Arc<dyn ArticleExtractor>>,
    detector: Option<Arc<dyn LanguageDetector>>,
    settings: FetchSettings,
}

impl FetchOrchestrator {
    pub fn new(feeds: Arc<dyn FeedFetcher>, settings: FetchSettings) -> Self {
        Self {
            feeds,
            extractor: None,
            detector: None,
            settings,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArticleExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub async fn fetch_category(
        &self,
        category: Category,
        sources: &[String],
        health: &mut HealthTracker,
        seen: &mut DedupIndex,
    ) -> CategoryBatch {
        ensure_metrics_described();

        let mut batch = CategoryBatch::default();
        for source in sources {
            let outcome = self
                .fetch_source(category, source, health, seen, &mut batch.articles)
                .await;
            batch.sources.push(SourceReport {
                source: source.clone(),
                outcome,
            });
        }
        batch
    }

    async fn fetch_source(
        &self,
        category: Category,
        source: &str,
        health: &mut HealthTracker,
        seen: &mut DedupIndex,
        out: &mut Vec<Article>,
    ) -> SourceOutcome {
        if !health.is_eligible(source) {
            tracing::warn!(target: "ingest", %category, source, failures = health.failures(source), "skipped unhealthy feed");
            counter!("ingest_sources_skipped_total").increment(1);
            return SourceOutcome::Skipped;
        }

        let entries = match tokio::time::timeout(self.settings.fetch_timeout, self.feeds.fetch(source)).await {
            Ok(Ok(v)) if !v.is_empty() => v,
            Ok(Ok(_)) => return self.fail(health, category, source, "feed returned no entries".into()),
            Ok(Err(e)) => return self.fail(health, category, source, format!("{e:#}")),
            Err(_) => {
                let reason = format!("timed out after {}s", self.settings.fetch_timeout.as_secs());
                return self.fail(health, category, source, reason);
            }
        };
        health.record_success(source);

        let mut accepted = 0usize;
        let mut duplicates = 0usize;
        let mut missing_link = 0usize;

        for entry in entries.into_iter().take(self.settings.max_entries_per_source) {
            let link = match entry.link.as_deref().map(str::trim) {
                Some(l) if !l.is_empty() => l.to_string(),
                _ => {
                    missing_link += 1;
                    continue;
                }
            };

            let fp = Fingerprint::of_link(&link);
            if seen.contains(&fp) {
                duplicates += 1;
                continue;
            }

            let article = self.build_article(category, source, link, entry).await;
            seen.add(fp);
            out.push(article);
            accepted += 1;
        }

        counter!("ingest_articles_total").increment(accepted as u64);
        counter!("ingest_duplicates_total").increment(duplicates as u64);
        tracing::info!(target: "ingest", %category, source, accepted, duplicates, missing_link, "feed fetched");

        SourceOutcome::Fetched {
            accepted,
            duplicates,
            missing_link,
        }
    }

    fn fail(
        &self,
        health: &mut HealthTracker,
        category: Category,
        source: &str,
        reason: String,
    ) -> SourceOutcome {
        health.record_failure(source);
        counter!("ingest_sources_failed_total").increment(1);
        tracing::warn!(
            target: "ingest",
            %category,
            source,
            failures = health.failures(source),
            reason = %reason,
            "feed failed"
        );
        SourceOutcome::Failed { reason }
    }

    async fn build_article(
        &self,
        category: Category,
        source: &str,
        link: String,
        entry: FeedEntry,
    ) -> Article {
        let summary = entry.summary.as_deref().map(clean_summary).unwrap_or_default();
        let content = self.extract(&link).await;

        let language = self.detector.as_ref().map(|d| {
            let basis = if content.is_empty() { &summary } else { &content };
            d.detect(basis)
                .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
        });

        Article {
            title: entry.title.as_deref().map(clean_text).unwrap_or_default(),
            link,
            summary,
            content,
            language,
            category,
            source: source.to_string(),
            published: entry.published.as_deref().map(normalize_published),
            fetched_at: Utc::now(),
        }
    }

    /// Never fails: errors and timeouts degrade to empty text.
    async fn extract(&self, link: &str) -> String {
        let Some(extractor) = &self.extractor else {
            return String::new();
        };
        match tokio::time::timeout(self.settings.fetch_timeout, extractor.extract(link)).await {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(e)) => {
                tracing::debug!(target: "ingest", link, error = %format!("{e:#}"), "extraction failed, using summary");
                String::new()
            }
            Err(_) => {
                tracing::debug!(target: "ingest", link, "extraction timed out, using summary");
                String::new()
            }
        }
    }
}
