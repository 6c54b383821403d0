// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::health::DEFAULT_MAX_FEED_FAILURES;
use crate::ingest::providers::rss::DEFAULT_USER_AGENT;
use crate::ingest::types::Category;
use crate::ingest::{FetchSettings, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_ENTRIES_PER_SOURCE};
use crate::storage::DEFAULT_MAX_FILE_SIZE;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_PIPELINE_DATA_DIR: &str = "PIPELINE_DATA_DIR";
pub const ENV_PIPELINE_STATE_DIR: &str = "PIPELINE_STATE_DIR";
pub const ENV_HF_NAMESPACE: &str = "HF_NAMESPACE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySources {
    pub name: Category,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub state_dir: PathBuf,
    /// Rotation threshold for each category log.
    pub max_file_size_bytes: u64,
    pub max_feed_failures: u32,
    pub max_entries_per_source: usize,
    /// Bound on each feed fetch and each article extraction.
    pub fetch_timeout_secs: u64,
    pub extract_full_text: bool,
    pub detect_language: bool,
    /// Mirror logs to the hub. Requires `HF_TOKEN`.
    pub publish: bool,
    /// Hub user/org owning the dataset repos. Empty: ask the hub who the token belongs to.
    pub hf_namespace: String,
    pub user_agent: String,
    pub categories: Vec<CategorySources>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            state_dir: PathBuf::from("state"),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            max_feed_failures: DEFAULT_MAX_FEED_FAILURES,
            max_entries_per_source: DEFAULT_MAX_ENTRIES_PER_SOURCE,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            extract_full_text: true,
            detect_language: true,
            publish: true,
            hf_namespace: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            categories: default_categories(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        Ok(cfg.with_env_overrides().sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $PIPELINE_CONFIG_PATH
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("PIPELINE_CONFIG_PATH points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::default().with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = non_empty_env(ENV_PIPELINE_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env(ENV_PIPELINE_STATE_DIR) {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env(ENV_HF_NAMESPACE) {
            self.hf_namespace = v;
        }
        self
    }

    /// Zero thresholds fall back to defaults; sources are trimmed and
    /// deduplicated (first occurrence wins); repeated categories are merged.
    pub fn sanitized(mut self) -> Self {
        if self.max_file_size_bytes == 0 {
            self.max_file_size_bytes = DEFAULT_MAX_FILE_SIZE;
        }
        if self.max_feed_failures == 0 {
            self.max_feed_failures = DEFAULT_MAX_FEED_FAILURES;
        }
        if self.max_entries_per_source == 0 {
            self.max_entries_per_source = DEFAULT_MAX_ENTRIES_PER_SOURCE;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = DEFAULT_FETCH_TIMEOUT_SECS;
        }
        self.hf_namespace = self.hf_namespace.trim().to_string();

        let mut merged: Vec<CategorySources> = Vec::new();
        for cat in std::mem::take(&mut self.categories) {
            match merged.iter_mut().find(|c| c.name == cat.name) {
                Some(existing) => existing.sources.extend(cat.sources),
                None => merged.push(cat),
            }
        }
        for cat in &mut merged {
            cat.sources = clean_sources(std::mem::take(&mut cat.sources));
        }
        self.categories = merged;
        self
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_entries_per_source: self.max_entries_per_source,
            fetch_timeout: self.fetch_timeout(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_sources(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    out
}

/// Built-in feed table, used when no config file is present.
pub fn default_categories() -> Vec<CategorySources> {
    let table: [(Category, &[&str]); 5] = [
        (
            Category::Tech,
            &[
                "https://www.theverge.com/rss/index.xml",
                "https://www.wired.com/feed/rss",
                "https://techcrunch.com/feed/",
                "https://arstechnica.com/feed/",
            ],
        ),
        (
            Category::Finance,
            &[
                "https://feeds.bloomberg.com/markets/news.rss",
                "https://www.reuters.com/finance/rss",
                "https://www.ft.com/rss/home",
            ],
        ),
        (
            Category::Education,
            &[
                "https://www.sciencedaily.com/rss/education_learning.xml",
                "https://medium.com/feed/tag/education",
            ],
        ),
        (
            Category::Entertainment,
            &["https://variety.com/feed/", "https://deadline.com/feed/"],
        ),
        (
            Category::Politics,
            &[
                "https://feeds.bbci.co.uk/news/world/rss.xml",
                "https://www.reuters.com/world/rss",
                "https://www.theguardian.com/world/rss",
            ],
        ),
    ];

    table
        .iter()
        .map(|(name, urls)| CategorySources {
            name: *name,
            sources: urls.iter().map(|u| u.to_string()).collect(),
        })
        .collect()
}
