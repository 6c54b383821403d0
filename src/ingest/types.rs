// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed set of dataset categories. Serialized lowercase (`"tech"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Finance,
    Education,
    Entertainment,
    Politics,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Tech,
        Category::Finance,
        Category::Education,
        Category::Entertainment,
        Category::Politics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Finance => "finance",
            Category::Education => "education",
            Category::Entertainment => "entertainment",
            Category::Politics => "politics",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry as handed back by a feed collaborator. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub published: Option<String>,
}

/// One ingested item, written as a single JSON line to the category log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub summary: String,
    /// Extracted full text; empty when extraction is off or failed.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub category: Category,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Feed collaborator: turns a feed URL into its entries, newest first.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>>;
}

/// Full-article extraction collaborator.
#[async_trait::async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<String>;
}

/// Language detection collaborator. `None` means ambiguous or undetectable.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}
