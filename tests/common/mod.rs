// tests/common/mod.rs
// Shared mock collaborators for the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use news_dataset_pipeline::ingest::types::{ArticleExtractor, FeedEntry, FeedFetcher, LanguageDetector};
use news_dataset_pipeline::publish::DatasetStore;

pub fn entry(link: &str, title: &str) -> FeedEntry {
    FeedEntry {
        title: Some(title.to_string()),
        link: Some(link.to_string()),
        summary: Some(format!("Summary of {title}")),
        published: Some("Tue, 10 Jun 2025 04:00:00 GMT".to_string()),
    }
}

#[derive(Clone)]
pub enum Feed {
    Entries(Vec<FeedEntry>),
    Error(String),
    Hang,
    /// Simulates a collaborator bug.
    Panic,
}

/// Feed fetcher driven by a url → behaviour table. Counts calls per url.
#[derive(Default)]
pub struct ScriptedFeeds {
    feeds: Mutex<HashMap<String, Feed>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, feed: Feed) -> Self {
        self.set(url, feed);
        self
    }

    pub fn set(&self, url: &str, feed: Feed) {
        self.feeds.lock().unwrap().insert(url.to_string(), feed);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFeeds {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let feed = self.feeds.lock().unwrap().get(url).cloned();
        match feed {
            Some(Feed::Entries(v)) => Ok(v),
            Some(Feed::Error(msg)) => Err(anyhow!(msg)),
            Some(Feed::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(vec![])
            }
            Some(Feed::Panic) => panic!("feed parser bug for {url}"),
            None => Err(anyhow!("dns error: no such host")),
        }
    }
}

pub struct FailingExtractor;

#[async_trait]
impl ArticleExtractor for FailingExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        Err(anyhow!("403 Forbidden for {url}"))
    }
}

pub struct FixedExtractor(pub &'static str);

#[async_trait]
impl ArticleExtractor for FixedExtractor {
    async fn extract(&self, _url: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Says "en" for anything mentioning "Summary", otherwise gives up.
pub struct SummaryAwareDetector;

impl LanguageDetector for SummaryAwareDetector {
    fn detect(&self, text: &str) -> Option<String> {
        text.contains("Summary").then(|| "en".to_string())
    }
}

pub struct NeverDetects;

impl LanguageDetector for NeverDetects {
    fn detect(&self, _text: &str) -> Option<String> {
        None
    }
}

/// In-memory dataset store; uploads to repos listed in `fail_uploads_for` error out.
#[derive(Default)]
pub struct MemoryStore {
    pub repos: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub fail_uploads_for: Vec<String>,
    /// Answer for namespace lookups; `None` makes the lookup fail.
    pub owner: Option<String>,
}

impl MemoryStore {
    pub fn failing_for(repo_ids: &[&str]) -> Self {
        Self {
            fail_uploads_for: repo_ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn uploaded_repos(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _, _)| r.clone())
            .collect()
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn repo_exists(&self, repo_id: &str) -> Result<bool> {
        Ok(self.repos.lock().unwrap().iter().any(|r| r == repo_id))
    }

    async fn create_repo(&self, repo_id: &str) -> Result<()> {
        self.repos.lock().unwrap().push(repo_id.to_string());
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, repo_id: &str, remote_path: &str) -> Result<()> {
        if self.fail_uploads_for.iter().any(|r| r == repo_id) {
            return Err(anyhow!("simulated network error: connection reset"));
        }
        let bytes = std::fs::read(local_path)?;
        self.uploads
            .lock()
            .unwrap()
            .push((repo_id.to_string(), remote_path.to_string(), bytes));
        Ok(())
    }

    async fn default_namespace(&self) -> Result<String> {
        self.owner
            .clone()
            .ok_or_else(|| anyhow!("hub whoami: connection refused"))
    }
}
