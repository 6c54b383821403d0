// src/storage.rs
//! Per-category JSONL logs with destructive size rotation.

use anyhow::{Context, Result};
use metrics::counter;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::ingest::types::{Article, Category};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 90 * 1024 * 1024;

/// Where a category's records go for the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    pub category: Category,
    pub path: PathBuf,
    /// True if `prepare` discarded the previous log.
    pub rotated: bool,
}

#[derive(Debug, Clone)]
pub struct StorageManager {
    data_dir: PathBuf,
    max_file_size: u64,
}

impl StorageManager {
    pub fn new(data_dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_file_size,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_path(&self, category: Category) -> PathBuf {
        self.data_dir.join(format!("{}.jsonl", category.as_str()))
    }

    /// Deletes the log when it is at or above the threshold. History is
    /// discarded, not archived.
    pub async fn prepare(&self, category: Category) -> Result<LogHandle> {
        fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("creating data dir {}", self.data_dir.display()))?;

        let path = self.log_path(category);
        let size = match fs::metadata(&path).await {
            Ok(m) => Some(m.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
        };

        let mut rotated = false;
        if let Some(size) = size {
            if size >= self.max_file_size {
                fs::remove_file(&path)
                    .await
                    .with_context(|| format!("rotating {}", path.display()))?;
                rotated = true;
                counter!("storage_rotations_total").increment(1);
                tracing::info!(
                    target: "storage",
                    %category,
                    size,
                    threshold = self.max_file_size,
                    "log over threshold, discarded"
                );
            }
        }

        Ok(LogHandle {
            category,
            path,
            rotated,
        })
    }

    /// Appends one JSON line per record. Returns the number of lines written.
    pub async fn append(&self, handle: &LogHandle, records: &[Article]) -> Result<usize> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&handle.path)
            .await
            .with_context(|| format!("opening {} for append", handle.path.display()))?;

        for rec in records {
            // One write per line keeps a crash down to a single torn line.
            let mut line = serde_json::to_vec(rec).context("serializing article")?;
            line.push(b'\n');
            file.write_all(&line)
                .await
                .with_context(|| format!("appending to {}", handle.path.display()))?;
        }
        file.flush().await.context("flushing category log")?;
        file.sync_data().await.context("syncing category log")?;

        tracing::debug!(
            target: "storage",
            category = %handle.category,
            written = records.len(),
            "appended"
        );
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(link: &str, title: &str) -> Article {
        Article {
            title: title.into(),
            link: link.into(),
            summary: String::new(),
            content: String::new(),
            language: None,
            category: Category::Tech,
            source: "https://example.test/rss".into(),
            published: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn below_threshold_appends_to_existing() {
        let dir = tempfile::tempdir().unwrap();
        let sm = StorageManager::new(dir.path(), 1024 * 1024);

        let h = sm.prepare(Category::Tech).await.unwrap();
        sm.append(&h, &[article("https://a.test/1", "one")]).await.unwrap();
        let h = sm.prepare(Category::Tech).await.unwrap();
        assert!(!h.rotated);
        sm.append(&h, &[article("https://a.test/2", "two")]).await.unwrap();

        let raw = std::fs::read_to_string(sm.log_path(Category::Tech)).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn at_threshold_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let sm = StorageManager::new(dir.path(), 64);
        std::fs::write(sm.log_path(Category::Tech), vec![b'x'; 64]).unwrap();

        let h = sm.prepare(Category::Tech).await.unwrap();
        assert!(h.rotated);
        assert!(!h.path.exists());
    }

    #[tokio::test]
    async fn non_ascii_is_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let sm = StorageManager::new(dir.path(), DEFAULT_MAX_FILE_SIZE);
        let h = sm.prepare(Category::Tech).await.unwrap();
        sm.append(&h, &[article("https://a.test/ü", "Zürich – naïve café")])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&h.path).unwrap();
        assert!(raw.contains("Zürich – naïve café"));
        assert!(!raw.contains("\\u"));
        assert!(raw.ends_with('\n'));
    }
}
