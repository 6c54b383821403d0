// src/state.rs
//! End-of-run snapshot of the feed health counters and the dedup index.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::dedup::{DedupIndex, Fingerprint};
use crate::health::HealthTracker;

pub const SEEN_URLS_FILE: &str = "seen_urls.json";
pub const FEED_HEALTH_FILE: &str = "feed_health.json";

/// Mutable state carried across runs. Owned by the pipeline driver.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub health: HealthTracker,
    pub seen: DedupIndex,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn seen_path(&self) -> PathBuf {
        self.dir.join(SEEN_URLS_FILE)
    }

    pub fn health_path(&self) -> PathBuf {
        self.dir.join(FEED_HEALTH_FILE)
    }

    /// Missing files mean a first run. Unreadable files are an error; files
    /// that read fine but do not parse are logged and treated as empty.
    pub async fn load(&self, max_failures: u32) -> Result<PipelineState> {
        let seen: Vec<Fingerprint> = read_json_or_default(&self.seen_path()).await?;
        let counts: HashMap<String, u32> = read_json_or_default(&self.health_path()).await?;

        tracing::debug!(
            target: "pipeline",
            seen = seen.len(),
            tracked_sources = counts.len(),
            "state loaded"
        );

        Ok(PipelineState {
            health: HealthTracker::from_counts(counts, max_failures),
            seen: seen.into_iter().collect(),
        })
    }

    pub async fn persist(&self, state: &PipelineState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating state dir {}", self.dir.display()))?;

        let seen = serde_json::to_vec(&state.seen.snapshot()).context("serializing seen urls")?;
        write_atomic(&self.seen_path(), &seen).await?;

        let health = serde_json::to_vec_pretty(&state.health.snapshot())
            .context("serializing feed health")?;
        write_atomic(&self.health_path(), &health).await?;
        Ok(())
    }
}

async fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(v),
        Err(e) => {
            tracing::warn!(target: "pipeline", path = %path.display(), error = %e, "state file unparsable, starting empty");
            Ok(T::default())
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}
