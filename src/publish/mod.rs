// src/publish/mod.rs
pub mod hf;

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::ingest::types::Category;
use crate::storage::LogHandle;

/// Remote dataset store (a Hugging Face-like hub).
#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    async fn repo_exists(&self, repo_id: &str) -> Result<bool>;
    async fn create_repo(&self, repo_id: &str) -> Result<()>;
    /// Replace `remote_path` in the repo with the bytes of `local_path`.
    async fn upload_file(&self, local_path: &Path, repo_id: &str, remote_path: &str) -> Result<()>;
    /// Owner of the credentials, used when no namespace is configured.
    async fn default_namespace(&self) -> Result<String> {
        Err(anyhow!("no namespace configured and the store cannot resolve one"))
    }
}

/// Mirrors category logs to `<namespace>/news-<category>-dataset`.
#[derive(Clone)]
pub struct SyncPublisher {
    store: Arc<dyn DatasetStore>,
    /// Empty until first use when not configured; filled from the store then.
    namespace: Arc<OnceCell<String>>,
}

impl SyncPublisher {
    /// An empty `namespace` is resolved through the store on first publish.
    pub fn new(store: Arc<dyn DatasetStore>, namespace: impl Into<String>) -> Self {
        let namespace: String = namespace.into();
        let namespace = namespace.trim();
        let cell = if namespace.is_empty() {
            OnceCell::new()
        } else {
            OnceCell::new_with(Some(namespace.to_string()))
        };
        Self {
            store,
            namespace: Arc::new(cell),
        }
    }

    pub async fn namespace(&self) -> Result<&str> {
        let ns = self
            .namespace
            .get_or_try_init(|| async {
                let ns = self
                    .store
                    .default_namespace()
                    .await
                    .context("resolving hub namespace")?;
                tracing::info!(target: "publish", namespace = %ns, "hub namespace resolved");
                Ok::<_, anyhow::Error>(ns)
            })
            .await?;
        Ok(ns.as_str())
    }

    pub async fn repo_id(&self, category: Category) -> Result<String> {
        Ok(repo_id_for(self.namespace().await?, category))
    }

    pub fn remote_path(category: Category) -> String {
        format!("{}.jsonl", category.as_str())
    }

    /// Returns the repo id, creating the repo when the store does not have it.
    pub async fn ensure_remote_repo(&self, category: Category) -> Result<String> {
        let repo_id = self.repo_id(category).await?;
        let exists = self
            .store
            .repo_exists(&repo_id)
            .await
            .with_context(|| format!("checking {repo_id}"))?;
        if !exists {
            self.store
                .create_repo(&repo_id)
                .await
                .with_context(|| format!("creating {repo_id}"))?;
            tracing::info!(target: "publish", %category, repo = %repo_id, "created dataset repo");
        }
        Ok(repo_id)
    }

    /// Uploads the whole local log, replacing the remote copy.
    pub async fn publish(&self, category: Category, handle: &LogHandle) -> Result<()> {
        let repo_id = self.ensure_remote_repo(category).await?;
        let remote = Self::remote_path(category);
        match self.store.upload_file(&handle.path, &repo_id, &remote).await {
            Ok(()) => {
                tracing::info!(target: "publish", %category, repo = %repo_id, path = %remote, "uploaded");
                Ok(())
            }
            Err(e) => {
                counter!("publish_errors_total").increment(1);
                Err(e).with_context(|| format!("uploading {remote} to {repo_id}"))
            }
        }
    }
}

pub fn repo_id_for(namespace: &str, category: Category) -> String {
    format!("{}/news-{}-dataset", namespace, category.as_str())
}
