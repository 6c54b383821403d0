// src/publish/hf.rs
//! Hugging Face Hub client: dataset repo lookup/creation and single-file
//! commits, with the Git LFS batch path for files the Hub wants in LFS.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::DatasetStore;

pub const ENV_HF_TOKEN: &str = "HF_TOKEN";
pub const ENV_HF_ENDPOINT: &str = "HF_ENDPOINT";
pub const DEFAULT_HF_ENDPOINT: &str = "https://huggingface.co";

const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";
const SAMPLE_BYTES: usize = 512;

pub struct HfHubClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HfHubClient {
    pub fn new(token: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-dataset-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()
            .context("building hub http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Requires `HF_TOKEN`; `HF_ENDPOINT` overrides the hub URL.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(ENV_HF_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("{ENV_HF_TOKEN} not set"))?;
        let endpoint =
            std::env::var(ENV_HF_ENDPOINT).unwrap_or_else(|_| DEFAULT_HF_ENDPOINT.to_string());
        Self::new(token.trim(), endpoint)
    }

    /// Account name the token belongs to; used when no namespace is configured.
    pub async fn whoami(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct WhoAmI {
            name: String,
        }
        let resp = self
            .http
            .get(self.api("whoami-v2"))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("hub whoami")?;
        let who: WhoAmI = check(resp, "whoami").await?.json().await.context("whoami body")?;
        Ok(who.name)
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/{}", self.endpoint, path)
    }

    async fn preupload_mode(&self, repo_id: &str, remote_path: &str, bytes: &[u8]) -> Result<UploadMode> {
        #[derive(Deserialize)]
        struct Resp {
            files: Vec<FileMode>,
        }
        #[derive(Deserialize)]
        struct FileMode {
            path: String,
            #[serde(rename = "uploadMode")]
            upload_mode: UploadMode,
        }

        let sample = &bytes[..bytes.len().min(SAMPLE_BYTES)];
        let body = json!({
            "files": [{
                "path": remote_path,
                "size": bytes.len(),
                "sample": B64.encode(sample),
            }]
        });
        let resp = self
            .http
            .post(self.api(&format!("datasets/{repo_id}/preupload/main")))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("hub preupload")?;
        let resp: Resp = check(resp, "preupload").await?.json().await.context("preupload body")?;
        Ok(resp
            .files
            .into_iter()
            .find(|f| f.path == remote_path)
            .map(|f| f.upload_mode)
            .unwrap_or(UploadMode::Regular))
    }

    async fn lfs_upload(&self, repo_id: &str, oid: &str, bytes: Vec<u8>) -> Result<()> {
        #[derive(Deserialize)]
        struct Batch {
            objects: Vec<BatchObject>,
        }
        #[derive(Deserialize)]
        struct BatchObject {
            #[serde(default)]
            actions: Option<Actions>,
            #[serde(default)]
            error: Option<LfsError>,
        }
        #[derive(Deserialize)]
        struct Actions {
            upload: Option<LfsAction>,
            verify: Option<LfsAction>,
        }
        #[derive(Deserialize)]
        struct LfsAction {
            href: String,
            #[serde(default)]
            header: HashMap<String, String>,
        }
        #[derive(Deserialize)]
        struct LfsError {
            code: i64,
            message: String,
        }

        let size = bytes.len();
        let resp = self
            .http
            .post(format!(
                "{}/datasets/{repo_id}.git/info/lfs/objects/batch",
                self.endpoint
            ))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, LFS_CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(
                json!({
                    "operation": "upload",
                    "transfers": ["basic"],
                    "objects": [{ "oid": oid, "size": size }],
                    "hash_algo": "sha256",
                })
                .to_string(),
            )
            .send()
            .await
            .context("lfs batch")?;
        let batch: Batch = check(resp, "lfs batch").await?.json().await.context("lfs batch body")?;

        let obj = batch
            .objects
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("lfs batch returned no objects"))?;
        if let Some(err) = obj.error {
            bail!("lfs batch error {}: {}", err.code, err.message);
        }
        // No actions: the hub already has this object.
        let Some(actions) = obj.actions else {
            return Ok(());
        };

        if let Some(upload) = actions.upload {
            let mut req = self.http.put(&upload.href).body(bytes);
            for (k, v) in &upload.header {
                req = req.header(k.as_str(), v.as_str());
            }
            let resp = req.send().await.context("lfs put")?;
            check(resp, "lfs put").await?;
        }

        if let Some(verify) = actions.verify {
            let mut req = self
                .http
                .post(&verify.href)
                .bearer_auth(&self.token)
                .json(&json!({ "oid": oid, "size": size }));
            for (k, v) in &verify.header {
                req = req.header(k.as_str(), v.as_str());
            }
            let resp = req.send().await.context("lfs verify")?;
            check(resp, "lfs verify").await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetStore for HfHubClient {
    async fn repo_exists(&self, repo_id: &str) -> Result<bool> {
        let resp = self
            .http
            .get(self.api(&format!("datasets/{repo_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("hub repo info")?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            // The hub answers 401 rather than 404 for repos it will not reveal.
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED => Ok(false),
            _ => check(resp, "repo info").await.map(|_| true),
        }
    }

    async fn create_repo(&self, repo_id: &str) -> Result<()> {
        let (organization, name) = split_repo_id(repo_id)?;
        let resp = self
            .http
            .post(self.api("repos/create"))
            .bearer_auth(&self.token)
            .json(&json!({
                "type": "dataset",
                "name": name,
                "organization": organization,
                "private": false,
            }))
            .send()
            .await
            .context("hub create repo")?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        check(resp, "create repo").await.map(|_| ())
    }

    async fn upload_file(&self, local_path: &Path, repo_id: &str, remote_path: &str) -> Result<()> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("reading {}", local_path.display()))?;

        let file = match self.preupload_mode(repo_id, remote_path, &bytes).await? {
            UploadMode::Regular => CommitFile::Regular {
                content_b64: B64.encode(&bytes),
            },
            UploadMode::Lfs => {
                let oid = sha256_hex(&bytes);
                let size = bytes.len() as u64;
                self.lfs_upload(repo_id, &oid, bytes).await?;
                CommitFile::Lfs { oid, size }
            }
        };

        let resp = self
            .http
            .post(self.api(&format!("datasets/{repo_id}/commit/main")))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(commit_payload(remote_path, &file))
            .send()
            .await
            .context("hub commit")?;
        check(resp, "commit").await.map(|_| ())
    }

    async fn default_namespace(&self) -> Result<String> {
        self.whoami().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitFile {
    Regular { content_b64: String },
    Lfs { oid: String, size: u64 },
}

#[derive(Serialize)]
struct CommitLine<'a> {
    key: &'a str,
    value: serde_json::Value,
}

/// NDJSON body for the hub commit endpoint: a header line then one file line.
pub fn commit_payload(remote_path: &str, file: &CommitFile) -> String {
    let header = CommitLine {
        key: "header",
        value: json!({
            "summary": format!("Upload {remote_path}"),
            "description": "",
        }),
    };
    let op = match file {
        CommitFile::Regular { content_b64 } => CommitLine {
            key: "file",
            value: json!({
                "path": remote_path,
                "content": content_b64,
                "encoding": "base64",
            }),
        },
        CommitFile::Lfs { oid, size } => CommitLine {
            key: "lfsFile",
            value: json!({
                "path": remote_path,
                "algo": "sha256",
                "oid": oid,
                "size": size,
            }),
        },
    };

    let mut out = String::new();
    for line in [header, op] {
        out.push_str(&serde_json::to_string(&line).unwrap_or_default());
        out.push('\n');
    }
    out
}

fn split_repo_id(repo_id: &str) -> Result<(Option<&str>, &str)> {
    match repo_id.split_once('/') {
        Some((org, name)) if !org.is_empty() && !name.is_empty() => Ok((Some(org), name)),
        None if !repo_id.is_empty() => Ok((None, repo_id)),
        _ => Err(anyhow!("invalid repo id {repo_id:?}")),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    Err(anyhow!("hub {what} failed with {status}: {snippet}"))
}
