// src/bootstrap.rs
//! Wires the real collaborators from a [`PipelineConfig`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::ingest::language::StopwordDetector;
use crate::ingest::providers::article::HttpArticleExtractor;
use crate::ingest::providers::rss::HttpFeedFetcher;
use crate::ingest::FetchOrchestrator;
use crate::pipeline::Pipeline;
use crate::publish::hf::HfHubClient;
use crate::publish::SyncPublisher;
use crate::state::StateStore;
use crate::storage::StorageManager;

/// Builds the hub publisher. A missing `HF_TOKEN` is an error here so the
/// binary can refuse to start before fetching anything. No network call is
/// made: an unset namespace is looked up on the first publish.
pub fn build_publisher(cfg: &PipelineConfig) -> Result<SyncPublisher> {
    let hub = HfHubClient::from_env().context("publishing is enabled")?;
    // Safe diagnostics: namespace only, never the token
    info!(
        target: "publish",
        namespace = %if cfg.hf_namespace.is_empty() { "<token owner>" } else { cfg.hf_namespace.as_str() },
        "hub publisher ready"
    );
    Ok(SyncPublisher::new(Arc::new(hub), cfg.hf_namespace.clone()))
}

pub async fn build_pipeline(cfg: &PipelineConfig) -> Result<Pipeline> {
    let timeout = cfg.fetch_timeout();
    let feeds = HttpFeedFetcher::new(&cfg.user_agent, timeout)?;
    let mut orchestrator = FetchOrchestrator::new(Arc::new(feeds), cfg.fetch_settings());
    if cfg.extract_full_text {
        let extractor = HttpArticleExtractor::new(&cfg.user_agent, timeout)?;
        orchestrator = orchestrator.with_extractor(Arc::new(extractor));
    }
    if cfg.detect_language {
        orchestrator = orchestrator.with_detector(Arc::new(StopwordDetector::new()));
    }

    let mut pipeline = Pipeline::new(
        cfg.categories.clone(),
        orchestrator,
        StorageManager::new(&cfg.data_dir, cfg.max_file_size_bytes),
        StateStore::new(&cfg.state_dir),
        cfg.max_feed_failures,
    );
    if cfg.publish {
        pipeline = pipeline.with_publisher(build_publisher(cfg)?);
    }

    info!(
        categories = cfg.categories.len(),
        sources = cfg.categories.iter().map(|c| c.sources.len()).sum::<usize>(),
        data_dir = %cfg.data_dir.display(),
        state_dir = %cfg.state_dir.display(),
        publish = cfg.publish,
        extract = cfg.extract_full_text,
        detect_language = cfg.detect_language,
        "pipeline configured"
    );
    Ok(pipeline)
}
