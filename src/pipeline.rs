// src/pipeline.rs
//! Pipeline driver: load state, run Fetch → Store → Publish per category,
//! persist state. One category failing never stops the others.

use anyhow::Result;
use futures::FutureExt;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

use crate::config::CategorySources;
use crate::dedup::{DedupIndex, Fingerprint};
use crate::ingest::types::Category;
use crate::ingest::{CategoryBatch, FetchOrchestrator, SourceOutcome};
use crate::publish::SyncPublisher;
use crate::state::{PipelineState, StateStore};
use crate::storage::StorageManager;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "storage_rotations_total",
            "Category logs discarded for reaching the size threshold."
        );
        describe_counter!("publish_errors_total", "Failed uploads to the dataset hub.");
        describe_counter!(
            "pipeline_category_failures_total",
            "Categories whose store or publish stage failed."
        );
        describe_counter!("pipeline_runs_total", "Scheduled pipeline runs started.");
        describe_gauge!("pipeline_last_run_ts", "Unix time the last run started.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Store,
    Publish,
    /// A collaborator panicked; the category was abandoned mid-flight.
    Internal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Store => "store",
            Stage::Publish => "publish",
            Stage::Internal => "internal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

/// Per-category summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub category: Category,
    pub sources_fetched: usize,
    pub sources_skipped: usize,
    pub sources_failed: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub stored: usize,
    pub rotated: bool,
    pub published: bool,
    pub failure: Option<StageFailure>,
}

impl CategoryReport {
    fn empty(category: Category) -> Self {
        Self::from_batch(category, &CategoryBatch::default())
    }

    fn from_batch(category: Category, batch: &CategoryBatch) -> Self {
        Self {
            category,
            sources_fetched: batch.count_where(|o| matches!(o, SourceOutcome::Fetched { .. })),
            sources_skipped: batch.count_where(|o| matches!(o, SourceOutcome::Skipped)),
            sources_failed: batch.count_where(|o| matches!(o, SourceOutcome::Failed { .. })),
            accepted: batch.articles.len(),
            duplicates: batch.duplicates(),
            stored: 0,
            rotated: false,
            published: false,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    pub fn total_accepted(&self) -> usize {
        self.categories.iter().map(|c| c.accepted).sum()
    }

    pub fn failed_categories(&self) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|c| c.failure.is_some())
            .map(|c| c.category)
            .collect()
    }
}

pub struct Pipeline {
    categories: Vec<CategorySources>,
    orchestrator: FetchOrchestrator,
    storage: StorageManager,
    publisher: Option<SyncPublisher>,
    state_store: StateStore,
    max_feed_failures: u32,
}

impl Pipeline {
    pub fn new(
        categories: Vec<CategorySources>,
        orchestrator: FetchOrchestrator,
        storage: StorageManager,
        state_store: StateStore,
        max_feed_failures: u32,
    ) -> Self {
        ensure_metrics_described();
        Self {
            categories,
            orchestrator,
            storage,
            publisher: None,
            state_store,
            max_feed_failures,
        }
    }

    pub fn with_publisher(mut self, publisher: SyncPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// LoadState → categories → PersistState. Only state load/persist errors
    /// escape; everything inside a category ends up in its report.
    pub async fn run_once(&self) -> Result<RunReport> {
        let started = chrono::Utc::now();
        tracing::info!(target: "pipeline", started_at = %started.to_rfc3339(), "pipeline started");

        let mut state = self.state_store.load(self.max_feed_failures).await?;
        let report = self.run_with_state(&mut state).await;
        self.state_store.persist(&state).await?;

        gauge!("pipeline_last_run_ts").set(started.timestamp().max(0) as f64);
        tracing::info!(
            target: "pipeline",
            accepted = report.total_accepted(),
            failed_categories = ?report.failed_categories(),
            seen = state.seen.len(),
            disabled_feeds = state.health.disabled_sources().len(),
            "pipeline completed"
        );
        Ok(report)
    }

    /// Runs every category against caller-owned state. Does not persist.
    pub async fn run_with_state(&self, state: &mut PipelineState) -> RunReport {
        let mut report = RunReport::default();
        for cat in &self.categories {
            // Restored if the category panics, so half-processed items are re-fetched.
            let seen_before = state.seen.clone();
            let outcome = AssertUnwindSafe(self.run_category(cat, state))
                .catch_unwind()
                .await;
            let r = match outcome {
                Ok(r) => r,
                Err(payload) => {
                    state.seen = seen_before;
                    let reason = format!("panicked: {}", panic_reason(payload.as_ref()));
                    fail_reason(CategoryReport::empty(cat.name), Stage::Internal, reason)
                }
            };
            log_category(&r);
            report.categories.push(r);
        }
        report
    }

    async fn run_category(&self, cat: &CategorySources, state: &mut PipelineState) -> CategoryReport {
        let category = cat.name;
        tracing::info!(target: "pipeline", %category, sources = cat.sources.len(), "processing category");

        let batch = self
            .orchestrator
            .fetch_category(category, &cat.sources, &mut state.health, &mut state.seen)
            .await;
        let mut report = CategoryReport::from_batch(category, &batch);

        if batch.articles.is_empty() {
            tracing::info!(target: "pipeline", %category, "no new articles");
            return report;
        }

        let handle = match self.storage.prepare(category).await {
            Ok(h) => h,
            Err(e) => {
                unmark(&mut state.seen, &batch);
                return fail(report, Stage::Store, e);
            }
        };
        report.rotated = handle.rotated;
        match self.storage.append(&handle, &batch.articles).await {
            Ok(n) => report.stored = n,
            Err(e) => {
                unmark(&mut state.seen, &batch);
                return fail(report, Stage::Store, e);
            }
        }

        if let Some(publisher) = &self.publisher {
            match publisher.publish(category, &handle).await {
                Ok(()) => report.published = true,
                Err(e) => return fail(report, Stage::Publish, e),
            }
        }
        report
    }
}

/// Articles that never reached the log must stay eligible for the next run.
fn unmark(seen: &mut DedupIndex, batch: &CategoryBatch) {
    for a in &batch.articles {
        seen.remove(&Fingerprint::of_link(&a.link));
    }
}

fn fail(report: CategoryReport, stage: Stage, err: anyhow::Error) -> CategoryReport {
    fail_reason(report, stage, format!("{err:#}"))
}

fn fail_reason(mut report: CategoryReport, stage: Stage, reason: String) -> CategoryReport {
    counter!("pipeline_category_failures_total").increment(1);
    report.failure = Some(StageFailure { stage, reason });
    report
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_category(r: &CategoryReport) {
    match &r.failure {
        None => tracing::info!(
            target: "pipeline",
            category = %r.category,
            fetched = r.sources_fetched,
            skipped = r.sources_skipped,
            failed = r.sources_failed,
            accepted = r.accepted,
            duplicates = r.duplicates,
            stored = r.stored,
            published = r.published,
            "category done"
        ),
        Some(f) => tracing::error!(
            target: "pipeline",
            category = %r.category,
            stage = %f.stage,
            reason = %f.reason,
            fetched = r.sources_fetched,
            skipped = r.sources_skipped,
            failed = r.sources_failed,
            accepted = r.accepted,
            stored = r.stored,
            "category aborted"
        ),
    }
}
