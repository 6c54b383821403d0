//! News dataset pipeline binary entrypoint.
//! Fetches the configured feeds once (or on an interval), appends new articles
//! to the category logs and mirrors them to the hub.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;

use news_dataset_pipeline::bootstrap::build_pipeline;
use news_dataset_pipeline::scheduler::{interval_from_env, spawn_interval_scheduler};
use news_dataset_pipeline::{init_tracing, PipelineConfig, RunReport};

const ENV_METRICS_ADDR: &str = "PIPELINE_METRICS_ADDR";

/// Expose `/metrics` when `PIPELINE_METRICS_ADDR` (e.g. `0.0.0.0:9100`) is set.
fn install_metrics_exporter() -> Result<()> {
    let Ok(raw) = std::env::var(ENV_METRICS_ADDR) else {
        return Ok(());
    };
    let addr: SocketAddr = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid {ENV_METRICS_ADDR}: {raw}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

fn print_summary(report: &RunReport) {
    for c in &report.categories {
        let status = match &c.failure {
            None => "ok".to_string(),
            Some(f) => format!("{} failed: {}", f.stage, f.reason),
        };
        println!(
            "{:<14} fetched={} skipped={} failed={} new={} dup={} stored={} published={} [{}]",
            c.category.as_str(),
            c.sources_fetched,
            c.sources_skipped,
            c.sources_failed,
            c.accepted,
            c.duplicates,
            c.stored,
            c.published,
            status
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    install_metrics_exporter()?;

    // Missing HF_TOKEN with publishing enabled stops here, before any fetch.
    let pipeline = build_pipeline(&cfg).await?;

    match interval_from_env() {
        None => {
            let report = pipeline.run_once().await?;
            print_summary(&report);
        }
        Some(period) => {
            tracing::info!(every_secs = period.as_secs(), "scheduled mode");
            spawn_interval_scheduler(Arc::new(pipeline), period)
                .await
                .context("scheduler task")?;
        }
    }
    Ok(())
}
