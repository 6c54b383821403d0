// src/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::pipeline::Pipeline;

pub const ENV_PIPELINE_INTERVAL_SECS: &str = "PIPELINE_INTERVAL_SECS";

/// Interval from `PIPELINE_INTERVAL_SECS`; `None` means run once.
pub fn interval_from_env() -> Option<Duration> {
    std::env::var(ENV_PIPELINE_INTERVAL_SECS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&s| s > 0)
        .map(Duration::from_secs)
}

/// Run the pipeline on a fixed interval. A failed run is logged and the next
/// tick still fires; ticks missed while a run is in progress are skipped.
pub fn spawn_interval_scheduler(pipeline: Arc<Pipeline>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            counter!("pipeline_runs_total").increment(1);
            match pipeline.run_once().await {
                Ok(report) => tracing::info!(
                    target: "pipeline",
                    accepted = report.total_accepted(),
                    next_in_secs = period.as_secs(),
                    "scheduled run finished"
                ),
                Err(e) => tracing::error!(target: "pipeline", error = %format!("{e:#}"), "scheduled run failed"),
            }
        }
    })
}
