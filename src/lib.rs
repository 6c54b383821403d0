// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod dedup;
pub mod health;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod scheduler;
pub mod state;
pub mod storage;

pub mod bootstrap;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::dedup::{DedupIndex, Fingerprint};
pub use crate::health::HealthTracker;
pub use crate::ingest::types::{Article, Category, FeedEntry};
pub use crate::pipeline::{CategoryReport, Pipeline, RunReport};
pub use crate::state::{PipelineState, StateStore};
pub use crate::storage::{LogHandle, StorageManager};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the tracing subscriber. `RUST_LOG` wins; otherwise this crate logs
/// at info and dependencies at warn. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_dataset_pipeline=info,ingest=info,storage=info,publish=info,pipeline=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer().compact()).try_init();
    }
}
