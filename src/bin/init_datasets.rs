//! Make sure every configured category has its dataset repo on the hub.
//! Safe to re-run: existing repos are left alone.

use anyhow::Result;

use news_dataset_pipeline::bootstrap::build_publisher;
use news_dataset_pipeline::publish::hf::{DEFAULT_HF_ENDPOINT, ENV_HF_ENDPOINT};
use news_dataset_pipeline::{init_tracing, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default()?;
    let publisher = build_publisher(&cfg)?;
    let endpoint = std::env::var(ENV_HF_ENDPOINT).unwrap_or_else(|_| DEFAULT_HF_ENDPOINT.to_string());

    let mut failed = 0usize;
    for cat in &cfg.categories {
        match publisher.ensure_remote_repo(cat.name).await {
            Ok(repo_id) => println!("✓ {}/datasets/{}", endpoint.trim_end_matches('/'), repo_id),
            Err(e) => {
                failed += 1;
                tracing::error!(category = %cat.name, error = %format!("{e:#}"), "could not ensure dataset repo");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} dataset repo(s) could not be ensured");
    }
    println!("init-datasets done");
    Ok(())
}
