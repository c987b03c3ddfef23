//! Lenticular Sync - keeps one alignment job synchronized with the server
//!
//! Usage: `lenticular-sync <job_id>` (or set `LENTICULAR_JOB`). Opens the
//! job, follows its channel and the global channel, and logs every merge
//! until interrupted.

use anyhow::{bail, Context};
use tracing::info;

use lenticular_sync::{ActiveJob, ClientConfig};

const ENV_JOB: &str = "LENTICULAR_JOB";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lenticular_sync=info".into()),
        )
        .init();

    let job_id = match std::env::args().nth(1).or_else(|| std::env::var(ENV_JOB).ok()) {
        Some(job_id) if !job_id.trim().is_empty() => job_id,
        _ => bail!("usage: lenticular-sync <job_id> (or set {})", ENV_JOB),
    };

    let config = ClientConfig::from_env().context("Invalid configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Lenticular Sync v{} starting", env!("CARGO_PKG_VERSION"));
    info!("   API: {}", config.api_url);
    info!("   Socket: {}", config.ws_url);

    let active = ActiveJob::new(config).context("Unable to create the API client")?;
    active.connect_global();

    let session = active
        .open_job(&job_id)
        .await
        .with_context(|| format!("Unable to open job {}", job_id))?;

    let specs = session.specs();
    info!(
        "Job {}: {} data selections, {} linksets, {} lenses, {} views",
        session.job_id(),
        specs.entity_type_selections.len(),
        specs.linkset_specs.len(),
        specs.lens_specs.len(),
        specs.views.len()
    );

    tokio::signal::ctrl_c().await.context("Unable to listen for shutdown")?;

    info!("Shutting down");
    active.shutdown();
    Ok(())
}
