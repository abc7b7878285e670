//! # Bonder Node
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load and validate configuration (file + environment)
//! 3. Lock the data directory
//! 4. Build the container and start the runtime
//! 5. Wait for Ctrl-C, then drain every task

use anyhow::{Context, Result};
use bonder_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

use node_runtime::adapters::DataDirLock;
use node_runtime::{BonderConfig, NodeContainer, NodeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let _guard = init_telemetry(&telemetry).context("telemetry")?;

    let env = |key: &str| std::env::var(key).ok();
    let path = BonderConfig::locate(env, std::env::args())?;
    let config = BonderConfig::load(&path, env)?;
    info!(
        config = %path.display(),
        bonder = %config.bonder,
        chains = config.enabled_chains().count(),
        watchers = config.watchers.len(),
        "[runtime] Configuration loaded"
    );

    let _lock = if config.storage.in_memory {
        None
    } else {
        Some(DataDirLock::acquire(&config.storage.data_dir)?)
    };

    let container = NodeContainer::build(config)?;
    let runtime = NodeRuntime::start(container, telemetry.metrics_port).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    runtime.shutdown().await;
    Ok(())
}
