//! Run — mount the requested container, then idle until shutdown.

use std::path::Path;

use tracing::{error, info};

use crate::mount::ContainerSpec;
use crate::runtime::stop::shutdown_signal;
use crate::state::SharedState;

/// Mount the container described at `spec_path` (if any) and keep its mount
/// helpers supervised until a shutdown signal arrives.
pub async fn run(state: SharedState, spec_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = spec_path {
        let spec = ContainerSpec::from_file(path).map_err(|e| {
            error!("Failed to read container spec {}: {}", path.display(), e);
            e
        })?;

        let root = state.mounts.mount(&spec).await.map_err(|e| {
            error!("Failed to mount {}: {}", spec.name(), e);
            e
        })?;
        info!("Container {} mounted at {}", spec.name(), root.display());
    }

    info!("Press Ctrl+C to shutdown gracefully");
    shutdown_signal().await;

    let running = state.pm.running();
    info!("Shutting down with {} supervised process(es)", running.len());
    Ok(())
}
