//! Boot — logging init, config load, sinks, state creation.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use crate::conf::{AgentConfig, LoggingConfig};
use crate::mount::SysBinder;
use crate::pm::LocalProcessManager;
use crate::sink::{ConsoleLogger, ControllerLogger, DbLogger, Logger};
use crate::state::{AgentState, SharedState};

/// Initialise the tracing / logging subsystem.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nodeagent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load config, build the output sinks and the process manager, and wire
/// them into shared state.
///
/// Returns `(SharedState, AgentConfig)` on success.
pub async fn boot() -> Result<(SharedState, AgentConfig), Box<dyn std::error::Error>> {
    info!("Starting node agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!(
        "Loaded configuration: cache_root={}, container_root={}, helper={}",
        config.cache_root.display(),
        config.container_root.display(),
        config.mount_helper
    );

    let sinks = build_sinks(&config.logging);
    info!("Initialized {} output sink(s)", sinks.len());

    let pm = Arc::new(LocalProcessManager::new(sinks));
    let state = Arc::new(AgentState::new(config.clone(), pm, Arc::new(SysBinder)));
    info!("Initialized shared application state");

    Ok((state, config))
}

/// Console sink always; the database sink when configured and openable;
/// controller sink when configured with at least one usable endpoint.
/// Must run inside the runtime.
pub fn build_sinks(logging: &LoggingConfig) -> Vec<Arc<dyn Logger>> {
    let mut sinks: Vec<Arc<dyn Logger>> = vec![Arc::new(ConsoleLogger::new(logging.console_levels.clone()))];

    if let Some(db) = &logging.db {
        match DbLogger::open(&db.path, db.levels.clone()) {
            Ok(logger) => sinks.push(Arc::new(logger)),
            Err(e) => warn!("Log database disabled: {}", e),
        }
    }

    if let Some(controller) = &logging.controller {
        let endpoints: Vec<Url> = controller
            .endpoints
            .iter()
            .filter_map(|e| match Url::parse(e) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!("Skipping controller endpoint {}: {}", e, err);
                    None
                }
            })
            .collect();

        if endpoints.is_empty() {
            warn!("Controller logging configured without endpoints; disabled");
        } else {
            info!(
                "Forwarding process output to {} endpoint(s) (bufsize={}, flush={}ms)",
                endpoints.len(),
                controller.bufsize,
                controller.flush_interval_ms
            );
            sinks.push(Arc::new(ControllerLogger::new(
                endpoints,
                controller.bufsize,
                controller.flush_interval(),
                controller.levels.clone(),
            )));
        }
    }

    sinks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{ControllerConfig, DbConfig};

    #[tokio::test]
    async fn test_console_only_by_default() {
        assert_eq!(build_sinks(&LoggingConfig::default()).len(), 1);
    }

    #[tokio::test]
    async fn test_controller_sink_needs_endpoints() {
        let mut logging = LoggingConfig::default();
        logging.controller = Some(ControllerConfig::default());
        assert_eq!(build_sinks(&logging).len(), 1);

        logging.controller = Some(ControllerConfig {
            endpoints: vec!["http://127.0.0.1:1/logs".to_string()],
            ..ControllerConfig::default()
        });
        assert_eq!(build_sinks(&logging).len(), 2);
    }

    #[tokio::test]
    async fn test_db_sink_when_configured() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut logging = LoggingConfig::default();
        logging.db = Some(DbConfig {
            path: dir.path().join("logs.db"),
            levels: Vec::new(),
        });
        assert_eq!(build_sinks(&logging).len(), 2);
        assert!(dir.path().join("logs.db").exists());
    }
}
