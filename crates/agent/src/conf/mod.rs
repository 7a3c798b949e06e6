//! Conf module — configuration model and loading.

pub mod model;
pub mod load;

pub use model::{AgentConfig, ControllerConfig, DbConfig, LoggingConfig};
pub use load::{ConfigError, DEFAULT_CONFIG_FILE};
