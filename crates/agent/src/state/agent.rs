//! Agent state — AgentState struct, shared state type alias.

use std::sync::Arc;

use crate::conf::AgentConfig;
use crate::mount::{Binder, MountConfig, MountOrchestrator};
use crate::pm::{LocalProcessManager, ProcessManager};

pub struct AgentState {
    pub config: AgentConfig,
    pub pm: Arc<LocalProcessManager>,
    pub mounts: MountOrchestrator,
}

impl AgentState {
    pub fn new(config: AgentConfig, pm: Arc<LocalProcessManager>, binder: Arc<dyn Binder>) -> Self {
        let mounts = MountOrchestrator::new(
            MountConfig::from(&config),
            Arc::clone(&pm) as Arc<dyn ProcessManager>,
            binder,
        );
        Self { config, pm, mounts }
    }
}

pub type SharedState = Arc<AgentState>;
