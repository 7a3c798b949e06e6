//! Orchestrator — composes a container filesystem from plists and binds.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conf::AgentConfig;
use crate::plist::{has_scheme, PlistCache};
use crate::pm::{Command, GateError, GateOutcome, ProcessManager, ReadyGate};

use super::bind::Binder;
use super::error::MountError;
use super::spec::{join_inside, ContainerSpec};

/// Settings threaded into the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub cache_root: PathBuf,
    pub container_root: PathBuf,
    pub helper: String,
    /// Used when a container does not name its own storage backend.
    pub storage_url: String,
    pub ready_pattern: String,
    pub ready_timeout: Option<Duration>,
}

impl From<&AgentConfig> for MountConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            cache_root: config.cache_root.clone(),
            container_root: config.container_root.clone(),
            helper: config.mount_helper.clone(),
            storage_url: config.storage_url.clone(),
            ready_pattern: config.ready_pattern.clone(),
            ready_timeout: config.ready_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum MountState {
    Pending,
    Extracting,
    Launching,
    Ready,
    Failed(String),
}

pub struct MountOrchestrator {
    pm: Arc<dyn ProcessManager>,
    cache: Arc<PlistCache>,
    binder: Arc<dyn Binder>,
    config: MountConfig,
    states: DashMap<PathBuf, MountState>,
}

impl MountOrchestrator {
    pub fn new(config: MountConfig, pm: Arc<dyn ProcessManager>, binder: Arc<dyn Binder>) -> Self {
        let cache = Arc::new(PlistCache::new(&config.cache_root));
        Self {
            pm,
            cache,
            binder,
            config,
            states: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<PlistCache> {
        &self.cache
    }

    /// Last recorded state of the mount at `target`.
    pub fn state(&self, target: &Path) -> Option<MountState> {
        self.states.get(target).map(|s| s.clone())
    }

    /// Every tracked mount target and its state.
    pub fn states(&self) -> Vec<(PathBuf, MountState)> {
        self.states
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn root_path(&self, spec: &ContainerSpec) -> PathBuf {
        self.config.container_root.join(spec.name())
    }

    fn set_state(&self, target: &Path, state: MountState) {
        debug!(target = %target.display(), ?state, "mount state");
        self.states.insert(target.to_path_buf(), state);
    }

    /// Compose the full filesystem of a container and return its root.
    ///
    /// The root plist is mounted first; additional mounts follow in
    /// destination order. The first failure aborts the rest. Nothing
    /// mounted before the failure is unmounted.
    pub async fn mount(&self, spec: &ContainerSpec) -> Result<PathBuf, MountError> {
        let name = spec.name();
        let root = self.root_path(spec);
        info!(container = %name, root = %root.display(), "mounting container");

        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => debug!(root = %root.display(), "removed stale root"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(root = %root.display(), error = %e, "failed to remove stale root"),
        }

        self.mount_plist(&name, &spec.root, &root, spec.storage())
            .await
            .map_err(|e| MountError::RootPlist(Box::new(e)))?;

        for (src, dst) in spec.sorted_mounts() {
            let target = join_inside(&root, dst)?;
            if let Err(source) = tokio::fs::create_dir_all(&target).await {
                let err = MountError::MkdirAll {
                    path: target.clone(),
                    source,
                };
                self.set_state(&target, MountState::Failed(err.to_string()));
                return Err(err);
            }

            if has_scheme(src).map_err(MountError::InvalidSource)? {
                self.mount_plist(&name, src, &target, spec.storage())
                    .await
                    .map_err(|e| MountError::BindPlist(Box::new(e)))?;
            } else {
                if let Err(source) = self.binder.bind(Path::new(src), &target) {
                    let err = MountError::Bind {
                        src: src.to_string(),
                        target: target.clone(),
                        source,
                    };
                    self.set_state(&target, MountState::Failed(err.to_string()));
                    return Err(err);
                }
                debug!(src = %src, target = %target.display(), "bind mounted");
                self.set_state(&target, MountState::Ready);
            }
        }

        info!(container = %name, "container filesystem ready");
        Ok(root)
    }

    /// Mount one plist onto `target` through the mount helper and wait until
    /// it reports readiness or exits.
    pub async fn mount_plist(
        &self,
        container: &str,
        src: &str,
        target: &Path,
        storage: Option<&str>,
    ) -> Result<(), MountError> {
        self.set_state(target, MountState::Pending);
        let result = self.launch(container, src, target, storage).await;
        match &result {
            Ok(()) => self.set_state(target, MountState::Ready),
            Err(e) => {
                warn!(target = %target.display(), error = %e, "plist mount failed");
                self.set_state(target, MountState::Failed(e.to_string()));
            }
        }
        result
    }

    async fn launch(
        &self,
        container: &str,
        src: &str,
        target: &Path,
        storage: Option<&str>,
    ) -> Result<(), MountError> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|source| MountError::MkdirAll {
                path: target.to_path_buf(),
                source,
            })?;

        let backend = self.cache.backend_path(container, src);
        reset_dir(&backend).await?;

        self.set_state(target, MountState::Extracting);
        let meta = self.cache.resolve(container, src).await?;

        let storage_url = storage.unwrap_or(&self.config.storage_url);
        let command = Command::new(&self.config.helper).args([
            "-reset".to_string(),
            "-backend".to_string(),
            backend.to_string_lossy().into_owned(),
            "-meta".to_string(),
            meta.to_string_lossy().into_owned(),
            "-storage-url".to_string(),
            storage_url.to_string(),
            target.to_string_lossy().into_owned(),
        ]);

        let (signal, waiter) = ReadyGate::new();
        let (ready, exit) = signal.hooks(&self.config.ready_pattern)?;

        self.set_state(target, MountState::Launching);
        info!(target = %target.display(), command_id = %command.id, "starting mount helper");
        let handle = self.pm.submit(command, vec![ready.into(), exit.into()])?;

        match waiter.wait(self.config.ready_timeout).await {
            Ok(GateOutcome::Ready) => Ok(()),
            Ok(GateOutcome::Exited { success: true }) => {
                debug!(target = %target.display(), "mount helper exited cleanly before ready");
                Ok(())
            }
            Ok(GateOutcome::Exited { success: false }) | Err(GateError::Abandoned) => {
                let result = handle.wait().await;
                Err(MountError::AbnormalExit {
                    target: target.to_path_buf(),
                    stderr: result.stderr().to_string(),
                })
            }
            Err(GateError::Timeout(after)) => Err(MountError::Timeout {
                target: target.to_path_buf(),
                after,
            }),
        }
    }
}

/// Remove-then-recreate.
async fn reset_dir(path: &Path) -> Result<(), MountError> {
    let reset_err = |source| MountError::ResetBackend {
        path: path.to_path_buf(),
        source,
    };
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(reset_err(e)),
    }
    tokio::fs::create_dir_all(path).await.map_err(reset_err)
}
