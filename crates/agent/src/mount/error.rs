use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::plist::PlistError;
use crate::pm::{HookError, PmError};

/// Mount failures. Composition steps wrap the error of the step that failed
/// in a stage prefix (`mount-root-plist(..)`, `mount-bind(..)`, ...).
#[derive(Error, Debug)]
pub enum MountError {
    #[error("mount-root-plist({0})")]
    RootPlist(#[source] Box<MountError>),
    #[error("mount-bind-plist({0})")]
    BindPlist(#[source] Box<MountError>),
    #[error("mount-bind({src} -> {target}: {source})")]
    Bind {
        src: String,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mkdirAll({path}: {source})")]
    MkdirAll {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reset backend {path}: {source}")]
    ResetBackend {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Plist(#[from] Arc<PlistError>),
    #[error("bad mount source: {0}")]
    InvalidSource(#[source] PlistError),
    #[error("invalid mount target '{0}'")]
    InvalidTarget(String),
    #[error("failed to submit mount helper: {0}")]
    Submit(#[from] PmError),
    #[error("invalid ready pattern: {0}")]
    Hook(#[from] HookError),
    #[error("abnormal exit of filesystem mount at '{target}': {stderr}")]
    AbnormalExit { target: PathBuf, stderr: String },
    #[error("filesystem mount at '{target}' not ready after {after:?}")]
    Timeout { target: PathBuf, after: Duration },
}
