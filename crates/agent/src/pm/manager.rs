//! Manager — the contract between callers and whatever runs their processes.
//!
//! [`local`](super::local) provides the tokio-backed implementation;
//! [`fake`](super::fake) provides a scripted test double.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use super::command::Command;
use super::hook::Hook;
use super::stream::StreamError;

/// Index of stdout in [`JobResult::streams`].
pub const STDOUT: usize = 0;
/// Index of stderr in [`JobResult::streams`].
pub const STDERR: usize = 1;

#[derive(Error, Debug)]
pub enum PmError {
    #[error("Failed to start '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stream setup failed: {0}")]
    Stream(#[from] StreamError),
    #[error("Process manager rejected command: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Success,
    Failure,
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub command_id: Arc<str>,
    pub state: JobState,
    /// `None` when the process was killed by a signal or never ran.
    pub exit_code: Option<i32>,
    /// Tail of captured output, `[stdout, stderr]`.
    pub streams: [String; 2],
}

impl JobResult {
    pub fn success(&self) -> bool {
        self.state == JobState::Success
    }

    pub fn stderr(&self) -> &str {
        &self.streams[STDERR]
    }

    pub(crate) fn failed(command_id: Arc<str>, reason: impl Into<String>) -> Self {
        Self {
            command_id,
            state: JobState::Failure,
            exit_code: None,
            streams: [String::new(), reason.into()],
        }
    }
}

/// Runs commands and reports their output through hooks.
///
/// Implementations must fire every [`ExitHook`](super::hook::ExitHook)
/// exactly once, after the last [`MatchHook`](super::hook::MatchHook)
/// invocation, including when the command could not be started.
pub trait ProcessManager: Send + Sync {
    fn submit(&self, command: Command, hooks: Vec<Hook>) -> Result<JobHandle, PmError>;
}

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    command: Command,
    result: watch::Receiver<Option<JobResult>>,
}

/// Write side of a [`JobHandle`], held by whoever supervises the job.
#[derive(Debug)]
pub struct JobCompleter {
    command_id: Arc<str>,
    result: watch::Sender<Option<JobResult>>,
}

impl JobHandle {
    pub fn pending(command: Command) -> (Self, JobCompleter) {
        let (tx, rx) = watch::channel(None);
        let completer = JobCompleter {
            command_id: Arc::clone(&command.id),
            result: tx,
        };
        (Self { command, result: rx }, completer)
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The result, if the job has already terminated.
    pub fn try_result(&self) -> Option<JobResult> {
        self.result.borrow().clone()
    }

    /// Wait for the job to terminate.
    ///
    /// If the supervisor goes away without reporting, the job counts as failed.
    pub async fn wait(&self) -> JobResult {
        let mut rx = self.result.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(result) => result.clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(|| {
            JobResult::failed(
                Arc::clone(&self.command.id),
                "job supervisor exited without a result",
            )
        })
    }
}

impl JobCompleter {
    pub fn command_id(&self) -> &Arc<str> {
        &self.command_id
    }

    pub fn complete(self, result: JobResult) {
        let _ = self.result.send(Some(result));
    }
}
