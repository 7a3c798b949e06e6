//! Local — runs commands as child processes of the agent.
//!
//! Every job gets one supervisor task plus one detached stream consumer per
//! output pipe. Once the child exits its consumers get a short grace period
//! to drain the pipes; any still blocked (a forked grandchild holding the
//! pipe open) are aborted. Exit hooks fire after that, so no match hook can
//! run after a job is reported terminated.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::command::Command;
use super::hook::{partition, Hook, MatchHooks};
use super::manager::{JobHandle, JobResult, JobState, PmError, ProcessManager};
use super::message::{LEVEL_STDERR, LEVEL_STDOUT};
use super::stream::{StreamConsumer, StreamEnd};
use crate::sink::Logger;

/// Lines of each stream kept for [`JobResult::streams`].
pub const DEFAULT_CAPTURE_LINES: usize = 100;

/// How long output consumers may keep draining after the child exited.
pub const DEFAULT_STREAM_GRACE: Duration = Duration::from_millis(500);

/// Bounded tail of a stream's message texts.
#[derive(Debug, Default)]
struct Tail {
    lines: VecDeque<String>,
    limit: usize,
}

impl Tail {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    fn push(&mut self, line: &str) {
        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

pub struct LocalProcessManager {
    sinks: Arc<Vec<Arc<dyn Logger>>>,
    capture_lines: usize,
    stream_grace: Duration,
    jobs: Arc<DashMap<Arc<str>, JobHandle>>,
}

impl LocalProcessManager {
    pub fn new(sinks: Vec<Arc<dyn Logger>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
            capture_lines: DEFAULT_CAPTURE_LINES,
            stream_grace: DEFAULT_STREAM_GRACE,
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub fn with_capture_lines(mut self, lines: usize) -> Self {
        self.capture_lines = lines;
        self
    }

    pub fn with_stream_grace(mut self, grace: Duration) -> Self {
        self.stream_grace = grace;
        self
    }

    /// Handle of a job that has not terminated yet.
    pub fn get(&self, id: &str) -> Option<JobHandle> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Ids of jobs that have not terminated yet.
    pub fn running(&self) -> Vec<Arc<str>> {
        self.jobs.iter().map(|entry| Arc::clone(entry.key())).collect()
    }

    fn attach<R>(
        &self,
        command: &Arc<Command>,
        reader: R,
        level: i32,
        matches: &Arc<MatchHooks>,
        tail: &Arc<Mutex<Tail>>,
    ) -> Result<JoinHandle<StreamEnd>, PmError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let consumer = StreamConsumer::new(Arc::clone(&command.id), reader, level)?;
        let command = Arc::clone(command);
        let matches = Arc::clone(matches);
        let sinks = Arc::clone(&self.sinks);
        let tail = Arc::clone(tail);

        Ok(consumer.consume(move |message| {
            matches.dispatch(&message);
            for sink in sinks.iter() {
                sink.log(&command, &message);
            }
            tail.lock().push(&message.text);
        }))
    }
}

impl ProcessManager for LocalProcessManager {
    fn submit(&self, command: Command, hooks: Vec<Hook>) -> Result<JobHandle, PmError> {
        let (matches, exits) = partition(hooks);
        let (handle, completer) = JobHandle::pending(command.clone());
        let id = Arc::clone(&command.id);

        let (out, err) = if command.no_output {
            (Stdio::null(), Stdio::null())
        } else {
            (Stdio::piped(), Stdio::piped())
        };

        let spawned = tokio::process::Command::new(&command.name)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(command_id = %id, name = %command.name, error = %e, "failed to start command");
                exits.fire(false);
                completer.complete(JobResult::failed(Arc::clone(&id), e.to_string()));
                return Err(PmError::Spawn {
                    name: command.name,
                    source: e,
                });
            }
        };

        debug!(command_id = %id, name = %command.name, pid = ?child.id(), "command started");

        let command = Arc::new(command);
        let matches = Arc::new(matches);
        let tails = [
            Arc::new(Mutex::new(Tail::new(self.capture_lines))),
            Arc::new(Mutex::new(Tail::new(self.capture_lines))),
        ];

        let mut done = Vec::with_capacity(2);
        let attached = (|| -> Result<(), PmError> {
            if let Some(stdout) = child.stdout.take() {
                done.push(self.attach(&command, stdout, LEVEL_STDOUT, &matches, &tails[0])?);
            }
            if let Some(stderr) = child.stderr.take() {
                done.push(self.attach(&command, stderr, LEVEL_STDERR, &matches, &tails[1])?);
            }
            Ok(())
        })();

        if let Err(e) = attached {
            warn!(command_id = %id, error = %e, "failed to attach output consumers");
            let _ = child.start_kill();
            exits.fire(false);
            completer.complete(JobResult::failed(Arc::clone(&id), e.to_string()));
            return Err(e);
        }

        self.jobs.insert(Arc::clone(&id), handle.clone());
        let jobs = Arc::clone(&self.jobs);
        let grace = self.stream_grace;

        tokio::spawn(async move {
            let status = child.wait().await;
            drain_consumers(&id, done, grace).await;

            let (state, exit_code) = match status {
                Ok(status) if status.success() => (JobState::Success, status.code()),
                Ok(status) => (JobState::Failure, status.code()),
                Err(e) => {
                    warn!(command_id = %id, error = %e, "failed to wait for command");
                    (JobState::Failure, None)
                }
            };

            info!(command_id = %id, name = %command.name, ?state, ?exit_code, "command exited");

            let result = JobResult {
                command_id: Arc::clone(&id),
                state,
                exit_code,
                streams: [tails[0].lock().joined(), tails[1].lock().joined()],
            };

            exits.fire(state == JobState::Success);
            completer.complete(result);
            jobs.remove(&id);
        });

        Ok(handle)
    }
}

/// Wait up to `grace` for every consumer to finish, then abort the rest.
/// On return no consumer is running.
async fn drain_consumers(id: &str, consumers: Vec<JoinHandle<StreamEnd>>, grace: Duration) {
    let deadline = Instant::now() + grace;
    for mut consumer in consumers {
        match timeout_at(deadline, &mut consumer).await {
            Ok(Ok(StreamEnd::Eof)) => {}
            Ok(Ok(StreamEnd::Failed(reason))) => {
                debug!(command_id = %id, %reason, "output stream ended with an error");
            }
            Ok(Err(e)) => warn!(command_id = %id, error = %e, "output consumer panicked"),
            Err(_) => {
                debug!(command_id = %id, "output still open after exit, aborting consumer");
                consumer.abort();
                let _ = consumer.await;
            }
        }
    }
}
