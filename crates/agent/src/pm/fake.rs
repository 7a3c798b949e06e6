//! Fake — scripted test double for [`ProcessManager`].
//!
//! Commands never run. Each submission is matched against a list of rules
//! (first rule whose needle appears in the command's arguments wins) and the
//! chosen [`FakeBehavior`] is played back synchronously through the hooks.

use std::sync::Arc;

use parking_lot::Mutex;

use super::command::Command;
use super::hook::{partition, ExitHooks, Hook};
use super::manager::{JobCompleter, JobHandle, JobResult, JobState, PmError, ProcessManager};
use super::message::LEVEL_STDOUT;
use super::stream::LevelFramer;

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Print `lines` and keep running until [`FakeProcessManager::stop_all`].
    Run { lines: Vec<String> },
    /// Print `lines`, then exit.
    Exit {
        lines: Vec<String>,
        success: bool,
        stderr: String,
    },
    /// Refuse the submission. Exit hooks still fire with failure.
    Reject(String),
}

impl FakeBehavior {
    /// A helper that prints `line` and stays up.
    pub fn ready(line: &str) -> Self {
        FakeBehavior::Run {
            lines: vec![line.to_string()],
        }
    }

    /// A helper that dies immediately with `stderr`.
    pub fn crash(stderr: &str) -> Self {
        FakeBehavior::Exit {
            lines: Vec::new(),
            success: false,
            stderr: stderr.to_string(),
        }
    }
}

pub struct FakeProcessManager {
    default: FakeBehavior,
    rules: Vec<(String, FakeBehavior)>,
    submitted: Mutex<Vec<Command>>,
    running: Mutex<Vec<(JobCompleter, ExitHooks)>>,
}

impl FakeProcessManager {
    pub fn new(default: FakeBehavior) -> Self {
        Self {
            default,
            rules: Vec::new(),
            submitted: Mutex::new(Vec::new()),
            running: Mutex::new(Vec::new()),
        }
    }

    /// Use `behavior` for commands with an argument containing `needle`.
    pub fn when(mut self, needle: &str, behavior: FakeBehavior) -> Self {
        self.rules.push((needle.to_string(), behavior));
        self
    }

    /// Every command submitted so far, in order.
    pub fn submitted(&self) -> Vec<Command> {
        self.submitted.lock().clone()
    }

    /// Number of jobs still "running".
    pub fn running(&self) -> usize {
        self.running.lock().len()
    }

    /// Terminate every running job with the given outcome.
    pub fn stop_all(&self, success: bool) {
        let jobs = std::mem::take(&mut *self.running.lock());
        for (completer, exits) in jobs {
            let id = Arc::clone(completer.command_id());
            exits.fire(success);
            completer.complete(result(id, success, String::new(), String::new()));
        }
    }

    fn behavior_for(&self, command: &Command) -> &FakeBehavior {
        self.rules
            .iter()
            .find(|(needle, _)| command.args.iter().any(|arg| arg.contains(needle.as_str())))
            .map(|(_, behavior)| behavior)
            .unwrap_or(&self.default)
    }
}

impl ProcessManager for FakeProcessManager {
    fn submit(&self, command: Command, hooks: Vec<Hook>) -> Result<JobHandle, PmError> {
        self.submitted.lock().push(command.clone());
        let (matches, exits) = partition(hooks);
        let id = Arc::clone(&command.id);
        let behavior = self.behavior_for(&command).clone();
        let (handle, completer) = JobHandle::pending(command);

        let play = |lines: &[String]| -> Result<String, PmError> {
            let mut framer = LevelFramer::new(Arc::clone(&id), LEVEL_STDOUT)?;
            let mut stdout = Vec::new();
            for line in lines {
                if let Some(message) = framer.push_line(line) {
                    matches.dispatch(&message);
                    stdout.push(message.text);
                }
            }
            Ok(stdout.join("\n"))
        };

        match behavior {
            FakeBehavior::Run { lines } => {
                play(&lines)?;
                self.running.lock().push((completer, exits));
            }
            FakeBehavior::Exit {
                lines,
                success,
                stderr,
            } => {
                let stdout = play(&lines)?;
                exits.fire(success);
                completer.complete(result(id, success, stdout, stderr));
            }
            FakeBehavior::Reject(reason) => {
                exits.fire(false);
                completer.complete(JobResult::failed(id, reason.clone()));
                return Err(PmError::Rejected(reason));
            }
        }

        Ok(handle)
    }
}

fn result(command_id: Arc<str>, success: bool, stdout: String, stderr: String) -> JobResult {
    JobResult {
        command_id,
        state: if success {
            JobState::Success
        } else {
            JobState::Failure
        },
        exit_code: Some(if success { 0 } else { 1 }),
        streams: [stdout, stderr],
    }
}
