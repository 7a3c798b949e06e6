//! Command — an immutable description of a process submitted to a
//! [`ProcessManager`](super::manager::ProcessManager).

use std::sync::Arc;

/// A process to run.
///
/// Built by the caller, handed to the process manager, never mutated after
/// submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Opaque identifier, shared with every [`Message`](super::message::Message)
    /// framed from this command's output.
    pub id: Arc<str>,
    /// Executable name or path.
    pub name: String,
    pub args: Vec<String>,
    /// Discard output: no parsing, no hooks, no sinks.
    pub no_output: bool,
    /// Levels the logging sinks should keep for this command.
    /// Empty means "use the sink's defaults".
    pub log_levels: Vec<i32>,
}

impl Command {
    /// New command with a random v4 UUID as its id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Arc::from(id.into()),
            name: name.into(),
            args: Vec::new(),
            no_output: false,
            log_levels: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn no_output(mut self, no_output: bool) -> Self {
        self.no_output = no_output;
        self
    }

    pub fn log_levels(mut self, levels: Vec<i32>) -> Self {
        self.log_levels = levels;
        self
    }
}
