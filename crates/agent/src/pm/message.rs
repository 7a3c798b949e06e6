//! Message — one framed, leveled unit of process output.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default level for lines read from a process's stdout.
pub const LEVEL_STDOUT: i32 = 1;
/// Default level for lines read from a process's stderr.
pub const LEVEL_STDERR: i32 = 2;

/// A structured message framed from a raw output stream.
///
/// `text` may span several raw lines when the process used multiline framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub command_id: Arc<str>,
    pub level: i32,
    pub text: String,
    /// Unix time in milliseconds at which the message was framed.
    pub epoch: i64,
}

impl Message {
    pub fn new(command_id: Arc<str>, level: i32, text: impl Into<String>) -> Self {
        Self {
            command_id,
            level,
            text: text.into(),
            epoch: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}:: {}", self.command_id, self.level, self.text)
    }
}
