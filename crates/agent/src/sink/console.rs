//! Console — process output through the agent's own tracing output.

use tracing::{info, warn};

use super::{wants, Logger};
use crate::pm::{Command, Message, LEVEL_STDERR};

#[derive(Debug, Clone, Default)]
pub struct ConsoleLogger {
    levels: Vec<i32>,
}

impl ConsoleLogger {
    pub fn new(levels: Vec<i32>) -> Self {
        Self { levels }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, command: &Command, message: &Message) {
        if !wants(&self.levels, command, message) {
            return;
        }
        if message.level == LEVEL_STDERR {
            warn!(command = %command.name, command_id = %message.command_id, level = message.level, "{}", message.text);
        } else {
            info!(command = %command.name, command_id = %message.command_id, level = message.level, "{}", message.text);
        }
    }
}
