//! Sink module — where framed process output goes besides hooks.
//!
//! Each sink keeps a default set of levels; a command's own `log_levels`
//! take precedence. An empty set means every level.

pub mod console;
pub mod controller;
pub mod db;

pub use console::ConsoleLogger;
pub use controller::ControllerLogger;
pub use db::{DbError, DbLogger};

use crate::pm::{Command, Message};

pub trait Logger: Send + Sync {
    fn log(&self, command: &Command, message: &Message);
}

/// Whether a sink with `defaults` keeps `message` of `command`.
pub fn wants(defaults: &[i32], command: &Command, message: &Message) -> bool {
    let levels = if command.log_levels.is_empty() {
        defaults
    } else {
        &command.log_levels
    };
    levels.is_empty() || levels.contains(&message.level)
}
