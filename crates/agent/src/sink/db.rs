//! Db — persists process output per job in an embedded SQLite database.
//!
//! Rows are keyed by job id and `<epoch:020>-<level:03>`, so a job's
//! messages read back in time order. A second message with the same epoch
//! and level replaces the first.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{info, warn};

use super::{wants, Logger};
use crate::pm::{Command, Message};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("log database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create {path}: {source}")]
    Dir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct DbLogger {
    db: Mutex<Connection>,
    levels: Vec<i32>,
}

impl DbLogger {
    pub fn open(path: &Path, levels: Vec<i32>) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DbError::Dir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let logger = Self::init(Connection::open(path)?, levels)?;
        info!(db_path = %path.display(), "Log database opened");
        Ok(logger)
    }

    pub fn in_memory(levels: Vec<i32>) -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?, levels)
    }

    fn init(conn: Connection, levels: Vec<i32>) -> Result<Self, DbError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS logs (
                job     TEXT NOT NULL,
                key     TEXT NOT NULL,
                message TEXT NOT NULL,
                PRIMARY KEY (job, key)
            )",
        )?;
        Ok(Self {
            db: Mutex::new(conn),
            levels,
        })
    }

    pub fn store(&self, message: &Message) -> Result<(), DbError> {
        let value = serde_json::to_string(message)?;
        self.db.lock().execute(
            "INSERT OR REPLACE INTO logs (job, key, message) VALUES (?1, ?2, ?3)",
            params![&*message.command_id, log_key(message), value],
        )?;
        Ok(())
    }

    /// Stored messages of one job as `(key, message)`, oldest first.
    pub fn messages(&self, job: &str) -> Result<Vec<(String, Message)>, DbError> {
        let db = self.db.lock();
        let mut stmt = db.prepare("SELECT key, message FROM logs WHERE job = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![job], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, raw) = row?;
            out.push((key, serde_json::from_str(&raw)?));
        }
        Ok(out)
    }
}

/// `%020d-%03d` of epoch and level.
pub fn log_key(message: &Message) -> String {
    format!("{:020}-{:03}", message.epoch, message.level)
}

impl Logger for DbLogger {
    fn log(&self, command: &Command, message: &Message) {
        if !wants(&self.levels, command, message) {
            return;
        }
        if let Err(e) = self.store(message) {
            warn!(command_id = %message.command_id, error = %e, "failed to store message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: &str, epoch: i64, level: i32, text: &str) -> Message {
        let mut message = Message::new(id.into(), level, text);
        message.epoch = epoch;
        message
    }

    #[test]
    fn test_log_key_format() {
        assert_eq!(log_key(&at("j", 1700000000123, 2, "x")), "00000001700000000123-002");
    }

    #[test]
    fn test_stores_filtered_messages_per_job() {
        let logger = DbLogger::in_memory(vec![1, 2]).unwrap();
        let cmd = Command::with_id("job-a", "sh");
        let other = Command::with_id("job-b", "sh");

        logger.log(&cmd, &at("job-a", 20, 1, "second"));
        logger.log(&cmd, &at("job-a", 10, 2, "first"));
        logger.log(&cmd, &at("job-a", 30, 7, "filtered"));
        logger.log(&other, &at("job-b", 10, 1, "elsewhere"));

        let stored = logger.messages("job-a").unwrap();
        let texts: Vec<&str> = stored.iter().map(|(_, m)| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(stored[0].0, "00000000000000000010-002");
        assert_eq!(logger.messages("job-b").unwrap().len(), 1);
    }

    #[test]
    fn test_command_levels_override_defaults() {
        let logger = DbLogger::in_memory(vec![1]).unwrap();
        let cmd = Command::with_id("job", "sh").log_levels(vec![9]);

        logger.log(&cmd, &at("job", 1, 1, "dropped"));
        logger.log(&cmd, &at("job", 2, 9, "kept"));

        let stored = logger.messages("job").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.level, 9);
    }

    #[test]
    fn test_same_key_replaces() {
        let logger = DbLogger::in_memory(Vec::new()).unwrap();
        logger.store(&at("job", 5, 1, "old")).unwrap();
        logger.store(&at("job", 5, 1, "new")).unwrap();

        let stored = logger.messages("job").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.text, "new");
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs/agent.db");

        {
            let logger = DbLogger::open(&path, Vec::new()).unwrap();
            logger.store(&at("job", 1, 1, "persisted")).unwrap();
        }

        let reopened = DbLogger::open(&path, Vec::new()).unwrap();
        assert_eq!(reopened.messages("job").unwrap()[0].1.text, "persisted");
    }
}
