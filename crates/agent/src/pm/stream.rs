//! Stream — leveled line protocol framing over a process output stream.
//!
//! Wire format, one frame per line:
//!
//! ```text
//! 3::single line message at level 3
//! 5:::first line of a multiline message at level 5
//! second line
//! :::
//! anything else is emitted verbatim at the consumer's default level
//! ```
//!
//! A multiline block still open at end-of-stream is discarded.

use std::sync::Arc;

use grep_matcher::{Captures, Matcher};
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::message::Message;

const FRAME_PATTERN: &str = r"^(\d+)(:{2,3})(.*)$";
const MULTILINE_OPEN: &str = ":::";
const MULTILINE_CLOSE: &str = ":::";

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid frame pattern: {0}")]
    Pattern(String),
}

/// How a consumed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Clean end-of-stream.
    Eof,
    /// A read error stopped consumption early.
    Failed(String),
}

/// Synchronous framing state machine: raw lines in, messages out.
pub struct LevelFramer {
    command_id: Arc<str>,
    default_level: i32,
    matcher: RegexMatcher,
    /// `(level, accumulated text)` while inside a multiline block.
    pending: Option<(i32, String)>,
}

impl LevelFramer {
    pub fn new(command_id: Arc<str>, default_level: i32) -> Result<Self, StreamError> {
        let matcher = RegexMatcherBuilder::new()
            .multi_line(false)
            .build(FRAME_PATTERN)
            .map_err(|e| StreamError::Pattern(e.to_string()))?;

        Ok(Self {
            command_id,
            default_level,
            matcher,
            pending: None,
        })
    }

    /// Feed one raw line (without its terminator).
    ///
    /// Returns the message completed by this line, if any. Empty lines are
    /// ignored, including inside multiline blocks.
    pub fn push_line(&mut self, line: &str) -> Option<Message> {
        if line.is_empty() {
            return None;
        }

        if let Some((_, text)) = self.pending.as_mut() {
            if line == MULTILINE_CLOSE {
                let (level, text) = self.pending.take()?;
                return Some(Message::new(Arc::clone(&self.command_id), level, text));
            }
            text.push('\n');
            text.push_str(line);
            return None;
        }

        match self.frame(line) {
            None => Some(Message::new(
                Arc::clone(&self.command_id),
                self.default_level,
                line,
            )),
            Some((level, colons, text)) if colons == MULTILINE_OPEN => {
                self.pending = Some((level, text.to_string()));
                None
            }
            Some((level, _, text)) => {
                Some(Message::new(Arc::clone(&self.command_id), level, text))
            }
        }
    }

    /// True while a multiline block is open.
    pub fn in_multiline(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop an unterminated multiline block. Returns true if one was open.
    pub fn discard_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Split a framed line into `(level, colons, text)`.
    ///
    /// A level that does not fit an `i32` makes the line unframed.
    fn frame<'a>(&self, line: &'a str) -> Option<(i32, &'a str, &'a str)> {
        let mut caps = self.matcher.new_captures().ok()?;
        if !self.matcher.captures(line.as_bytes(), &mut caps).ok()? {
            return None;
        }

        let slice = |i: usize| caps.get(i).and_then(|m| line.get(m.start()..m.end()));
        let level = slice(1)?.parse::<i32>().ok()?;
        Some((level, slice(2)?, slice(3)?))
    }
}

/// Reads a process output stream to the end, framing it into [`Message`]s.
pub struct StreamConsumer<R> {
    framer: LevelFramer,
    reader: R,
}

impl<R> StreamConsumer<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(command_id: Arc<str>, reader: R, default_level: i32) -> Result<Self, StreamError> {
        Ok(Self {
            framer: LevelFramer::new(command_id, default_level)?,
            reader,
        })
    }

    /// Consume on a detached task. The handler runs on that task, once per
    /// message, in stream order. The returned handle resolves exactly once
    /// when consumption stops; aborting it stops the handler between lines.
    pub fn consume<F>(self, handler: F) -> JoinHandle<StreamEnd>
    where
        F: FnMut(Message) + Send + 'static,
    {
        tokio::spawn(self.run(handler))
    }

    /// Consume inline until end-of-stream or a read error.
    pub async fn run<F>(mut self, mut handler: F) -> StreamEnd
    where
        F: FnMut(Message),
    {
        let mut reader = BufReader::new(self.reader);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    if self.framer.discard_pending() {
                        debug!(
                            command_id = %self.framer.command_id,
                            "stream closed inside a multiline message, discarding it"
                        );
                    }
                    return StreamEnd::Eof;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if let Some(message) = self.framer.push_line(trim_terminator(&line)) {
                        handler(message);
                    }
                }
                Err(e) => {
                    warn!(
                        command_id = %self.framer.command_id,
                        error = %e,
                        "failed to read process output"
                    );
                    self.framer.discard_pending();
                    return StreamEnd::Failed(e.to_string());
                }
            }
        }
    }
}

fn trim_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
