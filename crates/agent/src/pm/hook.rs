//! Hooks — callbacks registered with a command at submission time.
//!
//! A [`MatchHook`] fires once for every message whose text matches its
//! pattern. An [`ExitHook`] fires exactly once when the process terminates.
//! Hooks cannot be removed once registered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use thiserror::Error;

use super::message::Message;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Invalid hook pattern: {0}")]
    InvalidPattern(String),
}

type MatchAction = Arc<dyn Fn(&Message) + Send + Sync>;
type ExitAction = Box<dyn FnOnce(bool) + Send>;

pub struct MatchHook {
    pattern: String,
    matcher: RegexMatcher,
    action: MatchAction,
    fired: AtomicU64,
}

impl MatchHook {
    /// Case-sensitive regex match against the message text.
    pub fn new<F>(pattern: &str, action: F) -> Result<Self, HookError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let matcher = RegexMatcherBuilder::new()
            .case_insensitive(false)
            .multi_line(false)
            .build(pattern)
            .map_err(|e| HookError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            action: Arc::new(action),
            fired: AtomicU64::new(0),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline]
    pub fn matches(&self, message: &Message) -> bool {
        self.matcher.is_match(message.text.as_bytes()).unwrap_or(false)
    }

    /// Run the action if the message matches. Returns whether it fired.
    pub fn offer(&self, message: &Message) -> bool {
        if !self.matches(message) {
            return false;
        }
        self.fired.fetch_add(1, Ordering::Relaxed);
        (self.action)(message);
        true
    }

    /// Number of messages this hook has fired for.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MatchHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchHook")
            .field("pattern", &self.pattern)
            .field("fired", &self.fired())
            .finish()
    }
}

pub struct ExitHook {
    action: ExitAction,
}

impl ExitHook {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        Self {
            action: Box::new(action),
        }
    }

    /// Consumes the hook, so it can only ever fire once.
    pub fn fire(self, success: bool) {
        (self.action)(success)
    }
}

impl std::fmt::Debug for ExitHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExitHook")
    }
}

#[derive(Debug)]
pub enum Hook {
    Match(MatchHook),
    Exit(ExitHook),
}

impl From<MatchHook> for Hook {
    fn from(hook: MatchHook) -> Self {
        Hook::Match(hook)
    }
}

impl From<ExitHook> for Hook {
    fn from(hook: ExitHook) -> Self {
        Hook::Exit(hook)
    }
}

/// Every match hook of one command. Shared by that command's stream
/// consumers, which may dispatch concurrently.
#[derive(Debug, Default)]
pub struct MatchHooks(Vec<MatchHook>);

impl MatchHooks {
    /// Offer a message to every hook. Returns how many fired.
    pub fn dispatch(&self, message: &Message) -> usize {
        self.0.iter().filter(|hook| hook.offer(message)).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Every exit hook of one command.
#[derive(Debug, Default)]
pub struct ExitHooks(Vec<ExitHook>);

impl ExitHooks {
    /// Fire all exit hooks with the final outcome.
    pub fn fire(self, success: bool) {
        for hook in self.0 {
            hook.fire(success);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split registered hooks by kind.
pub fn partition(hooks: Vec<Hook>) -> (MatchHooks, ExitHooks) {
    let mut matches = Vec::new();
    let mut exits = Vec::new();
    for hook in hooks {
        match hook {
            Hook::Match(h) => matches.push(h),
            Hook::Exit(h) => exits.push(h),
        }
    }
    (MatchHooks(matches), ExitHooks(exits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    fn msg(text: &str) -> Message {
        Message::new(Arc::from("cmd"), 1, text)
    }

    #[test]
    fn test_match_hook_fires_per_matching_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook = MatchHook::new("mount starts", move |m| {
            sink.lock().unwrap().push(m.text.clone());
        })
        .unwrap();

        assert!(hook.offer(&msg("g8ufs: mount starts")));
        assert!(!hook.offer(&msg("mounting")));
        assert!(hook.offer(&msg("mount starts again")));

        assert_eq!(hook.fired(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_match_hook_is_case_sensitive() {
        let hook = MatchHook::new("ready", |_| {}).unwrap();
        assert!(hook.matches(&msg("server ready")));
        assert!(!hook.matches(&msg("SERVER READY")));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = MatchHook::new("[unclosed", |_| {});
        assert!(matches!(result, Err(HookError::InvalidPattern(_))));
    }

    #[test]
    fn test_partition_and_dispatch() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let hooks = vec![
            Hook::from(MatchHook::new("a", |_| {}).unwrap()),
            Hook::from(ExitHook::new(move |ok| flag.store(ok, Ordering::SeqCst))),
            Hook::from(MatchHook::new("b", |_| {}).unwrap()),
        ];

        let (matches, exits) = partition(hooks);
        assert_eq!(matches.len(), 2);
        assert_eq!(exits.len(), 1);

        assert_eq!(matches.dispatch(&msg("ab")), 2);
        assert_eq!(matches.dispatch(&msg("b")), 1);
        assert_eq!(matches.dispatch(&msg("c")), 0);

        exits.fire(true);
        assert!(exited.load(Ordering::SeqCst));
    }
}
