//! Process management — commands, leveled output framing, hooks, and the
//! ready/exit gate built on top of them.

pub mod command;
pub mod fake;
pub mod gate;
pub mod hook;
pub mod local;
pub mod manager;
pub mod message;
pub mod stream;

pub use command::Command;
pub use gate::{GateError, GateOutcome, GateSignal, GateWaiter, ReadyGate};
pub use hook::{ExitHook, Hook, HookError, MatchHook};
pub use local::LocalProcessManager;
pub use manager::{JobHandle, JobResult, JobState, PmError, ProcessManager};
pub use message::{Message, LEVEL_STDERR, LEVEL_STDOUT};
pub use stream::{LevelFramer, StreamConsumer, StreamEnd, StreamError};
