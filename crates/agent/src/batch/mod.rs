//! Batch module — size- and time-bounded buffering in front of a sender.

pub mod buffer;

pub use buffer::{BatchBuffer, BatchError};
