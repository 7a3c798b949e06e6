//! State module — shared agent state.

pub mod agent;

pub use agent::{AgentState, SharedState};
