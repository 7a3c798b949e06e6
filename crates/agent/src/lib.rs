// Domain-driven module structure for the node agent.

// Core infrastructure
pub mod pm;
pub mod sink;
pub mod batch;
pub mod state;

// Domain modules
pub mod plist;
pub mod mount;
pub mod conf;
pub mod runtime;
