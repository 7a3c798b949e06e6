//! Mount module — container filesystem composition.

pub mod bind;
pub mod error;
pub mod orchestrator;
pub mod spec;

pub use bind::{Binder, SysBinder};
pub use error::MountError;
pub use orchestrator::{MountConfig, MountOrchestrator, MountState};
pub use spec::{container_name, ContainerSpec};
