//! Bind — raw bind mounts of host paths into a container tree.

use std::io;
use std::path::Path;

use nix::mount::{mount, MsFlags};

/// Performs a bind mount. Swappable so composition can be exercised without
/// privileges.
pub trait Binder: Send + Sync {
    fn bind(&self, src: &Path, target: &Path) -> io::Result<()>;
}

/// `mount(2)` with `MS_BIND`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysBinder;

impl Binder for SysBinder {
    fn bind(&self, src: &Path, target: &Path) -> io::Result<()> {
        mount(
            Some(src),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(io::Error::from)
    }
}
