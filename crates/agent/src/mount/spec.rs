//! Spec — what a container's filesystem is composed of.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::MountError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub id: u64,
    /// Plist locator of the root filesystem.
    pub root: String,
    /// Storage backend URL; the agent default when absent.
    #[serde(default)]
    pub storage: Option<String>,
    /// Additional mounts: source (host path or plist locator) to
    /// destination inside the container.
    #[serde(default)]
    pub mount: HashMap<String, String>,
}

impl ContainerSpec {
    pub fn new(id: u64, root: impl Into<String>) -> Self {
        Self {
            id,
            root: root.into(),
            storage: None,
            mount: HashMap::new(),
        }
    }

    pub fn with_mount(mut self, src: impl Into<String>, dst: impl Into<String>) -> Self {
        self.mount.insert(src.into(), dst.into());
        self
    }

    pub fn with_storage(mut self, url: impl Into<String>) -> Self {
        self.storage = Some(url.into());
        self
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// `container-<id>`. Seeds both cache and mountpoint paths.
    pub fn name(&self) -> String {
        container_name(self.id)
    }

    /// The per-mount storage override, if any.
    pub fn storage(&self) -> Option<&str> {
        self.storage.as_deref().filter(|s| !s.is_empty())
    }

    /// Additional mounts as `(source, destination)`, ordered by destination.
    pub fn sorted_mounts(&self) -> Vec<(&str, &str)> {
        let mut mounts: Vec<(&str, &str)> = self
            .mount
            .iter()
            .map(|(src, dst)| (src.as_str(), dst.as_str()))
            .collect();
        mounts.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        mounts
    }
}

pub fn container_name(id: u64) -> String {
    format!("container-{}", id)
}

/// Join a container-relative destination onto `root`. Leading slashes are
/// relative to the container root; `..` is rejected.
pub fn join_inside(root: &Path, dst: &str) -> Result<PathBuf, MountError> {
    let relative = Path::new(dst.trim_start_matches('/'));
    let mut target = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => return Err(MountError::InvalidTarget(dst.to_string())),
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        assert_eq!(ContainerSpec::new(42, "root.tgz").name(), "container-42");
    }

    #[test]
    fn test_sorted_mounts_by_destination() {
        let spec = ContainerSpec::new(1, "root.tgz")
            .with_mount("/host/z", "/opt")
            .with_mount("http://hub/x.tgz", "/data")
            .with_mount("/host/a", "/var/lib");

        assert_eq!(
            spec.sorted_mounts(),
            vec![
                ("http://hub/x.tgz", "/data"),
                ("/host/z", "/opt"),
                ("/host/a", "/var/lib"),
            ]
        );
    }

    #[test]
    fn test_join_inside() {
        let root = Path::new("/mnt/container-1");
        assert_eq!(
            join_inside(root, "/var/lib").unwrap(),
            PathBuf::from("/mnt/container-1/var/lib")
        );
        assert_eq!(
            join_inside(root, "data/./x").unwrap(),
            PathBuf::from("/mnt/container-1/data/x")
        );
        assert!(matches!(
            join_inside(root, "/../etc"),
            Err(MountError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_blank_storage_is_none() {
        assert_eq!(ContainerSpec::new(1, "r.tar").with_storage("").storage(), None);
        assert_eq!(
            ContainerSpec::new(1, "r.tar").with_storage("ardb://s:1").storage(),
            Some("ardb://s:1")
        );
    }

    #[test]
    fn test_from_toml() {
        let spec: ContainerSpec = toml::from_str(
            r#"
            id = 3
            root = "http://hub/root.tgz"

            [mount]
            "/srv/data" = "/data"
            "#,
        )
        .unwrap();

        assert_eq!(spec.id, 3);
        assert_eq!(spec.storage, None);
        assert_eq!(spec.mount.get("/srv/data").map(String::as_str), Some("/data"));
    }
}
