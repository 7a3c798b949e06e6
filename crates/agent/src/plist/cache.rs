//! Cache — content-addressed extraction of plist metadata.
//!
//! Layout under the cache root, per container:
//! - `<root>/<container>/<md5(locator)>.db` extracted metadata
//! - `<root>/<container>/<md5(locator)>`    mount-helper backend dir

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::error::PlistError;
use super::extract::extract_into;
use super::reader;
use super::source::{locator_hash, PlistSource};

type Resolved = Result<PathBuf, Arc<PlistError>>;

pub struct PlistCache {
    root: PathBuf,
    /// In-flight resolutions keyed by `<container>/<hash>`.
    inflight: DashMap<String, Arc<OnceCell<Resolved>>>,
}

impl PlistCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inflight: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn container_dir(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    /// Where the metadata of `src` lands for `container`.
    pub fn db_path(&self, container: &str, src: &str) -> PathBuf {
        self.container_dir(container)
            .join(format!("{}.db", locator_hash(src)))
    }

    /// Backend storage directory handed to the mount helper.
    pub fn backend_path(&self, container: &str, src: &str) -> PathBuf {
        self.container_dir(container).join(locator_hash(src))
    }

    /// Blocking: fetch, decompress and unpack `src`, returning the metadata
    /// directory. The archive is unpacked into a staging directory and renamed
    /// into place, replacing any previous extraction.
    pub fn extract(&self, container: &str, src: &str) -> Result<PathBuf, PlistError> {
        let source = PlistSource::parse(src)?;
        let stream = reader::open(&source)?;

        let dir = self.container_dir(container);
        fs::create_dir_all(&dir).map_err(PlistError::fs("mkdirAll", &dir))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&dir)
            .map_err(PlistError::fs("mkdirTemp", &dir))?;
        let files = extract_into(stream, staging.path())?;

        let db = self.db_path(container, src);
        if db.exists() {
            fs::remove_dir_all(&db).map_err(PlistError::fs("remove", &db))?;
        }
        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, &db) {
            let _ = fs::remove_dir_all(&staged);
            return Err(PlistError::fs("rename", &db)(e));
        }

        info!(source = %src, path = %db.display(), files, "plist extracted");
        Ok(db)
    }

    /// Resolve `src` for `container` off the async runtime.
    ///
    /// Concurrent calls for the same (container, locator) share one
    /// extraction; every caller gets the leader's result. Once it completes
    /// the next call extracts afresh.
    pub async fn resolve(self: &Arc<Self>, container: &str, src: &str) -> Resolved {
        let key = format!("{}/{}", container, locator_hash(src));
        let cell = Arc::clone(&self.inflight.entry(key.clone()).or_default());

        let this = Arc::clone(self);
        let (owned_container, owned_src) = (container.to_string(), src.to_string());
        let result = cell
            .get_or_init(|| async move {
                tokio::task::spawn_blocking(move || this.extract(&owned_container, &owned_src))
                    .await
                    .map_err(|e| PlistError::Worker(e.to_string()))
                    .and_then(|r| r)
                    .map_err(Arc::new)
            })
            .await
            .clone();

        if self.inflight.remove_if(&key, |_, v| Arc::ptr_eq(v, &cell)).is_some() {
            debug!(key = %key, "plist resolution settled");
        }
        result
    }
}
