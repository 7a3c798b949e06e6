use std::path::PathBuf;
use thiserror::Error;

use super::source::PlistFormat;

#[derive(Error, Debug)]
pub enum PlistError {
    #[error("invalid plist url ({0})")]
    InvalidSource(String),
    #[error("invalid plist url ({src}): unsupported scheme '{scheme}'")]
    UnsupportedScheme { src: String, scheme: String },
    #[error("unknown plist format {0}")]
    UnknownFormat(String),
    #[error("plist source not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to fetch plist {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to open {format} decompressor: {reason}")]
    Decompressor { format: PlistFormat, reason: String },
    #[error("corrupt plist archive: {0}")]
    Archive(#[source] std::io::Error),
    #[error("unsafe archive entry path: {0}")]
    UnsafePath(String),
    #[error("{op} {path}: {source}")]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

impl PlistError {
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PlistError::Fs { op, path, source }
    }
}
