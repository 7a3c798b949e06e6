//! Source — plist locator parsing and archive format selection.
//!
//! A locator is a bare filesystem path, a `file://` URL, or an
//! `http(s)://` URL. The archive format comes from the file extension.
//! Nothing here touches the filesystem or the network.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use super::error::PlistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistFormat {
    /// `.tar`
    Tar,
    /// `.gz`, `.tgz`
    Gzip,
    /// `.bz2`, `.tbz2`
    Bzip2,
}

impl PlistFormat {
    pub fn from_path(path: &str) -> Result<Self, PlistError> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "tar" => Ok(PlistFormat::Tar),
            "gz" | "tgz" => Ok(PlistFormat::Gzip),
            "bz2" | "tbz2" => Ok(PlistFormat::Bzip2),
            "" => Err(PlistError::UnknownFormat(String::new())),
            other => Err(PlistError::UnknownFormat(format!(".{}", other))),
        }
    }
}

impl fmt::Display for PlistFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlistFormat::Tar => "tar",
            PlistFormat::Gzip => "gzip",
            PlistFormat::Bzip2 => "bzip2",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlistLocation {
    Local(PathBuf),
    Remote(Url),
}

/// A parsed plist locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlistSource {
    raw: String,
    location: PlistLocation,
    format: PlistFormat,
}

impl PlistSource {
    pub fn parse(src: &str) -> Result<Self, PlistError> {
        let location = match Url::parse(src) {
            Ok(url) => match url.scheme() {
                "file" => PlistLocation::Local(
                    url.to_file_path()
                        .map_err(|_| PlistError::InvalidSource(src.to_string()))?,
                ),
                "http" | "https" => PlistLocation::Remote(url),
                other => {
                    return Err(PlistError::UnsupportedScheme {
                        src: src.to_string(),
                        scheme: other.to_string(),
                    })
                }
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => PlistLocation::Local(PathBuf::from(src)),
            Err(e) => return Err(PlistError::InvalidSource(format!("{}: {}", src, e))),
        };

        let format = match &location {
            PlistLocation::Local(path) => PlistFormat::from_path(&path.to_string_lossy())?,
            PlistLocation::Remote(url) => PlistFormat::from_path(url.path())?,
        };

        Ok(Self {
            raw: src.to_string(),
            location,
            format,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn location(&self) -> &PlistLocation {
        &self.location
    }

    pub fn format(&self) -> PlistFormat {
        self.format
    }

    /// Content hash of the locator string.
    pub fn hash(&self) -> String {
        locator_hash(&self.raw)
    }
}

/// Hex MD5 of a locator string. The same locator always yields the same key.
pub fn locator_hash(src: &str) -> String {
    format!("{:x}", md5::compute(src.as_bytes()))
}

/// True when `src` parses as a URL with a scheme.
///
/// Bare paths (absolute or relative) have none.
pub fn has_scheme(src: &str) -> Result<bool, PlistError> {
    match Url::parse(src) {
        Ok(_) => Ok(true),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(false),
        Err(e) => Err(PlistError::InvalidSource(format!("{}: {}", src, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_by_extension() {
        assert_eq!(PlistFormat::from_path("plist.tar").unwrap(), PlistFormat::Tar);
        assert_eq!(PlistFormat::from_path("plist.tgz").unwrap(), PlistFormat::Gzip);
        assert_eq!(PlistFormat::from_path("a/plist.tar.gz").unwrap(), PlistFormat::Gzip);
        assert_eq!(PlistFormat::from_path("plist.bz2").unwrap(), PlistFormat::Bzip2);
        assert_eq!(PlistFormat::from_path("plist.tbz2").unwrap(), PlistFormat::Bzip2);
    }

    #[test]
    fn test_unknown_format() {
        let err = PlistFormat::from_path("plist.xyz").unwrap_err();
        assert_eq!(err.to_string(), "unknown plist format .xyz");
        assert!(PlistFormat::from_path("plist").is_err());
    }

    #[test]
    fn test_bare_path_is_local() {
        let source = PlistSource::parse("plist.tgz").unwrap();
        assert_eq!(source.location(), &PlistLocation::Local(PathBuf::from("plist.tgz")));
        assert_eq!(source.format(), PlistFormat::Gzip);

        let source = PlistSource::parse("/var/cache/root.bz2").unwrap();
        assert_eq!(
            source.location(),
            &PlistLocation::Local(PathBuf::from("/var/cache/root.bz2"))
        );
        assert_eq!(source.format(), PlistFormat::Bzip2);
    }

    #[test]
    fn test_file_url_is_local() {
        let source = PlistSource::parse("file:///opt/plists/base.tar").unwrap();
        assert_eq!(
            source.location(),
            &PlistLocation::Local(PathBuf::from("/opt/plists/base.tar"))
        );
        assert_eq!(source.format(), PlistFormat::Tar);
    }

    #[test]
    fn test_http_url_is_remote() {
        let source = PlistSource::parse("https://hub.example.com/flists/ubuntu.tgz").unwrap();
        assert!(matches!(source.location(), PlistLocation::Remote(u) if u.host_str() == Some("hub.example.com")));
        assert_eq!(source.format(), PlistFormat::Gzip);
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = PlistSource::parse("ftp://host/plist.tgz").unwrap_err();
        assert!(matches!(err, PlistError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));
    }

    #[test]
    fn test_unknown_format_rejected_before_any_io() {
        // The path does not exist: a format error proves nothing was opened.
        let err = PlistSource::parse("/does/not/exist/plist.xyz").unwrap_err();
        assert!(matches!(err, PlistError::UnknownFormat(ref e) if e == ".xyz"));
    }

    #[test]
    fn test_hash_is_stable_and_locator_specific() {
        let a = PlistSource::parse("plist.tgz").unwrap();
        let b = PlistSource::parse("plist.tgz").unwrap();
        let c = PlistSource::parse("./plist.tgz").unwrap();

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_eq!(a.hash().len(), 32);
        assert_eq!(locator_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_has_scheme() {
        assert!(!has_scheme("/var/lib/data").unwrap());
        assert!(!has_scheme("relative/dir").unwrap());
        assert!(has_scheme("https://x/y.tgz").unwrap());
        assert!(has_scheme("file:///x.tar").unwrap());
    }
}
