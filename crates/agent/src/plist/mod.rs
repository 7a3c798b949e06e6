//! Plist module — locator parsing, fetching, decompression and the
//! content-addressed metadata cache.

pub mod cache;
pub mod error;
pub mod extract;
pub mod reader;
pub mod source;

pub use cache::PlistCache;
pub use error::PlistError;
pub use source::{has_scheme, locator_hash, PlistFormat, PlistLocation, PlistSource};
