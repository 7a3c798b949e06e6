//! Reader — open a plist source as a decompressed byte stream.
//!
//! Decoders own the stream they wrap, so every layer opened so far is
//! released when a later layer fails to initialise.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use tracing::debug;

use super::error::PlistError;
use super::source::{PlistFormat, PlistLocation, PlistSource};

pub type PlistReader = Box<dyn Read + Send>;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Open the source and wrap it in the decoder its format needs.
pub fn open(source: &PlistSource) -> Result<PlistReader, PlistError> {
    let raw = open_raw(source)?;
    decompress(source.format(), raw)
}

fn open_raw(source: &PlistSource) -> Result<PlistReader, PlistError> {
    match source.location() {
        PlistLocation::Local(path) => {
            if !path.exists() {
                return Err(PlistError::NotFound(path.clone()));
            }
            let file = File::open(path).map_err(PlistError::fs("open", path))?;
            Ok(Box::new(file))
        }
        PlistLocation::Remote(url) => {
            debug!(url = %url, "fetching plist");
            let fetch_err = |source| PlistError::Fetch {
                url: url.to_string(),
                source,
            };
            let response = reqwest::blocking::get(url.clone())
                .map_err(fetch_err)?
                .error_for_status()
                .map_err(fetch_err)?;
            Ok(Box::new(response))
        }
    }
}

/// Wrap `raw` in the decoder for `format`.
///
/// Compressed formats are checked for their magic bytes up front; on a
/// mismatch `raw` is dropped (closing the file or connection) before the
/// error is returned.
pub fn decompress(format: PlistFormat, raw: PlistReader) -> Result<PlistReader, PlistError> {
    match format {
        PlistFormat::Tar => Ok(raw),
        PlistFormat::Gzip => {
            let mut buffered = BufReader::new(raw);
            check_magic(&mut buffered, GZIP_MAGIC, format)?;
            Ok(Box::new(flate2::bufread::GzDecoder::new(buffered)))
        }
        PlistFormat::Bzip2 => {
            let mut buffered = BufReader::new(raw);
            check_magic(&mut buffered, BZIP2_MAGIC, format)?;
            Ok(Box::new(bzip2::bufread::BzDecoder::new(buffered)))
        }
    }
}

fn check_magic<R: BufRead>(reader: &mut R, magic: &[u8], format: PlistFormat) -> Result<(), PlistError> {
    let head = reader.fill_buf().map_err(|e| PlistError::Decompressor {
        format,
        reason: e.to_string(),
    })?;

    if head.is_empty() {
        return Err(PlistError::Decompressor {
            format,
            reason: "empty stream".to_string(),
        });
    }

    // A short first read can only be checked as far as it goes.
    let n = head.len().min(magic.len());
    if head[..n] != magic[..n] {
        return Err(PlistError::Decompressor {
            format,
            reason: "invalid header".to_string(),
        });
    }
    Ok(())
}
