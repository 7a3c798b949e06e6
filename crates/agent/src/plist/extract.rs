//! Extract — unpack a plist archive's regular files into a directory.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path};

use tar::Archive;
use tracing::{debug, trace};

use super::error::PlistError;

/// Write every regular file of the archive under `dest`, creating parent
/// directories as needed. Directory entries are skipped; other entry kinds
/// (links, devices) are ignored. Returns the number of files written.
///
/// Any error aborts the whole extraction.
pub fn extract_into<R: Read>(reader: R, dest: &Path) -> Result<usize, PlistError> {
    let mut archive = Archive::new(reader);
    let mut written = 0usize;

    for entry in archive.entries().map_err(PlistError::Archive)? {
        let mut entry = entry.map_err(PlistError::Archive)?;
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            continue;
        }
        let name = entry.path().map_err(PlistError::Archive)?.into_owned();
        if !kind.is_file() {
            debug!(entry = %name.display(), ?kind, "skipping non-regular archive entry");
            continue;
        }

        // SECURITY: entries must stay inside `dest`
        if name
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(PlistError::UnsafePath(name.display().to_string()));
        }

        let target = dest.join(&name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(PlistError::fs("mkdirAll", parent))?;
        }

        trace!(entry = %name.display(), "extracting");
        let mut file = File::create(&target).map_err(PlistError::fs("create", &target))?;
        copy_entry(&mut entry, &mut file, &target)?;
        written += 1;
    }

    Ok(written)
}

/// Copy one entry, telling read failures (corrupt archive) apart from
/// write failures (filesystem).
fn copy_entry<R: Read>(entry: &mut R, file: &mut File, target: &Path) -> Result<(), PlistError> {
    use std::io::Write;

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PlistError::Archive(e)),
        };
        file.write_all(&buf[..n])
            .map_err(PlistError::fs("write", target))?;
    }
}
