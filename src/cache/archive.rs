//! Moving the whole blob directory as a single gzip-compressed tar.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::CacheError;

/// Lists the files in `dir` with the given extension, sorted by name.
pub(crate) fn list_blobs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, CacheError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::Io(dir.to_path_buf(), e)),
    };

    let mut blobs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CacheError::Io(dir.to_path_buf(), e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            blobs.push(path);
        }
    }
    blobs.sort();
    Ok(blobs)
}

/// Packs every blob in `dir` into `archive`. Returns the number of blobs.
///
/// The archive is written to a temporary sibling first and renamed into
/// place, so an interrupted pack never clobbers the previous archive.
pub fn pack(dir: &Path, extension: &str, archive: &Path) -> Result<usize, CacheError> {
    let blobs = list_blobs(dir, extension)?;

    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::Io(parent.to_path_buf(), e))?;
    }
    let partial = archive.with_extension("partial");
    let io_err = |e| CacheError::Io(partial.clone(), e);

    let file = File::create(&partial).map_err(io_err)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for blob in &blobs {
        let Some(name) = blob.file_name() else {
            continue;
        };
        builder.append_path_with_name(blob, name).map_err(io_err)?;
    }
    builder.into_inner().and_then(|gz| gz.finish()).map_err(io_err)?;

    fs::rename(&partial, archive).map_err(|e| CacheError::Io(archive.to_path_buf(), e))?;
    Ok(blobs.len())
}

/// Extracts `archive` into `dir`. Returns `false` if there is no archive.
pub fn unpack(archive: &Path, dir: &Path) -> Result<bool, CacheError> {
    let file = match File::open(archive) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CacheError::Io(archive.to_path_buf(), e)),
    };

    fs::create_dir_all(dir).map_err(|e| CacheError::Io(dir.to_path_buf(), e))?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(dir)
        .map_err(|e| CacheError::Io(archive.to_path_buf(), e))?;
    Ok(true)
}
