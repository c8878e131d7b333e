//! Crash-safe file persistence.
//!
//! Every persisted record (config, status, sections, variables) is written to
//! a temporary file in the destination directory, flushed to disk, and then
//! renamed over the destination. A process killed mid-write leaves either the
//! previous file or the new one, never a truncated mix.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{FolioError, Result};

/// Atomically replace `path` with `contents`.
///
/// The parent directory is created if it does not already exist.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let persistence = |source: std::io::Error| FolioError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(parent).map_err(persistence)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(persistence)?;
    tmp.write_all(contents).map_err(persistence)?;
    tmp.as_file().sync_all().map_err(persistence)?;
    tmp.persist(path).map_err(|e| persistence(e.error))?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "File persisted");
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

/// Read a JSON record.
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but
/// cannot be decoded is reported as [`FolioError::CorruptState`] so callers can
/// tell "nothing here yet" apart from "something is broken".
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FolioError::Io(e)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| FolioError::CorruptState {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
