//! Utility functions for Waypoint.
//!
//! Bounded reads for user-supplied files and the atomic write used by the
//! file store and config saving.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, WaypointError};

/// Maximum file size that can be read into memory (10 MB).
///
/// Unit snapshots and generated units are a few kilobytes; the ledger is the
/// only file expected to grow.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Read a file into a string, refusing files over `MAX_FILE_SIZE`.
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Read a file into a string with a custom size limit.
///
/// # Errors
///
/// Returns a storage error if the file cannot be read or exceeds `max_size`.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| WaypointError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(WaypointError::storage(
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file is too large ({} bytes, max {} bytes)", size, max_size),
            ),
        ));
    }

    fs::read_to_string(path).map_err(|e| WaypointError::storage(path, e))
}

/// Temp file used while atomically writing `path`: a dotfile beside it.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Write `bytes` to `path` atomically: temp file, fsync, rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);
    {
        let mut file =
            fs::File::create(&temp_path).map_err(|e| WaypointError::storage(&temp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| WaypointError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| WaypointError::storage(&temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| WaypointError::storage(path, e))
}
