//! Filesystem adapter: modification-time lookup.

use std::fs;
use std::time::UNIX_EPOCH;

/// The file's mtime in whole seconds since the epoch, or `None` when the
/// path does not exist or cannot be inspected.
pub fn get_file_timestamp(path: &str) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let elapsed = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(elapsed.as_secs())
}
