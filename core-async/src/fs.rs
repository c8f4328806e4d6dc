//! Async filesystem helpers re-exported from the underlying runtime.
//!
//! The metadata coordinator only needs to probe paths before dispatching
//! them; the parsers themselves read files synchronously on the blocking pool.

use std::path::Path;

pub use tokio::fs::{metadata, read, read_to_string, remove_file, write, File};

/// Returns `true` when `path` names an existing regular file that can be
/// opened for reading.
///
/// Directories, dangling symlinks and files without read permission all
/// count as missing.
pub async fn is_readable_file(path: &Path) -> bool {
    match metadata(path).await {
        Ok(meta) if meta.is_file() => File::open(path).await.is_ok(),
        _ => false,
    }
}
