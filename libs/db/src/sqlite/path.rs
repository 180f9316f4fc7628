//! SQLite path preparation utilities.

use std::io;
use std::path::PathBuf;

use super::is_memory_dsn;

/// Ensure the parent directory of a file-backed SQLite database exists.
///
/// Memory databases and DSNs without a usable path are returned unchanged.
pub(crate) fn prepare_sqlite_path(dsn: &str, create_dirs: bool) -> io::Result<String> {
    if !create_dirs || is_memory_dsn(dsn) {
        return Ok(dsn.to_string());
    }

    if let Some(path) = extract_file_path_from_dsn(dsn) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // One-time blocking call during startup.
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    Ok(dsn.to_string())
}

/// Extract the file path from `sqlite://<path>` or `sqlite:<path>`.
fn extract_file_path_from_dsn(dsn: &str) -> Option<PathBuf> {
    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();

    if path.is_empty() || path.starts_with("file:") || path.contains(":memory:") {
        return None;
    }
    Some(PathBuf::from(path))
}
