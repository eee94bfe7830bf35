//! Atomic file writing via tempfile + rename.
//!
//! Content goes to a [`tempfile::NamedTempFile`] in the target's directory,
//! which is then persisted over the target. Readers never observe a partially
//! written file.

use std::fs::{self, Permissions};
use std::io::Write;
use std::path::Path;

use crate::error::{ToolError, ToolResult};

/// Mode for files that did not exist before the write.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// Atomically replace `path` with `content` and return the size on disk.
///
/// Parent directories are created as needed. An existing file keeps its
/// permissions. The size on disk is checked against `content.len()`.
///
/// # Errors
///
/// Returns [`ToolError::Io`] if any filesystem step fails and
/// [`ToolError::SizeMismatch`] if the persisted file has the wrong length.
pub fn atomic_write(path: &Path, content: &[u8]) -> ToolResult<u64> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| ToolError::io("Failed to create directories for", path, e))?;

    let permissions = match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_file_permissions(),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ToolError::io("Failed to create temp file in", parent, e))?;
    tmp.write_all(content)
        .and_then(|()| tmp.flush())
        .map_err(|e| ToolError::io("Failed to write file", path, e))?;
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| ToolError::io("Failed to set permissions on", path, e))?;
    }
    tmp.persist(path)
        .map_err(|e| ToolError::io("Failed to write file", path, e.error))?;

    let actual = fs::metadata(path)
        .map_err(|e| ToolError::io("Failed to verify file", path, e))?
        .len();
    let expected = content.len() as u64;
    if actual != expected {
        return Err(ToolError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(actual)
}

#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}
