//! Atomic owner-only file persistence.
//!
//! Write flow: serialize → `<name>.tmp` sibling → `chmod 0600` → `rename`.
//! The `.tmp` file always lives in the target's directory (same filesystem,
//! so the rename is atomic).

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};

/// Atomically replace `path` with `contents`, mode `0600`.
pub fn write_private(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(err) = set_file_permissions(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Create `dir` (and parents) with mode `0700` if it does not exist yet.
pub fn ensure_private_dir(dir: &Path) -> Result<(), CoreError> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    set_dir_permissions(dir)
}

/// `<path>.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}
