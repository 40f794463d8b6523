//! Filesystem discipline shared by every on-disk store.
//!
//! - atomic writes: temp file in the target directory, fsync, rename
//! - Unix permission modes on files and directories
//! - quarantine of corrupt artifacts (rename with a timestamped suffix)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

/// Create a directory (and parents) with the given Unix mode.
pub fn ensure_dir(path: &Path, mode: u32) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    set_mode(path, mode)?;
    Ok(())
}

/// Write a file atomically with the given Unix mode.
///
/// The bytes land in a hidden temp sibling first, are fsynced, and are then
/// renamed over the target. Concurrent writers converge on a
/// last-writer-wins outcome; readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));
    let mut tmp = fs::File::create(&tmp_path)?;
    set_mode(&tmp_path, mode)?;
    tmp.write_all(bytes)?;
    tmp.sync_all()?;
    drop(tmp);

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            Err(err)
        }
    }
}

/// Rename a corrupt artifact out of the way, returning the new path.
///
/// The original name gains a `.corrupt.<unix-seconds>` suffix so repeated
/// quarantines never collide and the user can inspect what was saved.
pub fn quarantine(path: &Path) -> io::Result<PathBuf> {
    let ts = chrono::Utc::now().timestamp();
    let mut target = PathBuf::from(format!("{}.corrupt.{ts}", path.display()));
    let mut bump = 0;
    while target.exists() {
        bump += 1;
        target = PathBuf::from(format!("{}.corrupt.{ts}.{bump}", path.display()));
    }
    fs::rename(path, &target)?;
    warn!(from = %path.display(), to = %target.display(), "quarantined corrupt file");
    Ok(target)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Read a file's Unix mode bits (low 12 bits). Test helper on Unix only.
#[cfg(unix)]
pub fn read_mode(path: &Path) -> io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}
