//! File locking for checkpoint access
//!
//! Short `fd-lock` write/read locks guard each checkpoint rewrite. A
//! [`RunLock`] is held for a whole run so two processes never drive the
//! same checkpoint.

use super::state::ResumeError;
use std::ffi::OsString;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

/// `{path}.{suffix}`, keeping the original extension
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn open_lock_file(path: &Path) -> Result<File, ResumeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))
}

/// Exclusive lock held until dropped.
///
/// Owns the lock file; closing it on drop releases the OS lock.
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    /// Take the lock at `path` without blocking; fails if another holder has it
    pub fn try_acquire(path: &Path) -> Result<Self, ResumeError> {
        let file = open_lock_file(path)?;
        match file.try_lock() {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
                _file: file,
            }),
            Err(TryLockError::WouldBlock) => Err(ResumeError::LockError(format!(
                "{} is held by another run",
                path.display()
            ))),
            Err(TryLockError::Error(e)) => Err(ResumeError::LockError(format!(
                "Failed to lock {}: {e}",
                path.display()
            ))),
        }
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish()
    }
}
