//! Single-instance guard for a state database
//!
//! Recovery returns every `uploading` row to `staged`, which is only sound
//! when no other process is driving transfers against the same database.
//! Holders of an [`InstanceLock`] own the database exclusively until the
//! lock is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::UploadError;

/// Exclusive advisory lock on `<database>.lock`
///
/// Released when dropped or when the process exits.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// Lock file guarding `database_path`
    pub fn path_for(database_path: &Path) -> PathBuf {
        let mut name = database_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Takes the lock without waiting
    ///
    /// Fails with [`UploadError::AlreadyRunning`] when another holder,
    /// in this process or another, has it.
    pub fn acquire(database_path: &Path) -> Result<Self, UploadError> {
        let path = Self::path_for(database_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        try_lock_exclusive(&file, &path)?;
        debug!(path = %path.display(), "Acquired instance lock");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File, path: &Path) -> Result<(), UploadError> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open for the call
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }
    let error = std::io::Error::last_os_error();
    if error.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(UploadError::AlreadyRunning(path.to_path_buf()))
    } else {
        Err(UploadError::IoError(error))
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File, _path: &Path) -> Result<(), UploadError> {
    Err(UploadError::IoError(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "instance locking needs flock",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");

        let first = InstanceLock::acquire(&db).unwrap();
        assert_eq!(first.path(), dir.path().join("state.db.lock"));
        assert!(matches!(
            InstanceLock::acquire(&db),
            Err(UploadError::AlreadyRunning(_))
        ));

        drop(first);
        assert!(InstanceLock::acquire(&db).is_ok());
    }

    #[test]
    fn test_separate_databases_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = InstanceLock::acquire(&dir.path().join("a.db")).unwrap();
        assert!(InstanceLock::acquire(&dir.path().join("b.db")).is_ok());
    }

    #[test]
    fn test_missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/state/state.db");
        let lock = InstanceLock::acquire(&db).unwrap();
        assert!(lock.path().exists());
    }
}
