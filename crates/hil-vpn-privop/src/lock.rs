//! Host-wide single instance lock
//!
//! Every helper invocation holds an exclusive `flock` on a well-known file
//! for its whole run, so check-then-act sequences such as "delete only if
//! stopped" cannot interleave with another invocation.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Lock file used by the installed helper
pub const LOCK_PATH: &str = "/run/lock/hil-vpn-privop.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("opening lock file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("locking {}: {errno}", .path.display())]
    Lock { path: PathBuf, errno: Errno },
}

/// Held for as long as the invocation runs; dropping it (or exiting)
/// releases the lock.
pub struct InstanceLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl InstanceLock {
    /// Block until the exclusive lock on `path` is ours
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            LockError::Lock {
                path: path.clone(),
                errno,
            }
        })?;

        debug!(path = %path.display(), "Acquired instance lock");
        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_lock(path: &Path) -> Result<Flock<File>, Errno> {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| errno)
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("privop.lock");

        let held = InstanceLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path);
        match try_lock(&path) {
            Err(errno) => assert_eq!(errno, Errno::EWOULDBLOCK),
            Ok(_) => panic!("second lock should not be granted"),
        }

        drop(held);
        assert!(try_lock(&path).is_ok());
    }

    #[test]
    fn test_lock_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("privop.lock");

        drop(InstanceLock::acquire(&path).unwrap());
        drop(InstanceLock::acquire(&path).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("privop.lock");

        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(LockError::Open { .. })
        ));
    }
}
