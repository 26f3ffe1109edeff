//! Cross-process cycle lock.
//!
//! A non-blocking exclusive `flock` on a lockfile. The lock is released when
//! the guard drops (or the process exits).

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::CycleError;

/// Held for the duration of one cycle.
#[derive(Debug)]
pub struct CycleLock {
    file: File,
    path: PathBuf,
}

impl CycleLock {
    /// Take the lock, failing immediately if another process holds it.
    pub fn acquire(path: &Path) -> Result<Self, CycleError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| CycleError::Lockfile {
                path: path.to_path_buf(),
                source,
            })?;

        // SAFETY: the descriptor is owned by `file`, which outlives the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return Err(if err.kind() == io::ErrorKind::WouldBlock {
                CycleError::Locked(path.to_path_buf())
            } else {
                CycleError::Lockfile {
                    path: path.to_path_buf(),
                    source: err,
                }
            });
        }

        tracing::debug!(path = %path.display(), "Acquired cycle lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        // SAFETY: as in `acquire`.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        tracing::trace!(path = %self.path.display(), "Released cycle lock");
    }
}
