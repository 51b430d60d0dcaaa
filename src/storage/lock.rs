// src/storage/lock.rs

//! Run lock shared between processes.
//!
//! A run holds an exclusive, non-blocking lock on a file next to the
//! table for as long as it reads, diffs and writes. Two processes pointed
//! at the same table therefore never run at once. The lock is released
//! when [`StoreLock`] is dropped.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;

use crate::error::{AppError, Result};

#[derive(Debug)]
pub struct StoreLock {
    _file: Option<File>,
}

impl StoreLock {
    /// A lock for backends no other process can see.
    pub fn in_process() -> Self {
        Self { _file: None }
    }

    /// Try to take the lock file at `path`.
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| AppError::store_read(format!("{}: {}", path.display(), e)))?;

        match try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { _file: Some(file) })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(AppError::store_read(format!("{}: {}", path.display(), e))),
        }
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Err(io::Error::new(
                ErrorKind::WouldBlock,
                "table is locked by another process",
            ));
        }
        return Err(err);
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    log::warn!("File locking is not supported on this platform; runs are only exclusive in-process");
    Ok(())
}
