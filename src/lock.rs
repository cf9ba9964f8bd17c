//! Advisory lock around route mutation
//!
//! The OS route table has no transaction discipline; two concurrent
//! invocations would interleave their batches. A non-blocking exclusive
//! flock on a file in the data directory keeps a second invocation from
//! starting while one is running. Third-party processes mutating routes
//! remain unsynchronized; that is an accepted constraint of a
//! single-operator desktop tool.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use thiserror::Error;

pub const LOCK_FILE: &str = "vpn-bypass.lock";

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to open lock file: {0}")]
    Io(#[from] io::Error),
    #[error("Another vpn-bypass invocation is already running")]
    Busy,
}

/// Holds the exclusive lock for the duration of one operation.
/// Released when dropped.
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Open without truncation so there is no race between creating the
    /// file and locking it.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| LockError::Busy)?;
        Ok(Self { _file: file })
    }
}
