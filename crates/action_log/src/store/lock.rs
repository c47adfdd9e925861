//! Single-writer lock file.
//!
//! The lock is created with `create_new` when tables are created and removed
//! when the writer closes or is dropped. Readers refuse a store whose lock
//! is present. A crashed process leaves the lock behind; `recovery` clears it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bevy::log::warn;

use crate::log_error::{LogError, LogResult};

pub struct WriterLock {
    path: PathBuf,
    released: bool,
}

impl WriterLock {
    /// Take the lock at `path`, failing with `StoreInUse` if it is held.
    pub fn acquire(path: &Path, store_root: &Path) -> LogResult<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LogError::StoreInUse(store_root.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(std::process::id().to_string().as_bytes())?;
        Ok(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    pub fn release(&mut self) -> LogResult<()> {
        if self.released {
            return Ok(());
        }
        fs::remove_file(&self.path)?;
        self.released = true;
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "Action log: failed to release writer lock {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Pid recorded in a lock file, if readable.
pub fn lock_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
