//! Crash recovery for stores left behind by a writer that never closed.
//!
//! A crashed writer can leave a `writer.lock` (which makes readers report
//! `StoreInUse`) and `.tmp` files from an interrupted checkpoint write.
//! [`recover_store`] removes both, then validates the metadata so the caller
//! learns how many frames are replayable.

use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::{info, warn};

use crate::log_error::{LogError, LogResult};
use crate::store::{lock_owner, open_for_read, tmp_path, StoreLayout};

/// Outcome of a recovery scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Whether a stale writer lock was removed.
    pub stale_lock_removed: bool,
    /// Pid recorded in the removed lock, if it could be read.
    pub stale_lock_owner: Option<u32>,
    /// Number of `.tmp` files removed.
    pub tmp_files_cleaned: usize,
    /// Frames readable after recovery.
    pub recoverable_frames: u64,
    /// Whether the previous writer closed the store.
    pub closed_cleanly: bool,
}

/// Returns the `.tmp` siblings of the store's metadata files that exist.
pub(crate) fn find_tmp_files(layout: &StoreLayout) -> Vec<PathBuf> {
    layout
        .metadata_files()
        .iter()
        .map(|path| tmp_path(path))
        .filter(|path| path.exists())
        .collect()
}

/// Removes all files in the list, logging each removal.
///
/// Returns the number of files successfully removed.
pub(crate) fn clean_tmp_files(tmp_files: &[PathBuf]) -> usize {
    let mut cleaned = 0;
    for path in tmp_files {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Action log recovery: removed {}", path.display());
                cleaned += 1;
            }
            Err(e) => {
                warn!(
                    "Action log recovery: failed to remove {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
    cleaned
}

/// Clear crash artifacts from the store at `path` and validate it.
///
/// Only call this when no writer is running for the store: the lock is
/// removed unconditionally.
pub fn recover_store(path: impl AsRef<Path>) -> LogResult<RecoveryReport> {
    let layout = StoreLayout::new(path.as_ref());
    if !layout.manifest().exists() {
        return Err(LogError::StoreNotFound(layout.root().to_path_buf()));
    }

    let mut report = RecoveryReport::default();

    let lock = layout.lock();
    if lock.exists() {
        report.stale_lock_owner = lock_owner(&lock);
        fs::remove_file(&lock)?;
        report.stale_lock_removed = true;
        warn!(
            "Action log recovery: removed stale writer lock of pid {:?} at {}",
            report.stale_lock_owner,
            layout.root().display()
        );
    }

    report.tmp_files_cleaned = clean_tmp_files(&find_tmp_files(&layout));

    let (_, checkpoint) = open_for_read(&layout)?;
    report.recoverable_frames = checkpoint.total_frames;
    report.closed_cleanly = checkpoint.closed;

    info!(
        "Action log recovery: {} has {} recoverable frames",
        layout.root().display(),
        report.recoverable_frames
    );
    Ok(report)
}
