//! Persistent store: one append-only table per action plus metadata records.
//!
//! Layout of a store directory:
//!
//! ```text
//! <root>/manifest.alog     schema and settings (written once)
//! <root>/checkpoint.alog   durable frame count and block checksums
//! <root>/table_NNN.tbl     little-endian f32 rows, one file per action
//! <root>/writer.lock       present while a writer owns the store
//! ```
//!
//! Rows are appended and synced before the checkpoint is rewritten, so the
//! checkpoint never points past data that reached the disk. Rows beyond the
//! checkpointed frame count are unreachable.

mod atomic_write;
pub mod file_header;
mod lock;
pub mod records;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::warn;

pub use atomic_write::{atomic_write, tmp_path, TMP_SUFFIX};
pub use lock::lock_owner;
pub use records::{BlockRecord, Checkpoint, FlushTiming, Manifest, TableEntry};
pub use writer::StoreWriter;

use crate::log_error::{LogError, LogResult};

/// Bytes per stored scalar.
pub const SCALAR_BYTES: usize = std::mem::size_of::<f32>();

/// Paths of the files making up one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("manifest.alog")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("checkpoint.alog")
    }

    pub fn lock(&self) -> PathBuf {
        self.root.join("writer.lock")
    }

    pub fn table(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Metadata files that may have an in-flight `.tmp` sibling.
    pub fn metadata_files(&self) -> [PathBuf; 2] {
        [self.manifest(), self.checkpoint()]
    }
}

/// Load and validate the metadata of a store that no writer holds.
pub fn open_for_read(layout: &StoreLayout) -> LogResult<(Manifest, Checkpoint)> {
    if !layout.manifest().exists() {
        return Err(LogError::StoreNotFound(layout.root().to_path_buf()));
    }
    if layout.lock().exists() {
        return Err(LogError::StoreInUse(layout.root().to_path_buf()));
    }

    let manifest = Manifest::load(&layout.manifest())?;
    let checkpoint_path = layout.checkpoint();
    if !checkpoint_path.exists() {
        return Err(LogError::CorruptStore(format!(
            "{} is missing",
            checkpoint_path.display()
        )));
    }
    let checkpoint = Checkpoint::load(&checkpoint_path)?;

    if let Some(block) = checkpoint
        .blocks
        .iter()
        .find(|b| b.checksums.len() != manifest.tables.len())
    {
        return Err(LogError::CorruptStore(format!(
            "block at frame {} has {} checksums for {} tables",
            block.start_frame,
            block.checksums.len(),
            manifest.tables.len()
        )));
    }

    Ok((manifest, checkpoint))
}

/// Read the reachable rows of table `table_index`, verifying block checksums.
pub fn read_table(
    layout: &StoreLayout,
    manifest: &Manifest,
    checkpoint: &Checkpoint,
    table_index: usize,
) -> LogResult<Vec<f32>> {
    let entry = &manifest.tables[table_index];
    let row_bytes = entry.spec.len() * SCALAR_BYTES;
    let reachable = checkpoint.total_frames as usize * row_bytes;
    let path = layout.table(&entry.file_name);

    let bytes = fs::read(&path).map_err(|e| {
        LogError::CorruptStore(format!("cannot read table {}: {e}", path.display()))
    })?;
    if bytes.len() < reachable {
        return Err(LogError::CorruptStore(format!(
            "table '{}' holds {} bytes, checkpoint needs {}",
            entry.spec.name,
            bytes.len(),
            reachable
        )));
    }
    if bytes.len() > reachable {
        warn!(
            "Action log: table '{}' has {} unreachable trailing bytes (unflushed block)",
            entry.spec.name,
            bytes.len() - reachable
        );
    }

    for block in &checkpoint.blocks {
        let start = block.start_frame as usize * row_bytes;
        let end = start + block.frames as usize * row_bytes;
        let computed = file_header::checksum(&bytes[start..end]);
        if computed != block.checksums[table_index] {
            return Err(LogError::CorruptStore(format!(
                "table '{}' block at frame {} fails its checksum",
                entry.spec.name, block.start_frame
            )));
        }
    }

    Ok(decode_rows(&bytes[..reachable]))
}

/// Little-endian encoding of a run of rows.
pub fn encode_rows(rows: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * SCALAR_BYTES);
    for value in rows {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_rows(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(SCALAR_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
