//! Exclusive writer for a store directory.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

use bevy::log::{debug, info};

use super::file_header::checksum;
use super::lock::WriterLock;
use super::records::{BlockRecord, Checkpoint, FlushTiming, Manifest};
use super::{encode_rows, StoreLayout, SCALAR_BYTES};
use crate::action_spec::ActionSpec;
use crate::log_config::LogConfig;
use crate::log_error::{LogError, LogResult};

struct TableWriter {
    name: String,
    file: File,
    width: usize,
    /// Frames written to disk, including a block not yet checkpointed.
    staged_frames: u64,
    /// xxh32 of the staged block.
    block_checksum: u32,
}

/// Owns the tables and metadata of one store for the lifetime of a session.
pub struct StoreWriter {
    layout: StoreLayout,
    manifest: Manifest,
    checkpoint: Checkpoint,
    tables: Vec<TableWriter>,
    lock: WriterLock,
    sync_on_flush: bool,
    /// Append time accumulated for the block being staged.
    pending_micros: u64,
}

impl StoreWriter {
    /// Create the store directory, one empty table per spec, an empty
    /// checkpoint and the manifest.
    pub fn create_tables(
        root: &Path,
        specs: &[ActionSpec],
        config: &LogConfig,
    ) -> LogResult<Self> {
        let layout = StoreLayout::new(root);
        if layout.manifest().exists() {
            return Err(LogError::StorageAlreadyExists(root.to_path_buf()));
        }
        fs::create_dir_all(root)?;
        let lock = WriterLock::acquire(&layout.lock(), root)?;

        let manifest = Manifest::new(specs, config);
        let mut tables = Vec::with_capacity(manifest.tables.len());
        for entry in &manifest.tables {
            let path = layout.table(&entry.file_name);
            let file = match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(LogError::StorageAlreadyExists(root.to_path_buf()));
                }
                Err(e) => return Err(e.into()),
            };
            tables.push(TableWriter {
                name: entry.spec.name.clone(),
                file,
                width: entry.spec.len(),
                staged_frames: 0,
                block_checksum: 0,
            });
        }

        let checkpoint = Checkpoint::default();
        checkpoint.save(&layout.checkpoint())?;
        // The manifest goes last: its presence marks a complete store.
        manifest.save(&layout.manifest())?;

        info!(
            "Action log: created store at {} with {} table(s)",
            root.display(),
            tables.len()
        );

        Ok(Self {
            layout,
            manifest,
            checkpoint,
            tables,
            lock,
            sync_on_flush: config.sync_on_flush,
            pending_micros: 0,
        })
    }

    /// Write `rows` for `name` directly after the last checkpointed frame.
    ///
    /// Anything already on disk past that point (a block from a failed flush)
    /// is overwritten and truncated, so retries never misalign rows. The block
    /// is unreachable until [`finalize`](Self::finalize) publishes it.
    pub fn append_block(&mut self, name: &str, rows: &[f32]) -> LogResult<()> {
        let started = Instant::now();
        let durable = self.checkpoint.total_frames;
        let table = self
            .tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| LogError::UnknownAction(name.to_string()))?;

        if rows.len() % table.width != 0 {
            return Err(LogError::ShapeMismatch {
                name: name.to_string(),
                expected: table.width,
                found: rows.len(),
            });
        }
        let frames = (rows.len() / table.width) as u64;
        let bytes = encode_rows(rows);
        let offset = durable * (table.width * SCALAR_BYTES) as u64;

        table.file.seek(SeekFrom::Start(offset))?;
        table.file.write_all(&bytes)?;
        table.file.set_len(offset + bytes.len() as u64)?;
        if self.sync_on_flush {
            table.file.sync_data()?;
        }

        table.staged_frames = durable + frames;
        table.block_checksum = checksum(&bytes);
        self.pending_micros += started.elapsed().as_micros() as u64;
        Ok(())
    }

    /// Publish `total_frames` as durable.
    ///
    /// Every table must already hold `total_frames` rows. Publishing the
    /// current count again is a no-op.
    pub fn finalize(&mut self, total_frames: u64) -> LogResult<()> {
        let previous = self.checkpoint.total_frames;
        if total_frames == previous {
            return Ok(());
        }
        if total_frames < previous {
            return Err(LogError::CorruptStore(format!(
                "frame counter cannot move back from {previous} to {total_frames}"
            )));
        }
        if let Some(table) = self
            .tables
            .iter()
            .find(|t| t.staged_frames != total_frames)
        {
            return Err(LogError::IncompleteBlock {
                table: table.name.clone(),
                staged: table.staged_frames,
                requested: total_frames,
            });
        }

        let frames = total_frames - previous;
        let mut next = self.checkpoint.clone();
        let block_index = next.blocks.len() as u64;
        next.blocks.push(BlockRecord {
            start_frame: previous,
            frames,
            checksums: self.tables.iter().map(|t| t.block_checksum).collect(),
        });
        if self.manifest.profiling_mode {
            next.flush_timings.push(FlushTiming {
                block_index,
                frames,
                micros: self.pending_micros,
            });
        }
        next.total_frames = total_frames;
        next.save(&self.layout.checkpoint())?;

        debug!(
            "Action log: block {} durable ({} frames, total {}, {} us)",
            block_index, frames, total_frames, self.pending_micros
        );
        self.checkpoint = next;
        self.pending_micros = 0;
        Ok(())
    }

    /// Mark the store cleanly closed and release the writer lock.
    pub fn close(&mut self) -> LogResult<()> {
        if !self.checkpoint.closed {
            let mut next = self.checkpoint.clone();
            next.closed = true;
            next.save(&self.layout.checkpoint())?;
            self.checkpoint = next;
        }
        self.lock.release()
    }

    /// Frames published by the last checkpoint.
    pub fn durable_frames(&self) -> u64 {
        self.checkpoint.total_frames
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Whether the store has been closed and the lock released.
    pub fn is_closed(&self) -> bool {
        self.checkpoint.closed && self.lock.is_released()
    }
}
