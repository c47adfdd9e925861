//! Metadata records persisted next to the tables.
//!
//! The manifest is written once when the tables are created. The checkpoint
//! is rewritten after every durable block append and is the only source of
//! truth for how many rows of each table are reachable.

use std::fs;
use std::path::Path;

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::atomic_write::atomic_write;
use super::file_header::{unwrap_header, wrap_with_header, RecordKind};
use crate::action_spec::ActionSpec;
use crate::log_config::LogConfig;
use crate::log_error::{LogError, LogResult};

/// Store layout version (bump on breaking changes to records or tables).
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// One action table in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TableEntry {
    pub spec: ActionSpec,
    /// File name of the table relative to the store directory.
    pub file_name: String,
}

/// Schema and settings of a store, written once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Manifest {
    pub format_version: u32,
    /// Tables in registration order.
    pub tables: Vec<TableEntry>,
    pub frames_before_write: u64,
    pub profiling_mode: bool,
    pub initial_fill: f32,
    /// Unix seconds at creation.
    pub created_at: u64,
}

impl Manifest {
    pub fn new(specs: &[ActionSpec], config: &LogConfig) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            tables: specs
                .iter()
                .enumerate()
                .map(|(i, spec)| TableEntry {
                    spec: spec.clone(),
                    file_name: table_file_name(i),
                })
                .collect(),
            frames_before_write: config.frames_before_write as u64,
            profiling_mode: config.profiling_mode,
            initial_fill: config.initial_fill,
            created_at,
        }
    }

    pub fn specs(&self) -> Vec<ActionSpec> {
        self.tables.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn save(&self, path: &Path) -> LogResult<()> {
        write_record(path, RecordKind::Manifest, &bitcode::encode(self))
    }

    pub fn load(path: &Path) -> LogResult<Self> {
        let manifest: Self = read_record(path, RecordKind::Manifest)?;
        if manifest.format_version > CURRENT_FORMAT_VERSION {
            return Err(LogError::CorruptStore(format!(
                "store format v{} is newer than supported v{}",
                manifest.format_version, CURRENT_FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }
}

/// One durable block append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct BlockRecord {
    pub start_frame: u64,
    pub frames: u64,
    /// xxh32 of the block's bytes, one per table in manifest order.
    pub checksums: Vec<u32>,
}

/// Wall-clock cost of one flush, recorded in profiling mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct FlushTiming {
    pub block_index: u64,
    pub frames: u64,
    pub micros: u64,
}

/// Durable progress marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Checkpoint {
    pub total_frames: u64,
    /// Set by a clean close.
    pub closed: bool,
    pub blocks: Vec<BlockRecord>,
    pub flush_timings: Vec<FlushTiming>,
}

impl Checkpoint {
    pub fn save(&self, path: &Path) -> LogResult<()> {
        write_record(path, RecordKind::Checkpoint, &bitcode::encode(self))
    }

    pub fn load(path: &Path) -> LogResult<Self> {
        let checkpoint: Self = read_record(path, RecordKind::Checkpoint)?;
        let mut covered = 0u64;
        for block in &checkpoint.blocks {
            if block.start_frame != covered {
                return Err(LogError::CorruptStore(format!(
                    "checkpoint block starts at frame {} but {covered} frames precede it",
                    block.start_frame
                )));
            }
            covered += block.frames;
        }
        if covered != checkpoint.total_frames {
            return Err(LogError::CorruptStore(format!(
                "checkpoint blocks cover {covered} frames but total_frames is {}",
                checkpoint.total_frames
            )));
        }
        Ok(checkpoint)
    }
}

/// Table file name for the action at registration index `index`.
pub fn table_file_name(index: usize) -> String {
    format!("table_{index:03}.tbl")
}

fn write_record(path: &Path, kind: RecordKind, payload: &[u8]) -> LogResult<()> {
    atomic_write(path, &wrap_with_header(kind, payload))?;
    Ok(())
}

fn read_record<T: bitcode::DecodeOwned>(path: &Path, kind: RecordKind) -> LogResult<T> {
    let bytes = fs::read(path)?;
    let (_, payload) = unwrap_header(&bytes, kind)
        .map_err(|msg| LogError::CorruptStore(format!("{}: {msg}", path.display())))?;
    Ok(bitcode::decode(payload)?)
}
