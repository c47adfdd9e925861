//! Replay reader: read-only access to a closed (or abandoned) store.
//!
//! Opening loads the metadata, checks the schema, then loads every table's
//! reachable rows into memory. After that the reader is immutable, so any
//! number of [`ReplayCursor`]s can walk it independently and `get_frame` is a
//! slice lookup.

use std::path::{Path, PathBuf};

use bevy::log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::action_spec::{ActionSpec, SchemaRegistry};
use crate::log_error::{LogError, LogResult};
use crate::store::{self, Checkpoint, FlushTiming, Manifest, StoreLayout};

/// All action values recorded for one frame, in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<'a> {
    pub index: u64,
    values: Vec<(&'a str, &'a [f32])>,
}

impl<'a> Frame<'a> {
    /// Value of `name` at this frame.
    pub fn get(&self, name: &str) -> Option<&'a [f32]> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// `(name, values)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a [f32])> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy keyed by action name.
    pub fn to_owned_values(&self) -> Vec<(String, Vec<f32>)> {
        self.values
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_vec()))
            .collect()
    }
}

/// Serializable overview of a store, for debugging output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub path: PathBuf,
    pub format_version: u32,
    pub specs: Vec<ActionSpec>,
    pub frame_count: u64,
    pub blocks: u64,
    pub frames_before_write: u64,
    pub closed_cleanly: bool,
    pub created_at: u64,
    pub flush_timings: Vec<FlushTiming>,
}

impl StoreSummary {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// An opened store.
pub struct ReplayReader {
    layout: StoreLayout,
    registry: SchemaRegistry,
    manifest: Manifest,
    checkpoint: Checkpoint,
    /// Reachable rows per table, row-major.
    tables: Vec<Vec<f32>>,
}

impl ReplayReader {
    /// Open `path`, failing with `SchemaMismatch` unless `expected` names
    /// exactly the recorded actions with the recorded shapes (in any order).
    /// No table is read before the schema is accepted.
    ///
    /// A store whose writer lock is still present fails with `StoreInUse`.
    /// That includes a writer that crashed without releasing it: run
    /// [`recover_store`](crate::recovery::recover_store) once no writer is
    /// left, then open again.
    pub fn open(path: impl AsRef<Path>, expected: &[ActionSpec]) -> LogResult<Self> {
        Self::open_with(path.as_ref(), Some(expected))
    }

    /// Open `path` and take the schema from the store.
    pub fn open_unchecked(path: impl AsRef<Path>) -> LogResult<Self> {
        Self::open_with(path.as_ref(), None)
    }

    fn open_with(path: &Path, expected: Option<&[ActionSpec]>) -> LogResult<Self> {
        let layout = StoreLayout::new(path);
        let (manifest, checkpoint) = store::open_for_read(&layout)?;
        let registry = SchemaRegistry::from_specs(&manifest.specs())
            .map_err(|e| LogError::CorruptStore(format!("manifest schema is invalid: {e}")))?;

        if let Some(expected) = expected {
            if let Some(diff) = registry.diff(expected) {
                return Err(LogError::SchemaMismatch(diff));
            }
        }

        let tables = (0..manifest.tables.len())
            .map(|i| store::read_table(&layout, &manifest, &checkpoint, i))
            .collect::<LogResult<Vec<_>>>()?;

        if !checkpoint.closed {
            warn!(
                "Action log: {} was not closed cleanly; replaying {} durable frames",
                path.display(),
                checkpoint.total_frames
            );
        }
        info!(
            "Action log: opened {} ({} actions, {} frames)",
            path.display(),
            registry.len(),
            checkpoint.total_frames
        );

        Ok(Self {
            layout,
            registry,
            manifest,
            checkpoint,
            tables,
        })
    }

    /// Total recorded frames.
    pub fn frame_count(&self) -> u64 {
        self.checkpoint.total_frames
    }

    /// Recorded specs in registration order.
    pub fn specs(&self) -> &[ActionSpec] {
        self.registry.specs()
    }

    /// Every action's value at `index`.
    pub fn get_frame(&self, index: u64) -> LogResult<Frame<'_>> {
        self.check_index(index)?;
        let values = self
            .registry
            .specs()
            .iter()
            .zip(&self.tables)
            .map(|(spec, rows)| (spec.name.as_str(), row(rows, spec.len(), index)))
            .collect();
        Ok(Frame { index, values })
    }

    /// One action's value at `index`.
    pub fn read_action(&self, name: &str, index: u64) -> LogResult<&[f32]> {
        let lane = self.registry.position(name)?;
        self.check_index(index)?;
        let width = self.registry.specs()[lane].len();
        Ok(row(&self.tables[lane], width, index))
    }

    /// Independent sequential cursor starting at frame 0.
    pub fn cursor(&self) -> ReplayCursor<'_> {
        ReplayCursor {
            reader: self,
            position: 0,
        }
    }

    /// Whether the writer closed the store (as opposed to abandoning it).
    pub fn closed_cleanly(&self) -> bool {
        self.checkpoint.closed
    }

    /// Flush timings recorded in profiling mode.
    pub fn flush_timings(&self) -> &[FlushTiming] {
        &self.checkpoint.flush_timings
    }

    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            path: self.layout.root().to_path_buf(),
            format_version: self.manifest.format_version,
            specs: self.registry.specs().to_vec(),
            frame_count: self.checkpoint.total_frames,
            blocks: self.checkpoint.blocks.len() as u64,
            frames_before_write: self.manifest.frames_before_write,
            closed_cleanly: self.checkpoint.closed,
            created_at: self.manifest.created_at,
            flush_timings: self.checkpoint.flush_timings.clone(),
        }
    }

    fn check_index(&self, index: u64) -> LogResult<()> {
        if index >= self.frame_count() {
            return Err(LogError::OutOfRange {
                index,
                frame_count: self.frame_count(),
            });
        }
        Ok(())
    }
}

fn row(rows: &[f32], width: usize, index: u64) -> &[f32] {
    let start = index as usize * width;
    &rows[start..start + width]
}

/// Sequential playback position over a [`ReplayReader`].
#[derive(Clone)]
pub struct ReplayCursor<'a> {
    reader: &'a ReplayReader,
    position: u64,
}

impl<'a> ReplayCursor<'a> {
    /// Frame at the current position, advancing past it.
    pub fn next_frame(&mut self) -> Option<Frame<'a>> {
        let frame = self.reader.get_frame(self.position).ok()?;
        self.position += 1;
        Some(frame)
    }

    /// Move to `index`. Seeking to `frame_count()` positions at the end.
    pub fn seek(&mut self, index: u64) -> LogResult<()> {
        let frame_count = self.reader.frame_count();
        if index > frame_count {
            return Err(LogError::OutOfRange { index, frame_count });
        }
        self.position = index;
        Ok(())
    }

    /// Index of the next frame to be returned.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frames left before the end of the log.
    pub fn frames_remaining(&self) -> u64 {
        self.reader.frame_count().saturating_sub(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.frames_remaining() == 0
    }
}

impl<'a> Iterator for ReplayCursor<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.frames_remaining() as usize;
        (remaining, Some(remaining))
    }
}
