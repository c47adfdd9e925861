//! In-memory staging window for recorded frames.
//!
//! Each action owns a lane: a row-major window of `capacity` rows plus a
//! carry-forward cache holding the value that will be committed on the next
//! `advance_frame`. Writes overwrite the cache (last write wins); actions that
//! are not written during a frame commit the cached value unchanged.

use crate::action_spec::SchemaRegistry;
use crate::log_error::{LogError, LogResult};
use crate::store::SCALAR_BYTES;

struct Lane {
    width: usize,
    window: Vec<f32>,
    /// Value committed on the next frame boundary.
    carry: Vec<f32>,
    written: bool,
}

/// Fixed-capacity buffer of `capacity` frames for every registered action.
pub struct FrameBuffer {
    registry: SchemaRegistry,
    lanes: Vec<Lane>,
    capacity: usize,
    cursor: usize,
}

impl FrameBuffer {
    /// Allocate lanes for every action in `registry`, filling the
    /// carry-forward cache with `initial_fill`.
    ///
    /// Fails with `InvalidConfig` when a window of `capacity` rows cannot be
    /// allocated for some lane.
    pub fn new(registry: SchemaRegistry, capacity: usize, initial_fill: f32) -> LogResult<Self> {
        let mut lanes = Vec::with_capacity(registry.len());
        for spec in registry.specs() {
            let width = spec.len();
            lanes.push(Lane {
                width,
                window: allocate_window(&spec.name, width, capacity)?,
                carry: vec![initial_fill; width],
                written: false,
            });
        }
        Ok(Self {
            registry,
            lanes,
            capacity,
            cursor: 0,
        })
    }

    /// Stage `values` for `name` in the current frame.
    pub fn write(&mut self, name: &str, values: &[f32]) -> LogResult<()> {
        let lane_index = self.registry.position(name)?;
        let lane = &mut self.lanes[lane_index];
        if values.len() != lane.width {
            return Err(LogError::ShapeMismatch {
                name: name.to_string(),
                expected: lane.width,
                found: values.len(),
            });
        }
        lane.carry.copy_from_slice(values);
        lane.written = true;
        Ok(())
    }

    /// Commit the current frame into the window.
    ///
    /// Returns `true` when the window is full and must be flushed before the
    /// next frame can be committed.
    pub fn advance_frame(&mut self) -> bool {
        debug_assert!(!self.is_full(), "advance_frame on a full window");
        let row = self.cursor;
        for lane in &mut self.lanes {
            let start = row * lane.width;
            lane.window[start..start + lane.width].copy_from_slice(&lane.carry);
            lane.written = false;
        }
        self.cursor += 1;
        self.is_full()
    }

    /// Rows committed for the lane at `lane_index`, oldest first.
    pub fn rows(&self, lane_index: usize) -> &[f32] {
        let lane = &self.lanes[lane_index];
        &lane.window[..self.cursor * lane.width]
    }

    /// Discard committed rows after they reached the store.
    pub fn mark_flushed(&mut self) {
        self.cursor = 0;
    }

    /// Frames committed since the last flush.
    pub fn frames(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.cursor >= self.capacity
    }

    /// Value that `name` will commit on the next frame boundary.
    pub fn pending(&self, name: &str) -> LogResult<&[f32]> {
        let lane_index = self.registry.position(name)?;
        Ok(&self.lanes[lane_index].carry)
    }

    /// Actions written since the last frame boundary.
    pub fn written_this_frame(&self) -> usize {
        self.lanes.iter().filter(|lane| lane.written).count()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}

/// Zeroed `width * capacity` window, or `InvalidConfig` if it is too large.
fn allocate_window(name: &str, width: usize, capacity: usize) -> LogResult<Vec<f32>> {
    let too_large = || {
        LogError::InvalidConfig(format!(
            "frames_before_write = {capacity} is too large for action '{name}' ({width} values per frame)"
        ))
    };
    let len = width
        .checked_mul(capacity)
        .filter(|len| {
            len.checked_mul(SCALAR_BYTES)
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(too_large)?;
    let mut window = Vec::new();
    window.try_reserve_exact(len).map_err(|_| too_large())?;
    window.resize(len, 0.0);
    Ok(window)
}
