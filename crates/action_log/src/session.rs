//! Recording session: lifecycle state machine driving buffer-to-store flushes.
//!
//! ```text
//! Configuring --activate--> Active --process_frame--> Recording --close--> Closed
//!      |                       |                                           ^
//!      +-----------------------+-------------------close-------------------+
//! ```
//!
//! Flushes are synchronous: the `process_frame` call that fills the window
//! blocks until the block is on disk and the checkpoint is rewritten. If a
//! session is dropped without `close()`, at most the unflushed window is lost.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bevy::log::{debug, info, warn};

use crate::action_spec::{ActionSpec, SchemaRegistry};
use crate::frame_buffer::FrameBuffer;
use crate::log_config::LogConfig;
use crate::log_error::{LogError, LogResult};
use crate::store::StoreWriter;

/// Lifecycle state of a [`LogSession`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Actions may be registered; nothing is on disk yet.
    #[default]
    Configuring,
    /// Tables exist; no frame has been processed.
    Active,
    /// At least one frame has been processed.
    Recording,
    /// Terminal. All buffered frames have been flushed.
    Closed,
}

/// Description of a flush performed by `process_frame` or `close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub block_index: u64,
    pub frames: u64,
    pub total_frames: u64,
    pub duration: Duration,
}

/// Final numbers of a closed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub total_frames: u64,
    pub blocks: u64,
    /// Sum of recorded flush timings (profiling mode only, else 0).
    pub flush_micros: u64,
}

/// One recording into one store directory.
pub struct LogSession {
    path: PathBuf,
    config: LogConfig,
    registry: SchemaRegistry,
    state: SessionState,
    buffer: Option<FrameBuffer>,
    store: Option<StoreWriter>,
    frames_recorded: u64,
}

impl LogSession {
    /// New session in `Configuring`. Nothing touches the disk until
    /// [`activate`](Self::activate).
    pub fn new(path: impl Into<PathBuf>, config: LogConfig) -> LogResult<Self> {
        config.validate()?;
        Ok(Self {
            path: path.into(),
            config,
            registry: SchemaRegistry::new(),
            state: SessionState::Configuring,
            buffer: None,
            store: None,
            frames_recorded: 0,
        })
    }

    /// Register an action stream. Only valid while configuring.
    pub fn register(&mut self, name: &str, shape: &[usize]) -> LogResult<()> {
        match self.state {
            SessionState::Configuring => self.registry.register(name, shape),
            SessionState::Closed => Err(LogError::SessionClosed),
            state => Err(LogError::SessionState {
                operation: "register",
                state,
            }),
        }
    }

    /// Shape of a registered action.
    pub fn resolve(&self, name: &str) -> LogResult<&[usize]> {
        self.registry.resolve(name)
    }

    /// Create the store and start accepting frames.
    pub fn activate(&mut self) -> LogResult<()> {
        match self.state {
            SessionState::Configuring => {}
            SessionState::Closed => return Err(LogError::SessionClosed),
            state => {
                return Err(LogError::SessionState {
                    operation: "activate",
                    state,
                })
            }
        }
        if self.registry.is_empty() {
            return Err(LogError::EmptySchema);
        }

        // The window is allocated first so an oversized cadence leaves no files.
        let buffer = FrameBuffer::new(
            self.registry.clone(),
            self.config.frames_before_write,
            self.config.initial_fill,
        )?;
        let store = StoreWriter::create_tables(&self.path, self.registry.specs(), &self.config)?;
        self.buffer = Some(buffer);
        self.store = Some(store);
        self.state = SessionState::Active;

        info!(
            "Action log: recording {} action(s) to {} (flush every {} frames)",
            self.registry.len(),
            self.path.display(),
            self.config.frames_before_write
        );
        Ok(())
    }

    /// Stage `values` for `name` in the current frame. Last write wins.
    pub fn save_action(&mut self, name: &str, values: &[f32]) -> LogResult<()> {
        let state = self.ensure_recording("save an action")?;
        match self.buffer.as_mut() {
            Some(buffer) => buffer.write(name, values),
            None => Err(LogError::SessionState {
                operation: "save an action",
                state,
            }),
        }
    }

    /// Mark a frame boundary.
    ///
    /// Commits the current frame (carrying forward unwritten actions) and,
    /// when the window fills, appends it to the store and checkpoints.
    /// Returns the flush performed during this call, if any. When a window
    /// left by a failed flush is retried and the new frame fills the window
    /// again in the same call, the later flush is reported.
    pub fn process_frame(&mut self) -> LogResult<Option<FlushReport>> {
        let state = self.ensure_recording("process a frame")?;

        // A window left full by a failed flush must reach the disk before
        // the next frame can be committed.
        let retried = if self.buffer.as_ref().is_some_and(FrameBuffer::is_full) {
            self.flush()?
        } else {
            None
        };

        let full = match self.buffer.as_mut() {
            Some(buffer) => buffer.advance_frame(),
            None => {
                return Err(LogError::SessionState {
                    operation: "process a frame",
                    state,
                })
            }
        };
        self.frames_recorded += 1;
        if self.state == SessionState::Active {
            self.state = SessionState::Recording;
        }

        if full {
            self.flush()
        } else {
            Ok(retried)
        }
    }

    /// Flush any partial window, mark the store closed and release it.
    ///
    /// Calling `close` again returns the same summary without touching the
    /// disk. On a storage error the session stays open and `close` may be
    /// retried.
    pub fn close(&mut self) -> LogResult<RecordingSummary> {
        match self.state {
            SessionState::Closed => return Ok(self.summary()),
            SessionState::Configuring => {
                self.state = SessionState::Closed;
                info!(
                    "Action log: session for {} closed before activation",
                    self.path.display()
                );
                return Ok(self.summary());
            }
            SessionState::Active | SessionState::Recording => {}
        }

        if let Some(report) = self.flush()? {
            debug!(
                "Action log: final block of {} frames flushed on close",
                report.frames
            );
        }
        if let Some(store) = self.store.as_mut() {
            store.close()?;
        }
        self.state = SessionState::Closed;
        self.buffer = None;

        let summary = self.summary();
        info!(
            "Action log: closed {} with {} frames in {} block(s)",
            summary.path.display(),
            summary.total_frames,
            summary.blocks
        );
        Ok(summary)
    }

    fn flush(&mut self) -> LogResult<Option<FlushReport>> {
        let (Some(buffer), Some(store)) = (self.buffer.as_mut(), self.store.as_mut()) else {
            return Ok(None);
        };
        let frames = buffer.frames() as u64;
        if frames == 0 {
            return Ok(None);
        }

        let started = Instant::now();
        for (lane, spec) in buffer.registry().specs().iter().enumerate() {
            store.append_block(&spec.name, buffer.rows(lane))?;
        }
        let total_frames = store.durable_frames() + frames;
        store.finalize(total_frames)?;
        buffer.mark_flushed();

        let report = FlushReport {
            block_index: store.checkpoint().blocks.len() as u64 - 1,
            frames,
            total_frames,
            duration: started.elapsed(),
        };
        if self.config.profiling_mode {
            info!(
                "Action log: flushed block {} ({} frames) in {:?}",
                report.block_index, report.frames, report.duration
            );
        } else {
            debug!(
                "Action log: flushed block {} ({} frames)",
                report.block_index, report.frames
            );
        }
        Ok(Some(report))
    }

    /// Current state if frames may be written, else the matching error.
    fn ensure_recording(&self, operation: &'static str) -> LogResult<SessionState> {
        match self.state {
            state @ (SessionState::Active | SessionState::Recording) => Ok(state),
            SessionState::Closed => Err(LogError::SessionClosed),
            state => Err(LogError::SessionState { operation, state }),
        }
    }

    fn summary(&self) -> RecordingSummary {
        let (total_frames, blocks, flush_micros) = match &self.store {
            Some(store) => {
                let checkpoint = store.checkpoint();
                (
                    checkpoint.total_frames,
                    checkpoint.blocks.len() as u64,
                    checkpoint.flush_timings.iter().map(|t| t.micros).sum(),
                )
            }
            None => (0, 0, 0),
        };
        RecordingSummary {
            path: self.path.clone(),
            total_frames,
            blocks,
            flush_micros,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn specs(&self) -> &[ActionSpec] {
        self.registry.specs()
    }

    /// Frames committed by `process_frame`, flushed or not.
    pub fn frames_recorded(&self) -> u64 {
        self.frames_recorded
    }

    /// Frames guaranteed to be readable after a crash.
    pub fn durable_frames(&self) -> u64 {
        self.store.as_ref().map_or(0, StoreWriter::durable_frames)
    }

    /// Frames waiting in the window.
    pub fn buffered_frames(&self) -> usize {
        self.buffer.as_ref().map_or(0, FrameBuffer::frames)
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Active | SessionState::Recording) {
            warn!(
                "Action log: session for {} dropped without close(); {} buffered frame(s) discarded, {} durable",
                self.path.display(),
                self.buffered_frames(),
                self.durable_frames()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("action_log_session_test_{name}"));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn config(frames_before_write: usize) -> LogConfig {
        LogConfig {
            sync_on_flush: false,
            ..LogConfig::with_frames_before_write(frames_before_write)
        }
    }

    #[test]
    fn lifecycle_moves_forward() {
        let dir = test_dir("lifecycle");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        assert_eq!(session.state(), SessionState::Configuring);

        session.register("hand", &[3]).unwrap();
        session.activate().unwrap();
        assert_eq!(session.state(), SessionState::Active);

        session.process_frame().unwrap();
        assert_eq!(session.state(), SessionState::Recording);

        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn register_after_activate_is_state_error() {
        let dir = test_dir("register_late");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        session.register("hand", &[3]).unwrap();
        session.activate().unwrap();

        let err = session.register("late", &[1]).unwrap_err();
        assert!(matches!(
            err,
            LogError::SessionState {
                operation: "register",
                state: SessionState::Active
            }
        ));
        assert!(matches!(
            session.activate(),
            Err(LogError::SessionState { .. })
        ));

        session.close().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn activate_without_actions_is_empty_schema() {
        let dir = test_dir("empty");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        assert!(matches!(session.activate(), Err(LogError::EmptySchema)));
        assert!(!dir.join("manifest.alog").exists());
    }

    #[test]
    fn writes_before_activate_are_state_errors() {
        let dir = test_dir("early_write");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        session.register("hand", &[3]).unwrap();
        assert!(matches!(
            session.save_action("hand", &[1.0, 2.0, 3.0]),
            Err(LogError::SessionState { .. })
        ));
        assert!(matches!(
            session.process_frame(),
            Err(LogError::SessionState { .. })
        ));
    }

    #[test]
    fn closed_session_rejects_everything() {
        let dir = test_dir("closed");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        session.register("hand", &[3]).unwrap();
        session.activate().unwrap();
        session.close().unwrap();

        assert!(matches!(
            session.save_action("hand", &[1.0, 2.0, 3.0]),
            Err(LogError::SessionClosed)
        ));
        assert!(matches!(session.process_frame(), Err(LogError::SessionClosed)));
        assert!(matches!(
            session.register("x", &[1]),
            Err(LogError::SessionClosed)
        ));
        assert!(matches!(session.activate(), Err(LogError::SessionClosed)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn process_frame_reports_flush_at_threshold() {
        let dir = test_dir("threshold");
        let mut session = LogSession::new(&dir, config(3)).unwrap();
        session.register("hand", &[3]).unwrap();
        session.activate().unwrap();

        assert_eq!(session.process_frame().unwrap(), None);
        assert_eq!(session.process_frame().unwrap(), None);
        let report = session.process_frame().unwrap().expect("third frame flushes");
        assert_eq!(report.block_index, 0);
        assert_eq!(report.frames, 3);
        assert_eq!(report.total_frames, 3);
        assert_eq!(session.durable_frames(), 3);
        assert_eq!(session.buffered_frames(), 0);

        session.close().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn close_before_activate_creates_nothing() {
        let dir = test_dir("close_unactivated");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        let summary = session.close().unwrap();
        assert_eq!(summary.total_frames, 0);
        assert!(session.is_closed());
        assert!(!dir.exists());
    }

    #[test]
    fn oversized_cadence_fails_activate_without_files() {
        let dir = test_dir("oversized_cadence");
        let mut session = LogSession::new(&dir, config(usize::MAX / 2)).unwrap();
        session.register("hand", &[9]).unwrap();
        assert!(matches!(session.activate(), Err(LogError::InvalidConfig(_))));
        assert_eq!(session.state(), SessionState::Configuring);
        assert!(!dir.exists());
    }

    #[test]
    fn oversized_shape_rejected_at_register() {
        let dir = test_dir("oversized_shape");
        let mut session = LogSession::new(&dir, config(4)).unwrap();
        assert!(matches!(
            session.register("huge", &[usize::MAX, 2]),
            Err(LogError::InvalidShape { .. })
        ));
        assert!(matches!(session.activate(), Err(LogError::EmptySchema)));
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(matches!(
            LogSession::new("/tmp/unused", LogConfig::with_frames_before_write(0)),
            Err(LogError::InvalidConfig(_))
        ));
    }
}
