//! Shared helpers for integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use crate::log_config::LogConfig;
use crate::session::LogSession;
use crate::store::{tmp_path, StoreLayout};

/// Scratch store directory, removed when dropped.
pub(crate) struct TestLog {
    dir: PathBuf,
}

impl TestLog {
    pub(crate) fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("action_log_it_{name}"));
        let _ = fs::remove_dir_all(&dir);
        Self { dir }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.dir
    }

    /// Session with the given cadence; syncing is skipped to keep tests fast.
    pub(crate) fn session(&self, frames_before_write: usize) -> LogSession {
        let config = LogConfig {
            sync_on_flush: false,
            ..LogConfig::with_frames_before_write(frames_before_write)
        };
        LogSession::new(&self.dir, config).expect("config is valid")
    }

    /// Session with `actions` registered and activated.
    pub(crate) fn active_session(
        &self,
        frames_before_write: usize,
        actions: &[(&str, &[usize])],
    ) -> LogSession {
        let mut session = self.session(frames_before_write);
        for (name, shape) in actions {
            session.register(name, shape).expect("register");
        }
        session.activate().expect("activate");
        session
    }

    /// Make the next checkpoint write fail by putting a directory where its
    /// temp file goes.
    pub(crate) fn block_checkpoint(&self) {
        fs::create_dir_all(tmp_path(&StoreLayout::new(&self.dir).checkpoint()))
            .expect("block checkpoint");
    }

    pub(crate) fn unblock_checkpoint(&self) {
        fs::remove_dir_all(tmp_path(&StoreLayout::new(&self.dir).checkpoint()))
            .expect("unblock checkpoint");
    }
}

impl Drop for TestLog {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Deterministic 9-value hand sample for frame `i`.
pub(crate) fn hand_sample(i: u64) -> Vec<f32> {
    let t = i as f32;
    vec![1.0, t, t * 0.5, -t, 0.0, 0.0, 0.0, 1.0, (i % 10) as f32 / 10.0]
}
