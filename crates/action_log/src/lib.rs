//! Frame-synchronized action recording and deterministic replay.
//!
//! Record: register actions on a [`LogSession`], `activate()`, then each
//! simulation step `save_action(..)` followed by `process_frame()`, and
//! finally `close()`. Replay: [`ReplayReader::open`] and `get_frame(i)`.

pub mod action_spec;
pub mod frame_buffer;
pub mod log_config;
pub mod log_error;
pub mod plugin;
pub mod reader;
pub mod recovery;
pub mod session;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use action_spec::{ActionSpec, SchemaRegistry};
pub use log_config::LogConfig;
pub use log_error::{ErrorKind, LogError, LogResult};
pub use plugin::{ActionLogPlugin, ActionPlayer, ActionRecorder};
pub use reader::{Frame, ReplayCursor, ReplayReader, StoreSummary};
pub use recovery::{recover_store, RecoveryReport};
pub use session::{FlushReport, LogSession, RecordingSummary, SessionState};
