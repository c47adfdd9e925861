// ---------------------------------------------------------------------------
// LogError: typed failures for recording and replay
// ---------------------------------------------------------------------------

use std::fmt;
use std::path::PathBuf;

use crate::session::SessionState;

/// Broad category of a [`LogError`].
///
/// Schema and range errors are integration bugs and never worth retrying.
/// Storage errors leave the store at its last durable checkpoint, so the
/// caller may retry `close()` or reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Lifecycle,
    Storage,
    Range,
    Config,
}

/// Errors that can occur while recording or replaying an action log.
#[derive(Debug)]
pub enum LogError {
    /// An action with this name is already registered.
    DuplicateAction(String),
    /// Shape is empty or has a zero dimension.
    InvalidShape { name: String, shape: Vec<usize> },
    /// No action with this name is registered.
    UnknownAction(String),
    /// Vector length does not match the registered shape.
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// `activate()` was called with no registered actions.
    EmptySchema,
    /// Expected specs differ from the specs recorded in the store.
    SchemaMismatch(String),
    /// Operation is not valid in the session's current state.
    SessionState {
        operation: &'static str,
        state: SessionState,
    },
    /// Session has been closed; no further writes are accepted.
    SessionClosed,
    /// A store already exists at the target path.
    StorageAlreadyExists(PathBuf),
    /// No store at the given path.
    StoreNotFound(PathBuf),
    /// Store files are unreadable, truncated or fail their checksums.
    CorruptStore(String),
    /// Store is still owned by a writer.
    StoreInUse(PathBuf),
    /// `finalize` was asked to publish frames that not every table holds.
    IncompleteBlock {
        table: String,
        staged: u64,
        requested: u64,
    },
    /// Replay index past the last recorded frame.
    OutOfRange { index: u64, frame_count: u64 },
    /// Configuration value rejected by `LogConfig::validate`.
    InvalidConfig(String),
    /// I/O error (permission denied, disk full, etc.)
    Io(std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type LogResult<T> = Result<T, LogError>;

impl LogError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::DuplicateAction(_)
            | LogError::InvalidShape { .. }
            | LogError::UnknownAction(_)
            | LogError::ShapeMismatch { .. }
            | LogError::EmptySchema
            | LogError::SchemaMismatch(_) => ErrorKind::Schema,
            LogError::SessionState { .. } | LogError::SessionClosed => ErrorKind::Lifecycle,
            LogError::StorageAlreadyExists(_)
            | LogError::StoreNotFound(_)
            | LogError::CorruptStore(_)
            | LogError::StoreInUse(_)
            | LogError::IncompleteBlock { .. }
            | LogError::Io(_) => ErrorKind::Storage,
            LogError::OutOfRange { .. } => ErrorKind::Range,
            LogError::InvalidConfig(_) => ErrorKind::Config,
        }
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::DuplicateAction(name) => {
                write!(f, "Action '{name}' is already registered")
            }
            LogError::InvalidShape { name, shape } => {
                write!(
                    f,
                    "Invalid shape {shape:?} for action '{name}': dimensions must be positive"
                )
            }
            LogError::UnknownAction(name) => write!(f, "Unknown action '{name}'"),
            LogError::ShapeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "Shape mismatch for action '{name}': expected {expected} values, got {found}"
            ),
            LogError::EmptySchema => write!(f, "Cannot activate a log with no registered actions"),
            LogError::SchemaMismatch(msg) => write!(f, "Schema mismatch: {msg}"),
            LogError::SessionState { operation, state } => {
                write!(f, "Cannot {operation} while session is {state:?}")
            }
            LogError::SessionClosed => write!(f, "Session is closed"),
            LogError::StorageAlreadyExists(path) => {
                write!(f, "A log store already exists at {}", path.display())
            }
            LogError::StoreNotFound(path) => {
                write!(f, "No log store found at {}", path.display())
            }
            LogError::CorruptStore(msg) => write!(f, "Corrupt log store: {msg}"),
            LogError::StoreInUse(path) => {
                write!(
                    f,
                    "Log store at {} is still open for writing \
                     (if its writer crashed, clear the lock with recover_store)",
                    path.display()
                )
            }
            LogError::IncompleteBlock {
                table,
                staged,
                requested,
            } => write!(
                f,
                "Table '{table}' holds {staged} frames, cannot publish {requested}"
            ),
            LogError::OutOfRange { index, frame_count } => write!(
                f,
                "Frame {index} out of range (log has {frame_count} frames)"
            ),
            LogError::InvalidConfig(msg) => write!(f, "Invalid config: {msg}"),
            LogError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LogError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LogError {
    fn from(e: std::io::Error) -> Self {
        LogError::Io(e)
    }
}

impl From<bitcode::Error> for LogError {
    fn from(e: bitcode::Error) -> Self {
        LogError::CorruptStore(format!("bitcode decode error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_shape_mismatch() {
        let err = LogError::ShapeMismatch {
            name: "vr_hand".to_string(),
            expected: 9,
            found: 7,
        };
        let msg = format!("{err}");
        assert!(msg.contains("vr_hand"), "got: {msg}");
        assert!(msg.contains("expected 9"), "got: {msg}");
        assert!(msg.contains("got 7"), "got: {msg}");
    }

    #[test]
    fn test_display_out_of_range() {
        let err = LogError::OutOfRange {
            index: 12,
            frame_count: 10,
        };
        let msg = format!("{err}");
        assert!(msg.contains("Frame 12"), "got: {msg}");
        assert!(msg.contains("10 frames"), "got: {msg}");
    }

    #[test]
    fn test_display_session_state() {
        let err = LogError::SessionState {
            operation: "register",
            state: SessionState::Active,
        };
        let msg = format!("{err}");
        assert!(msg.contains("register"), "got: {msg}");
        assert!(msg.contains("Active"), "got: {msg}");
    }

    #[test]
    fn test_store_in_use_names_recovery() {
        let msg = LogError::StoreInUse(PathBuf::from("/logs/run_1")).to_string();
        assert!(msg.contains("/logs/run_1"), "got: {msg}");
        assert!(msg.contains("recover_store"), "got: {msg}");
    }

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(LogError::EmptySchema.kind(), ErrorKind::Schema);
        assert_eq!(
            LogError::SchemaMismatch("x".into()).kind(),
            ErrorKind::Schema
        );
        assert_eq!(LogError::SessionClosed.kind(), ErrorKind::Lifecycle);
        assert_eq!(
            LogError::StoreInUse(PathBuf::from("a")).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            LogError::OutOfRange {
                index: 0,
                frame_count: 0
            }
            .kind(),
            ErrorKind::Range
        );
        assert_eq!(LogError::InvalidConfig("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LogError = io_err.into();
        assert!(matches!(err, LogError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(std::error::Error::source(&err).is_some());
    }
}
