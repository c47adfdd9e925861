//! Close semantics: partial flush, idempotence, empty recordings.

use std::fs;

use super::harness::TestLog;
use crate::log_error::LogError;
use crate::reader::ReplayReader;
use crate::session::SessionState;
use crate::store::StoreLayout;

#[test]
fn test_close_twice_is_noop() {
    let log = TestLog::new("close_twice");
    let mut session = log.active_session(4, &[("a", &[2])]);
    for i in 0..6 {
        session.save_action("a", &[i as f32, 0.0]).unwrap();
        session.process_frame().unwrap();
    }

    let first = session.close().unwrap();
    let layout = StoreLayout::new(log.path());
    let checkpoint_bytes = fs::read(layout.checkpoint()).unwrap();
    let table_bytes = fs::read(layout.table("table_000.tbl")).unwrap();

    let second = session.close().unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(layout.checkpoint()).unwrap(), checkpoint_bytes);
    assert_eq!(fs::read(layout.table("table_000.tbl")).unwrap(), table_bytes);
    assert_eq!(first.blocks, 2);
    assert_eq!(first.total_frames, 6);
}

#[test]
fn test_close_on_window_boundary_appends_nothing_extra() {
    let log = TestLog::new("close_boundary");
    let mut session = log.active_session(3, &[("a", &[1])]);
    for _ in 0..6 {
        session.process_frame().unwrap();
    }
    let summary = session.close().unwrap();
    assert_eq!(summary.blocks, 2);
    assert_eq!(summary.total_frames, 6);
}

#[test]
fn test_close_without_frames_leaves_empty_store() {
    let log = TestLog::new("close_empty");
    let mut session = log.active_session(3, &[("a", &[1])]);
    assert_eq!(session.state(), SessionState::Active);
    let summary = session.close().unwrap();
    assert_eq!(summary.total_frames, 0);
    assert_eq!(summary.blocks, 0);

    let reader = ReplayReader::open_unchecked(log.path()).unwrap();
    assert_eq!(reader.frame_count(), 0);
    assert!(reader.closed_cleanly());
    assert!(matches!(
        reader.get_frame(0),
        Err(LogError::OutOfRange { .. })
    ));
}

#[test]
fn test_recording_into_existing_store_fails() {
    let log = TestLog::new("existing");
    let mut session = log.active_session(3, &[("a", &[1])]);
    session.close().unwrap();

    let mut second = log.session(3);
    second.register("a", &[1]).unwrap();
    assert!(matches!(
        second.activate(),
        Err(LogError::StorageAlreadyExists(_))
    ));
    assert_eq!(second.state(), SessionState::Configuring);
}
