//! Bevy plugin that drives recording and playback from the fixed timestep.
//!
//! - `ActionRecorder` holds an optional [`LogSession`]. Gameplay systems call
//!   `save_action` during `FixedUpdate`; `process_recorded_frame` marks the
//!   frame boundary in `FixedPostUpdate`.
//! - `ActionPlayer` holds an optional [`ReplayReader`]. `advance_playback`
//!   steps it in `FixedPreUpdate` so gameplay systems see the recorded frame
//!   for the current step.
//!
//! The session is closed when the app exits.

use bevy::prelude::*;

use crate::log_error::LogResult;
use crate::reader::{Frame, ReplayReader};
use crate::session::{LogSession, RecordingSummary};

/// Resource owning the active recording session, if any.
#[derive(Resource, Default)]
pub struct ActionRecorder {
    session: Option<LogSession>,
    /// Message of the last error raised inside a recorder system.
    last_error: Option<String>,
}

impl ActionRecorder {
    /// Take ownership of an activated session.
    pub fn start(&mut self, session: LogSession) {
        self.session = Some(session);
        self.last_error = None;
    }

    /// Stage a value for the current frame. No-op when not recording.
    pub fn save_action(&mut self, name: &str, values: &[f32]) -> LogResult<()> {
        match self.session.as_mut() {
            Some(session) => session.save_action(name, values),
            None => Ok(()),
        }
    }

    /// Close the session and release it.
    ///
    /// On error the session is kept so `stop` can be retried.
    pub fn stop(&mut self) -> Option<LogResult<RecordingSummary>> {
        let mut session = self.session.take()?;
        let result = session.close();
        if result.is_err() {
            self.session = Some(session);
        }
        Some(result)
    }

    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    pub fn session(&self) -> Option<&LogSession> {
        self.session.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Resource that steps through a recorded log, one frame per fixed tick.
#[derive(Resource, Default)]
pub struct ActionPlayer {
    reader: Option<ReplayReader>,
    /// Frame exposed to gameplay systems during the current step.
    current: Option<u64>,
    /// Next frame to expose.
    next: u64,
    playing: bool,
}

impl ActionPlayer {
    /// Load a reader and reset to the first frame.
    pub fn load(&mut self, reader: ReplayReader) {
        self.reader = Some(reader);
        self.current = None;
        self.next = 0;
        self.playing = true;
    }

    /// Advance to the next frame. Returns `false` once the log is exhausted,
    /// at which point `current_frame` returns `None`.
    pub fn advance(&mut self) -> bool {
        let frame_count = match &self.reader {
            Some(reader) if self.playing => reader.frame_count(),
            _ => return false,
        };
        if self.next >= frame_count {
            self.current = None;
            return false;
        }
        self.current = Some(self.next);
        self.next += 1;
        true
    }

    /// Frame for the current fixed step.
    pub fn current_frame(&self) -> Option<Frame<'_>> {
        let reader = self.reader.as_ref()?;
        reader.get_frame(self.current?).ok()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_finished(&self) -> bool {
        match &self.reader {
            Some(reader) => self.next >= reader.frame_count() && self.current.is_none(),
            None => true,
        }
    }

    /// Stop playback and release the reader.
    pub fn stop(&mut self) {
        self.reader = None;
        self.current = None;
        self.next = 0;
        self.playing = false;
    }

    pub fn reader(&self) -> Option<&ReplayReader> {
        self.reader.as_ref()
    }
}

/// Marks the frame boundary for the active session.
///
/// Runs in `FixedPostUpdate`, after every `FixedUpdate` system had the chance
/// to save its actions for this step. Errors cannot propagate out of a system,
/// so they are logged and kept on the resource.
pub fn process_recorded_frame(mut recorder: ResMut<ActionRecorder>) {
    let recorder = &mut *recorder;
    let Some(session) = recorder.session.as_mut() else {
        return;
    };
    if session.is_closed() {
        return;
    }
    if let Err(e) = session.process_frame() {
        error!("Action log: process_frame failed: {}", e);
        recorder.last_error = Some(e.to_string());
    }
}

/// Steps the player so the current fixed tick sees the next recorded frame.
pub fn advance_playback(mut player: ResMut<ActionPlayer>) {
    if !player.is_playing() {
        return;
    }
    if !player.advance() && player.is_finished() {
        info!("Action log: playback finished");
        player.playing = false;
    }
}

/// Closes the recording when the app exits.
pub fn close_recorder_on_exit(
    mut exits: EventReader<AppExit>,
    mut recorder: ResMut<ActionRecorder>,
) {
    if exits.read().next().is_none() {
        return;
    }
    if let Some(Err(e)) = recorder.stop() {
        error!("Action log: failed to close recording on exit: {}", e);
        recorder.last_error = Some(e.to_string());
    }
}

/// Plugin that provides fixed-step action recording and playback.
pub struct ActionLogPlugin;

impl Plugin for ActionLogPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ActionRecorder>()
            .init_resource::<ActionPlayer>()
            .add_systems(FixedPreUpdate, advance_playback)
            .add_systems(FixedPostUpdate, process_recorded_frame)
            .add_systems(Last, close_recorder_on_exit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_without_reader_is_finished() {
        let mut player = ActionPlayer::default();
        assert!(!player.is_playing());
        assert!(player.is_finished());
        assert!(!player.advance());
        assert!(player.current_frame().is_none());
    }

    #[test]
    fn recorder_without_session_ignores_writes() {
        let mut recorder = ActionRecorder::default();
        assert!(!recorder.is_recording());
        assert!(recorder.save_action("hand", &[1.0]).is_ok());
        assert!(recorder.stop().is_none());
    }
}
