//! Sustained-event detection: promotes runs of anomalous frames into
//! discrete timestamped events on the activity state.
//!
//! Runs are tracked incrementally as frames arrive, which is equivalent to
//! re-scanning the tail of the buffer but fires each event exactly once per
//! qualifying run: the event is promoted the moment the run reaches its
//! required length, and a longer run does not re-fire until broken.

use chrono::{DateTime, Utc};

use super::state::ActivityState;
use crate::models::{Emotion, Frame};

/// Consecutive face-visible, not-looking frames that count as a distraction.
pub const DISTRACTION_RUN_FRAMES: u32 = 15;

/// Consecutive low-EAR frames that count as a drowsiness event. The run
/// requirement is longer than the distraction one on purpose: eye closure
/// flickers far more than gaze direction.
pub const DROWSINESS_RUN_FRAMES: u32 = 25;

/// Consecutive high-confidence Angry frames before frustration is considered
/// sustained. Strict by design: one non-qualifying frame resets the run,
/// trading sensitivity for false-positive suppression.
pub const FRUSTRATION_RUN_FRAMES: u32 = 100;

/// Eye-aspect-ratio below which eyes are treated as closing.
pub const DROWSY_EAR_THRESHOLD: f64 = 0.25;

/// Minimum Angry confidence for a frame to extend a frustration run.
pub const FRUSTRATION_MIN_CONFIDENCE: f64 = 0.75;

/// Updates run counters for the newly appended frame and promotes events
/// when a run reaches its required length. Invoked once per frame append,
/// before the decision engine.
pub fn observe_frame(state: &mut ActivityState, frame: &Frame, now: DateTime<Utc>) {
    if frame.face_detected && !frame.looking_at_screen {
        state.distracted_run = state.distracted_run.saturating_add(1);
        if state.distracted_run == DISTRACTION_RUN_FRAMES {
            state.add_distraction_event(now);
        }
    } else {
        state.distracted_run = 0;
    }

    if frame.face_detected && frame.ear < DROWSY_EAR_THRESHOLD {
        state.low_ear_run = state.low_ear_run.saturating_add(1);
        if state.low_ear_run == DROWSINESS_RUN_FRAMES {
            state.add_drowsiness_event(now);
        }
    } else {
        state.low_ear_run = 0;
    }

    if frame.emotion == Emotion::Angry && frame.confidence > FRUSTRATION_MIN_CONFIDENCE {
        state.angry_run = state.angry_run.saturating_add(1);
        if state.angry_run >= FRUSTRATION_RUN_FRAMES && state.frustration_start.is_none() {
            state.frustration_start = Some(now);
        }
    } else {
        state.angry_run = 0;
        state.frustration_start = None;
    }
}
