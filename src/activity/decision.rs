//! Intervention decision engine: a priority cascade over the current
//! activity state, rate-limited by a global cooldown plus per-type
//! cooldowns. Produces at most one intervention per evaluation, and records
//! the send in the same step as the decision.

use chrono::{DateTime, Utc};

use super::state::ActivityState;
use crate::config::EngineConfig;
use crate::models::{Emotion, Intervention, InterventionKind};

/// Buffered frames required before the camera-setup nudge is considered.
const CAMERA_SETUP_MIN_FRAMES: usize = 150;

/// Trailing window and limit for the intervention-pressure ceiling.
const PRESSURE_WINDOW_MINUTES: i64 = 10;
const PRESSURE_LIMIT: u32 = 3;

/// Frames sampled for the trailing Angry-confidence averages.
const FRUSTRATION_SAMPLE_FRAMES: usize = 50;

/// Frames sampled for the distraction/drowsiness intensity metrics
/// (roughly two seconds of capture).
const METRIC_SAMPLE_FRAMES: usize = 60;

/// Evaluates the cascade once for the current state. Returns the
/// intervention to deliver, already recorded against the state's ledger.
pub fn evaluate(
    state: &mut ActivityState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<Intervention> {
    // Global cooldown: nothing fires within 3 minutes of any send.
    if let Some(last) = state.ledger.last_any() {
        if (now - last).num_seconds() < config.global_cooldown_secs {
            return None;
        }
    }

    // Grace period: only the camera-setup exception may fire.
    if state.in_grace_period(now, config.grace_period_minutes) {
        return check_camera_setup(state, config, now);
    }

    // Hard ceiling: the activity has simply run long enough.
    let elapsed = state.elapsed_minutes(now);
    if elapsed >= state.thresholds.pause_time_minutes as f64
        && state
            .ledger
            .cooldown_elapsed(InterventionKind::PauseSuggestion, config.pause_cooldown_minutes, now)
    {
        return Some(emit(
            state,
            InterventionKind::PauseSuggestion,
            None,
            Some("You've been working for a while now. We suggest taking a short break."),
            false,
            "activity_duration",
            elapsed,
            1.0,
            now,
        ));
    }

    // Hard ceiling: too many interventions in the trailing window.
    let pressure = state.ledger.total_in_window(PRESSURE_WINDOW_MINUTES, now);
    if pressure >= PRESSURE_LIMIT
        && state
            .ledger
            .cooldown_elapsed(InterventionKind::PauseSuggestion, config.pause_cooldown_minutes, now)
    {
        return Some(emit(
            state,
            InterventionKind::PauseSuggestion,
            None,
            Some("You've received several nudges recently. We suggest taking a break."),
            false,
            "intervention_limit",
            pressure as f64,
            0.95,
            now,
        ));
    }

    if let Some(intervention) = check_frustration(state, config, now) {
        return Some(intervention);
    }
    if let Some(intervention) = check_distraction(state, config, now) {
        return Some(intervention);
    }
    check_drowsiness(state, config, now)
}

/// Grace-period exception: the camera is clearly not set up (a full buffer
/// with no face ever detected), so nudge the user to adjust it.
fn check_camera_setup(
    state: &mut ActivityState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<Intervention> {
    if state.frame_count() < CAMERA_SETUP_MIN_FRAMES {
        return None;
    }
    let no_face = state.frames().iter().filter(|f| !f.face_detected).count();
    if no_face != state.frame_count() {
        return None;
    }
    if !state.ledger.cooldown_elapsed(
        InterventionKind::VibrationOnly,
        config.camera_setup_cooldown_minutes,
        now,
    ) {
        return None;
    }

    let ratio = no_face as f64 / state.frame_count() as f64;
    Some(emit(
        state,
        InterventionKind::VibrationOnly,
        None,
        None,
        true,
        "camera_setup",
        ratio,
        1.0,
        now,
    ))
}

/// Frustration cascade, strict priority. A step that matches but is blocked
/// by its cooldown ends the cascade without an intervention; lower-priority
/// affect categories are still evaluated by the caller.
fn check_frustration(
    state: &mut ActivityState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<Intervention> {
    let start = state.frustration_start?;
    if (now - start).num_seconds() < config.frustration_hold_secs {
        return None;
    }

    let (angry_avg, angry_confidence) = angry_confidence_stats(state);
    let video_url = config.instruction_video_url.clone();
    let pause_cd = config.pause_cooldown_minutes;
    let video_cd = config.video_cooldown_minutes;
    let help_sent = state.ledger.count(InterventionKind::VideoInstruction)
        + state.ledger.count(InterventionKind::TextInstruction);

    if angry_avg > state.thresholds.frustration_threshold {
        if state
            .ledger
            .cooldown_elapsed(InterventionKind::PauseSuggestion, pause_cd, now)
        {
            return Some(emit(
                state,
                InterventionKind::PauseSuggestion,
                None,
                Some("We noticed things are getting frustrating. A short break could help."),
                false,
                "extreme_frustration",
                angry_avg,
                angry_confidence,
                now,
            ));
        }
    } else if help_sent >= 2 {
        if state
            .ledger
            .cooldown_elapsed(InterventionKind::PauseSuggestion, pause_cd, now)
        {
            return Some(emit(
                state,
                InterventionKind::PauseSuggestion,
                None,
                Some("You've had some help but still seem stuck. We suggest taking a break."),
                false,
                "persistent_frustration",
                angry_avg,
                angry_confidence,
                now,
            ));
        }
    } else if state.count_recent_distractions(3, now) >= 4 {
        if state
            .ledger
            .cooldown_elapsed(InterventionKind::VideoInstruction, video_cd, now)
        {
            return Some(emit(
                state,
                InterventionKind::VideoInstruction,
                Some(video_url),
                Some("This step looks tricky. Here's a walkthrough video that might help."),
                false,
                "frustration_with_distraction",
                angry_avg,
                angry_confidence,
                now,
            ));
        }
    } else if angry_avg > state.thresholds.frustration_threshold - 0.05 {
        if state
            .ledger
            .cooldown_elapsed(InterventionKind::VideoInstruction, video_cd, now)
        {
            return Some(emit(
                state,
                InterventionKind::VideoInstruction,
                Some(video_url),
                Some("We noticed some frustration. Here's a short instructional video."),
                true,
                "high_frustration",
                angry_avg,
                angry_confidence,
                now,
            ));
        }
    } else if state.ledger.count(InterventionKind::VideoInstruction) == 0 {
        if state
            .ledger
            .cooldown_elapsed(InterventionKind::VideoInstruction, video_cd, now)
        {
            return Some(emit(
                state,
                InterventionKind::VideoInstruction,
                Some(video_url),
                Some("Here's a video that may help with this step."),
                false,
                "frustration",
                angry_avg,
                angry_confidence,
                now,
            ));
        }
    } else if state.ledger.count(InterventionKind::TextInstruction) == 0
        && state
            .ledger
            .cooldown_elapsed(InterventionKind::TextInstruction, config.text_cooldown_minutes, now)
    {
        return Some(emit(
            state,
            InterventionKind::TextInstruction,
            None,
            Some("Take it one step at a time and follow the instructions carefully."),
            false,
            "frustration",
            angry_avg,
            angry_confidence,
            now,
        ));
    }

    None
}

/// Distraction cascade: escalate to a pause once vibrations have stopped
/// working, otherwise a haptic nudge.
fn check_distraction(
    state: &mut ActivityState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<Intervention> {
    let count_2min = state.count_recent_distractions(2, now);
    let count_3min = state.count_recent_distractions(3, now);
    let metric = distraction_metric(state);

    if count_3min >= 5 && state.ledger.count(InterventionKind::VibrationOnly) >= 3 {
        if state.ledger.cooldown_elapsed(
            InterventionKind::PauseSuggestion,
            config.pause_cooldown_minutes,
            now,
        ) {
            return Some(emit(
                state,
                InterventionKind::PauseSuggestion,
                None,
                Some("We noticed frequent distractions. We suggest taking a break."),
                false,
                "persistent_distraction",
                metric,
                0.90,
                now,
            ));
        }
    } else if count_2min >= state.thresholds.distraction_threshold
        && state.ledger.cooldown_elapsed(
            InterventionKind::VibrationOnly,
            config.vibration_cooldown_minutes,
            now,
        )
    {
        return Some(emit(
            state,
            InterventionKind::VibrationOnly,
            None,
            None,
            true,
            "distraction",
            metric,
            0.85,
            now,
        ));
    }

    None
}

/// Drowsiness cascade, same shape as distraction.
fn check_drowsiness(
    state: &mut ActivityState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<Intervention> {
    let count_2min = state.count_recent_drowsiness(2, now);
    let metric = drowsiness_metric(state);

    if count_2min >= 3 && state.ledger.count(InterventionKind::VibrationOnly) >= 3 {
        if state.ledger.cooldown_elapsed(
            InterventionKind::PauseSuggestion,
            config.pause_cooldown_minutes,
            now,
        ) {
            return Some(emit(
                state,
                InterventionKind::PauseSuggestion,
                None,
                Some("We noticed persistent drowsiness. We suggest getting some rest."),
                false,
                "persistent_drowsiness",
                metric,
                0.90,
                now,
            ));
        }
    } else if count_2min >= state.thresholds.drowsiness_threshold
        && state.ledger.cooldown_elapsed(
            InterventionKind::VibrationOnly,
            config.vibration_cooldown_minutes,
            now,
        )
    {
        return Some(emit(
            state,
            InterventionKind::VibrationOnly,
            None,
            None,
            true,
            "drowsiness",
            metric,
            0.85,
            now,
        ));
    }

    None
}

/// Mean Angry confidence over the trailing sample window: first averaged
/// over the whole window (the cascade metric), then over Angry frames only
/// (reported as the packet confidence).
fn angry_confidence_stats(state: &ActivityState) -> (f64, f64) {
    let mut window_len = 0usize;
    let mut angry_count = 0usize;
    let mut angry_sum = 0.0f64;

    for frame in state.recent_frames(FRUSTRATION_SAMPLE_FRAMES) {
        window_len += 1;
        if frame.emotion == Emotion::Angry {
            angry_count += 1;
            angry_sum += frame.confidence;
        }
    }

    let avg_over_window = angry_sum / window_len.max(1) as f64;
    let avg_over_angry = if angry_count > 0 {
        angry_sum / angry_count as f64
    } else {
        0.0
    };
    (avg_over_window, avg_over_angry)
}

/// Share of recent face-visible frames where the user looked away.
fn distraction_metric(state: &ActivityState) -> f64 {
    let mut window_len = 0usize;
    let mut not_looking = 0usize;
    for frame in state.recent_frames(METRIC_SAMPLE_FRAMES) {
        window_len += 1;
        if frame.face_detected && !frame.looking_at_screen {
            not_looking += 1;
        }
    }
    not_looking as f64 / window_len.max(1) as f64
}

/// Normalized eye-closure intensity: low recent EAR yields a high metric.
fn drowsiness_metric(state: &ActivityState) -> f64 {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for frame in state.recent_frames(METRIC_SAMPLE_FRAMES) {
        if frame.face_detected && frame.ear > 0.0 {
            count += 1;
            sum += frame.ear;
        }
    }
    let avg_ear = if count > 0 { sum / count as f64 } else { 0.0 };
    1.0 - (avg_ear / 0.3).min(1.0)
}

/// Builds the intervention and records it against the ledger in one step so
/// a decision can never be made without its bookkeeping.
#[allow(clippy::too_many_arguments)]
fn emit(
    state: &mut ActivityState,
    kind: InterventionKind,
    video_url: Option<String>,
    display_text: Option<&str>,
    vibration: bool,
    metric_name: &str,
    metric_value: f64,
    confidence: f64,
    now: DateTime<Utc>,
) -> Intervention {
    state.ledger.record(kind, now);
    Intervention::new(
        &state.activity_id,
        &state.session_id,
        kind,
        video_url,
        display_text.map(str::to_string),
        vibration,
        metric_name,
        metric_value,
        confidence,
        now,
    )
}
