//! Per-minute statistical rollups over an activity's frame history.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::state::ActivityState;
use crate::models::{Emotion, EngagementLevel, MinuteSummary};

/// Builds a summary of the current buffer, or None when no frames have
/// arrived yet. Same inputs always produce the same summary.
pub fn build_minute_summary(state: &ActivityState, now: DateTime<Utc>) -> Option<MinuteSummary> {
    if state.frame_count() == 0 {
        return None;
    }

    let frames = state.frames();
    let total = frames.len() as f64;

    let (predominant_emotion, emotion_confidence_avg) = predominant_emotion(state);

    let ear_avg = mean_over(frames.iter().map(|f| f.ear).filter(|v| *v > 0.0));
    let pitch_avg = mean_over(frames.iter().map(|f| f.pitch).filter(|v| *v != 0.0));
    let yaw_avg = mean_over(frames.iter().map(|f| f.yaw).filter(|v| *v != 0.0));

    let looking = frames.iter().filter(|f| f.looking_at_screen).count() as f64;
    let faces = frames.iter().filter(|f| f.face_detected).count() as f64;
    let looking_screen_pct = looking / total * 100.0;
    let face_detected_pct = faces / total * 100.0;

    let cognitive_state = predominant_cognitive_state(state);
    let engagement_level = engagement(looking_screen_pct, emotion_confidence_avg);

    let minute_number = state.elapsed_minutes(now).floor().max(0.0) as u32;

    Some(MinuteSummary {
        summary_id: format!("sum_{}_{}", state.activity_id, minute_number),
        activity_id: state.activity_id.clone(),
        session_id: state.session_id.clone(),
        minute_number,
        predominant_emotion,
        emotion_confidence_avg,
        ear_avg,
        pitch_avg,
        yaw_avg,
        looking_screen_pct,
        face_detected_pct,
        distraction_count: state.count_recent_distractions(1, now),
        drowsiness_count: state.count_recent_drowsiness(1, now),
        cognitive_state,
        engagement_level,
        created_at: now,
    })
}

/// Modal emotion over the buffer, ignoring frames the classifier could not
/// label. Ties break toward the emotion seen first. The paired average is
/// the mean confidence over that emotion's frames only.
fn predominant_emotion(state: &ActivityState) -> (Emotion, f64) {
    let mut counts: HashMap<Emotion, u32> = HashMap::new();
    for frame in state.frames() {
        if frame.emotion != Emotion::Unknown {
            *counts.entry(frame.emotion).or_insert(0) += 1;
        }
    }

    let Some(max) = counts.values().copied().max() else {
        return (Emotion::Unknown, 0.0);
    };
    let winner = state
        .frames()
        .iter()
        .map(|f| f.emotion)
        .find(|e| counts.get(e) == Some(&max))
        .unwrap_or(Emotion::Unknown);

    let confidence_avg = mean_over(
        state
            .frames()
            .iter()
            .filter(|f| f.emotion == winner)
            .map(|f| f.confidence),
    );
    (winner, confidence_avg)
}

/// Modal cognitive-state label, ignoring "unknown". First-seen wins ties.
fn predominant_cognitive_state(state: &ActivityState) -> String {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for frame in state.frames() {
        if frame.cognitive_state != "unknown" && !frame.cognitive_state.is_empty() {
            *counts.entry(frame.cognitive_state.as_str()).or_insert(0) += 1;
        }
    }

    let Some(max) = counts.values().copied().max() else {
        return "unknown".to_string();
    };
    state
        .frames()
        .iter()
        .map(|f| f.cognitive_state.as_str())
        .find(|s| counts.get(s) == Some(&max))
        .unwrap_or("unknown")
        .to_string()
}

fn engagement(looking_screen_pct: f64, emotion_confidence_avg: f64) -> EngagementLevel {
    if looking_screen_pct > 80.0 && emotion_confidence_avg > 0.6 {
        EngagementLevel::High
    } else if looking_screen_pct > 50.0 {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Low
    }
}

fn mean_over(values: impl Iterator<Item = f64>) -> f64 {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for v in values {
        count += 1;
        sum += v;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::models::Frame;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn make_state(minutes_ago: i64, now: DateTime<Utc>) -> ActivityState {
        ActivityState::new(
            "act-1",
            "sess-1",
            Thresholds::default(),
            300,
            now - Duration::minutes(minutes_ago),
        )
    }

    fn frame(emotion: Emotion, confidence: f64, looking: bool, cognitive: &str) -> Frame {
        Frame {
            timestamp: Utc::now(),
            emotion,
            confidence,
            ear: 0.3,
            pitch: 2.0,
            yaw: -1.0,
            looking_at_screen: looking,
            face_detected: true,
            cognitive_state: cognitive.to_string(),
        }
    }

    #[test]
    fn empty_buffer_yields_no_summary() {
        let now = Utc::now();
        let state = make_state(5, now);
        assert_eq!(build_minute_summary(&state, now), None);
    }

    #[test]
    fn summary_is_deterministic() {
        let now = Utc::now();
        let mut state = make_state(5, now);
        for i in 0..90 {
            let emotion = if i % 3 == 0 { Emotion::Happy } else { Emotion::Neutral };
            state.push_frame(frame(emotion, 0.7, i % 2 == 0, "focused"));
        }
        state.add_distraction_event(now - Duration::seconds(30));

        let first = build_minute_summary(&state, now).unwrap();
        let second = build_minute_summary(&state, now).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.summary_id, "sum_act-1_5");
        assert_eq!(first.minute_number, 5);
        assert_eq!(first.predominant_emotion, Emotion::Neutral);
        assert_eq!(first.distraction_count, 1);
        assert_eq!(first.drowsiness_count, 0);
        assert_eq!(first.cognitive_state, "focused");
    }

    #[test]
    fn emotion_tie_breaks_toward_first_seen() {
        let now = Utc::now();
        let mut state = make_state(2, now);
        state.push_frame(frame(Emotion::Sad, 0.8, true, "unknown"));
        state.push_frame(frame(Emotion::Happy, 0.6, true, "unknown"));
        state.push_frame(frame(Emotion::Happy, 0.6, true, "unknown"));
        state.push_frame(frame(Emotion::Sad, 0.8, true, "unknown"));

        let summary = build_minute_summary(&state, now).unwrap();
        assert_eq!(summary.predominant_emotion, Emotion::Sad);
        assert!((summary.emotion_confidence_avg - 0.8).abs() < 1e-9);
        assert_eq!(summary.cognitive_state, "unknown");
    }

    #[test]
    fn unknown_frames_are_excluded_from_the_mode() {
        let now = Utc::now();
        let mut state = make_state(2, now);
        for _ in 0..10 {
            state.push_frame(frame(Emotion::Unknown, 0.0, true, "unknown"));
        }
        state.push_frame(frame(Emotion::Surprise, 0.9, true, "engaged"));

        let summary = build_minute_summary(&state, now).unwrap();
        assert_eq!(summary.predominant_emotion, Emotion::Surprise);
        assert_eq!(summary.cognitive_state, "engaged");
    }

    #[test]
    fn all_unknown_buffer_reports_unknown() {
        let now = Utc::now();
        let mut state = make_state(2, now);
        for _ in 0..10 {
            state.push_frame(frame(Emotion::Unknown, 0.0, false, "unknown"));
        }

        let summary = build_minute_summary(&state, now).unwrap();
        assert_eq!(summary.predominant_emotion, Emotion::Unknown);
        assert_eq!(summary.emotion_confidence_avg, 0.0);
        assert_eq!(summary.engagement_level, EngagementLevel::Low);
    }

    #[test]
    fn engagement_tiers_follow_attention_and_confidence() {
        let now = Utc::now();

        // 100% looking, high confidence: high.
        let mut state = make_state(2, now);
        for _ in 0..20 {
            state.push_frame(frame(Emotion::Happy, 0.9, true, "focused"));
        }
        let summary = build_minute_summary(&state, now).unwrap();
        assert_eq!(summary.engagement_level, EngagementLevel::High);

        // 100% looking but weak confidence: medium.
        let mut state = make_state(2, now);
        for _ in 0..20 {
            state.push_frame(frame(Emotion::Happy, 0.4, true, "focused"));
        }
        let summary = build_minute_summary(&state, now).unwrap();
        assert_eq!(summary.engagement_level, EngagementLevel::Medium);

        // Mostly looking away: low.
        let mut state = make_state(2, now);
        for i in 0..20 {
            state.push_frame(frame(Emotion::Happy, 0.9, i % 4 == 0, "focused"));
        }
        let summary = build_minute_summary(&state, now).unwrap();
        assert_eq!(summary.engagement_level, EngagementLevel::Low);
    }

    #[test]
    fn zero_readings_are_excluded_from_signal_averages() {
        let now = Utc::now();
        let mut state = make_state(2, now);

        let mut absent = frame(Emotion::Unknown, 0.0, false, "unknown");
        absent.ear = 0.0;
        absent.pitch = 0.0;
        absent.yaw = 0.0;
        absent.face_detected = false;

        let mut present = frame(Emotion::Neutral, 0.5, true, "focused");
        present.ear = 0.28;
        present.pitch = 4.0;
        present.yaw = -6.0;

        for _ in 0..5 {
            state.push_frame(absent.clone());
            state.push_frame(present.clone());
        }

        let summary = build_minute_summary(&state, now).unwrap();
        assert!((summary.ear_avg - 0.28).abs() < 1e-9);
        assert!((summary.pitch_avg - 4.0).abs() < 1e-9);
        assert!((summary.yaw_avg - (-6.0)).abs() < 1e-9);
        assert_eq!(summary.looking_screen_pct, 50.0);
        assert_eq!(summary.face_detected_pct, 50.0);
    }
}
