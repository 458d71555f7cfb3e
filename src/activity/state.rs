use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::config::Thresholds;
use crate::models::{Frame, InterventionKind};

/// Detector-promoted event timestamps are kept for this long.
const EVENT_RETENTION_MINUTES: i64 = 10;

/// Per-kind intervention bookkeeping: monotonically growing counts and the
/// last-send time used for cooldown checks.
#[derive(Debug, Default, Clone)]
pub struct InterventionLedger {
    counts: HashMap<InterventionKind, u32>,
    last_sent: HashMap<InterventionKind, DateTime<Utc>>,
}

impl InterventionLedger {
    pub fn count(&self, kind: InterventionKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn last_sent(&self, kind: InterventionKind) -> Option<DateTime<Utc>> {
        self.last_sent.get(&kind).copied()
    }

    /// Records a send. Called atomically with the decision that produced it.
    pub fn record(&mut self, kind: InterventionKind, now: DateTime<Utc>) {
        *self.counts.entry(kind).or_insert(0) += 1;
        self.last_sent.insert(kind, now);
    }

    /// True when no intervention of `kind` was sent within the cooldown.
    pub fn cooldown_elapsed(
        &self,
        kind: InterventionKind,
        cooldown_minutes: i64,
        now: DateTime<Utc>,
    ) -> bool {
        match self.last_sent(kind) {
            Some(last) => (now - last).num_seconds() >= cooldown_minutes * 60,
            None => true,
        }
    }

    /// Most recent send time across all kinds.
    pub fn last_any(&self) -> Option<DateTime<Utc>> {
        self.last_sent.values().copied().max()
    }

    /// Number of kinds whose most recent send falls within the trailing window.
    pub fn total_in_window(&self, minutes: i64, now: DateTime<Utc>) -> u32 {
        let cutoff = now - Duration::minutes(minutes);
        self.last_sent.values().filter(|t| **t >= cutoff).count() as u32
    }

    /// Clears all last-send times so cooldowns do not bleed across a pause
    /// boundary. Counts are untouched.
    pub fn clear_last_sent(&mut self) {
        self.last_sent.clear();
    }
}

/// Mutable per-activity aggregate: bounded frame history, detector event
/// timelines, intervention bookkeeping. Owned exclusively by one worker
/// task; all mutation happens on that task.
#[derive(Debug)]
pub struct ActivityState {
    pub activity_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    frames: VecDeque<Frame>,
    capacity: usize,
    distraction_events: Vec<DateTime<Utc>>,
    drowsiness_events: Vec<DateTime<Utc>>,
    pub ledger: InterventionLedger,
    pub frustration_start: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub thresholds: Thresholds,
    // Detector run counters, updated on every frame append.
    pub(crate) distracted_run: u32,
    pub(crate) low_ear_run: u32,
    pub(crate) angry_run: u32,
}

impl ActivityState {
    pub fn new(
        activity_id: &str,
        session_id: &str,
        thresholds: Thresholds,
        capacity: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            session_id: session_id.to_string(),
            started_at,
            frames: VecDeque::with_capacity(capacity),
            capacity,
            distraction_events: Vec::new(),
            drowsiness_events: Vec::new(),
            ledger: InterventionLedger::default(),
            frustration_start: None,
            is_paused: false,
            thresholds,
            distracted_run: 0,
            low_ear_run: 0,
            angry_run: 0,
        }
    }

    /// Appends a frame, evicting the oldest when the buffer is full.
    pub fn push_frame(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn frames(&self) -> &VecDeque<Frame> {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The most recent `n` frames in arrival order.
    pub fn recent_frames(&self, n: usize) -> impl Iterator<Item = &Frame> {
        self.frames.iter().skip(self.frames.len().saturating_sub(n))
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds() as f64 / 60_000.0
    }

    pub fn in_grace_period(&self, now: DateTime<Utc>, grace_minutes: i64) -> bool {
        self.elapsed_minutes(now) < grace_minutes as f64
    }

    pub fn add_distraction_event(&mut self, now: DateTime<Utc>) {
        self.distraction_events.push(now);
        prune_events(&mut self.distraction_events, now);
    }

    pub fn add_drowsiness_event(&mut self, now: DateTime<Utc>) {
        self.drowsiness_events.push(now);
        prune_events(&mut self.drowsiness_events, now);
    }

    pub fn count_recent_distractions(&self, minutes: i64, now: DateTime<Utc>) -> u32 {
        count_recent(&self.distraction_events, minutes, now)
    }

    pub fn count_recent_drowsiness(&self, minutes: i64, now: DateTime<Utc>) -> u32 {
        count_recent(&self.drowsiness_events, minutes, now)
    }

    /// Resume semantics: cooldowns are reset so an intervention that fired
    /// just before a long pause cannot suppress the first one after it.
    pub fn reset_cooldowns(&mut self) {
        self.ledger.clear_last_sent();
    }
}

fn prune_events(events: &mut Vec<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - Duration::minutes(EVENT_RETENTION_MINUTES);
    // Timestamps are appended in order, so drain from the front.
    while events.first().is_some_and(|t| *t < cutoff) {
        events.remove(0);
    }
}

fn count_recent(events: &[DateTime<Utc>], minutes: i64, now: DateTime<Utc>) -> u32 {
    let cutoff = now - Duration::minutes(minutes);
    events.iter().filter(|t| **t >= cutoff).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Emotion;
    use pretty_assertions::assert_eq;

    pub(crate) fn make_frame(at: DateTime<Utc>, emotion: Emotion, confidence: f64) -> Frame {
        Frame {
            timestamp: at,
            emotion,
            confidence,
            ear: 0.3,
            pitch: 0.0,
            yaw: 0.0,
            looking_at_screen: true,
            face_detected: true,
            cognitive_state: "unknown".to_string(),
        }
    }

    fn make_state(now: DateTime<Utc>) -> ActivityState {
        ActivityState::new("act-1", "sess-1", Thresholds::default(), 300, now)
    }

    #[test]
    fn frame_buffer_is_bounded_and_fifo() {
        let now = Utc::now();
        let mut state = ActivityState::new("act-1", "sess-1", Thresholds::default(), 300, now);

        for i in 0..450 {
            let mut frame = make_frame(now, Emotion::Neutral, 0.5);
            frame.confidence = i as f64;
            state.push_frame(frame);
        }

        assert_eq!(state.frame_count(), 300);
        // Oldest 150 were evicted; the front is frame 150.
        assert_eq!(state.frames().front().unwrap().confidence, 150.0);
        assert_eq!(state.frames().back().unwrap().confidence, 449.0);
    }

    #[test]
    fn events_prune_to_trailing_ten_minutes() {
        let now = Utc::now();
        let mut state = make_state(now);

        state.add_distraction_event(now - Duration::minutes(15));
        state.add_distraction_event(now - Duration::minutes(5));
        state.add_distraction_event(now);

        assert_eq!(state.count_recent_distractions(10, now), 2);
        // The 15-minute-old entry was pruned on the last insert.
        assert_eq!(state.count_recent_distractions(60, now), 2);
    }

    #[test]
    fn windowed_counts_respect_cutoff() {
        let now = Utc::now();
        let mut state = make_state(now);

        state.add_drowsiness_event(now - Duration::minutes(3));
        state.add_drowsiness_event(now - Duration::seconds(30));

        assert_eq!(state.count_recent_drowsiness(2, now), 1);
        assert_eq!(state.count_recent_drowsiness(5, now), 2);
    }

    #[test]
    fn ledger_tracks_counts_and_cooldowns() {
        let now = Utc::now();
        let mut ledger = InterventionLedger::default();

        assert!(ledger.cooldown_elapsed(InterventionKind::VideoInstruction, 5, now));
        ledger.record(InterventionKind::VideoInstruction, now - Duration::minutes(3));
        assert_eq!(ledger.count(InterventionKind::VideoInstruction), 1);
        assert!(!ledger.cooldown_elapsed(InterventionKind::VideoInstruction, 5, now));
        assert!(ledger.cooldown_elapsed(InterventionKind::VideoInstruction, 2, now));
    }

    #[test]
    fn total_in_window_counts_kinds_not_sends() {
        let now = Utc::now();
        let mut ledger = InterventionLedger::default();

        ledger.record(InterventionKind::VideoInstruction, now - Duration::minutes(9));
        ledger.record(InterventionKind::VibrationOnly, now - Duration::minutes(4));
        ledger.record(InterventionKind::VibrationOnly, now - Duration::minutes(2));
        ledger.record(InterventionKind::PauseSuggestion, now - Duration::minutes(15));

        // Two vibration sends collapse to one entry; the old pause is outside.
        assert_eq!(ledger.total_in_window(10, now), 2);
    }

    #[test]
    fn reset_cooldowns_clears_last_sent_but_keeps_counts() {
        let now = Utc::now();
        let mut state = make_state(now);

        state.ledger.record(InterventionKind::PauseSuggestion, now);
        state.reset_cooldowns();

        assert_eq!(state.ledger.count(InterventionKind::PauseSuggestion), 1);
        assert_eq!(state.ledger.last_sent(InterventionKind::PauseSuggestion), None);
        assert!(state
            .ledger
            .cooldown_elapsed(InterventionKind::PauseSuggestion, 10, now));
    }
}
