use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frame::Emotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Medium => "medium",
            EngagementLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<EngagementLevel> {
        match value {
            "low" => Some(EngagementLevel::Low),
            "medium" => Some(EngagementLevel::Medium),
            "high" => Some(EngagementLevel::High),
            _ => None,
        }
    }
}

/// Statistical rollup of an activity's recent frame history, produced once
/// per elapsed minute and once at finalize. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteSummary {
    pub summary_id: String,
    pub activity_id: String,
    pub session_id: String,
    pub minute_number: u32,
    pub predominant_emotion: Emotion,
    pub emotion_confidence_avg: f64,
    pub ear_avg: f64,
    pub pitch_avg: f64,
    pub yaw_avg: f64,
    pub looking_screen_pct: f64,
    pub face_detected_pct: f64,
    pub distraction_count: u32,
    pub drowsiness_count: u32,
    pub cognitive_state: String,
    pub engagement_level: EngagementLevel,
    pub created_at: DateTime<Utc>,
}
