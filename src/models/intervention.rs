use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// How long the client should display/run an intervention.
pub const INTERVENTION_DURATION_MS: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    VideoInstruction,
    TextInstruction,
    VibrationOnly,
    PauseSuggestion,
}

impl InterventionKind {
    pub const ALL: [InterventionKind; 4] = [
        InterventionKind::VideoInstruction,
        InterventionKind::TextInstruction,
        InterventionKind::VibrationOnly,
        InterventionKind::PauseSuggestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionKind::VideoInstruction => "video_instruction",
            InterventionKind::TextInstruction => "text_instruction",
            InterventionKind::VibrationOnly => "vibration_only",
            InterventionKind::PauseSuggestion => "pause_suggestion",
        }
    }
}

/// One adaptive intervention decided for an activity. Immutable after
/// construction; persisted and forwarded exactly once per emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub packet_id: String,
    pub activity_id: String,
    pub session_id: String,
    pub kind: InterventionKind,
    pub video_url: Option<String>,
    pub display_text: Option<String>,
    pub vibration_enabled: bool,
    pub metric_name: String,
    pub metric_value: f64,
    pub confidence: f64,
    pub duration_ms: u32,
    pub timestamp: DateTime<Utc>,
}

impl Intervention {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activity_id: &str,
        session_id: &str,
        kind: InterventionKind,
        video_url: Option<String>,
        display_text: Option<String>,
        vibration_enabled: bool,
        metric_name: &str,
        metric_value: f64,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        // A haptic-only nudge carries no media and always vibrates.
        let (video_url, display_text, vibration_enabled) = match kind {
            InterventionKind::VibrationOnly => (None, None, true),
            _ => (video_url, display_text, vibration_enabled),
        };

        Self {
            packet_id: format!("int_{}", Uuid::new_v4()),
            activity_id: activity_id.to_string(),
            session_id: session_id.to_string(),
            kind,
            video_url,
            display_text,
            vibration_enabled,
            metric_name: metric_name.to_string(),
            metric_value,
            confidence,
            duration_ms: INTERVENTION_DURATION_MS,
            timestamp: now,
        }
    }

    /// Outbound packet in the shape the client expects: trigger payloads
    /// grouped under `triggers`, measurement context under `details`.
    pub fn to_wire(&self) -> serde_json::Value {
        json!({
            "packet_id": self.packet_id,
            "timestamp": self.timestamp.to_rfc3339(),
            "type": "intervention",
            "intervention_type": self.kind.as_str(),
            "triggers": {
                "video_url": self.video_url,
                "display_text": self.display_text,
                "vibration_enabled": self.vibration_enabled,
            },
            "details": {
                "metric_name": self.metric_name,
                "value": self.metric_value,
                "confidence": self.confidence,
                "duration_ms": self.duration_ms,
            },
        })
    }
}
