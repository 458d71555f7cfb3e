use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emotion classes emitted by the capture client's FER model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    /// No classification available for the frame.
    #[serde(rename = "N/A")]
    Unknown,
}

impl Emotion {
    pub fn parse(value: &str) -> Emotion {
        match value {
            "Angry" => Emotion::Angry,
            "Disgust" => Emotion::Disgust,
            "Fear" => Emotion::Fear,
            "Happy" => Emotion::Happy,
            "Sad" => Emotion::Sad,
            "Surprise" => Emotion::Surprise,
            "Neutral" => Emotion::Neutral,
            _ => Emotion::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
            Emotion::Unknown => "N/A",
        }
    }
}

/// One analyzed frame of biometric and affect signals.
/// Immutable once constructed; produced at the transport boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp: DateTime<Utc>,
    pub emotion: Emotion,
    pub confidence: f64,
    pub ear: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub looking_at_screen: bool,
    pub face_detected: bool,
    /// Open-set label from the cognitive-state model; "unknown" when absent.
    pub cognitive_state: String,
}

// Inbound payload schema as produced by the capture client. Field names are
// fixed by that client's wire contract; everything defaults so a sparse or
// malformed frame degrades to neutral values instead of failing the stream.
#[derive(Debug, Default, Deserialize)]
struct FramePayload {
    #[serde(default, rename = "analisis_sentimiento")]
    sentiment: SentimentSection,
    #[serde(default, rename = "datos_biometricos")]
    biometrics: BiometricsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SentimentSection {
    #[serde(default, rename = "emocion_principal")]
    primary_emotion: PrimaryEmotion,
}

#[derive(Debug, Default, Deserialize)]
struct PrimaryEmotion {
    #[serde(default, rename = "nombre")]
    name: String,
    #[serde(default, rename = "confianza")]
    confidence: f64,
    #[serde(default, rename = "estado_cognitivo")]
    cognitive_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BiometricsSection {
    #[serde(default, rename = "rostro_detectado")]
    face_detected: bool,
    #[serde(default, rename = "atencion")]
    attention: AttentionSection,
    #[serde(default, rename = "somnolencia")]
    drowsiness: DrowsinessSection,
}

#[derive(Debug, Default, Deserialize)]
struct AttentionSection {
    #[serde(default, rename = "mirando_pantalla")]
    looking_at_screen: bool,
    #[serde(default, rename = "orientacion_cabeza")]
    head_pose: HeadPose,
}

#[derive(Debug, Default, Deserialize)]
struct HeadPose {
    #[serde(default)]
    pitch: f64,
    #[serde(default)]
    yaw: f64,
}

#[derive(Debug, Default, Deserialize)]
struct DrowsinessSection {
    #[serde(default, rename = "apertura_ojos_ear")]
    ear: f64,
}

impl Frame {
    /// Lenient parse of a raw frame payload. Never fails: missing or
    /// malformed fields fall back to neutral values (unknown emotion,
    /// confidence 0, no face).
    pub fn from_payload(payload: &serde_json::Value, now: DateTime<Utc>) -> Frame {
        let parsed: FramePayload =
            serde_json::from_value(payload.clone()).unwrap_or_default();

        Frame {
            timestamp: now,
            emotion: Emotion::parse(&parsed.sentiment.primary_emotion.name),
            confidence: parsed.sentiment.primary_emotion.confidence,
            ear: parsed.biometrics.drowsiness.ear,
            pitch: parsed.biometrics.attention.head_pose.pitch,
            yaw: parsed.biometrics.attention.head_pose.yaw,
            looking_at_screen: parsed.biometrics.attention.looking_at_screen,
            face_detected: parsed.biometrics.face_detected,
            cognitive_state: parsed
                .sentiment
                .primary_emotion
                .cognitive_state
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_full_payload() {
        let payload = json!({
            "analisis_sentimiento": {
                "emocion_principal": {
                    "nombre": "Angry",
                    "confianza": 0.92,
                    "estado_cognitivo": "overloaded"
                }
            },
            "datos_biometricos": {
                "rostro_detectado": true,
                "atencion": {
                    "mirando_pantalla": false,
                    "orientacion_cabeza": { "pitch": -4.5, "yaw": 12.0 }
                },
                "somnolencia": { "apertura_ojos_ear": 0.31 }
            }
        });

        let now = Utc::now();
        let frame = Frame::from_payload(&payload, now);

        assert_eq!(frame.emotion, Emotion::Angry);
        assert_eq!(frame.confidence, 0.92);
        assert_eq!(frame.ear, 0.31);
        assert_eq!(frame.pitch, -4.5);
        assert_eq!(frame.yaw, 12.0);
        assert!(!frame.looking_at_screen);
        assert!(frame.face_detected);
        assert_eq!(frame.cognitive_state, "overloaded");
        assert_eq!(frame.timestamp, now);
    }

    #[test]
    fn missing_fields_default_to_neutral_values() {
        let frame = Frame::from_payload(&json!({}), Utc::now());

        assert_eq!(frame.emotion, Emotion::Unknown);
        assert_eq!(frame.confidence, 0.0);
        assert_eq!(frame.ear, 0.0);
        assert!(!frame.face_detected);
        assert!(!frame.looking_at_screen);
        assert_eq!(frame.cognitive_state, "unknown");
    }

    #[test]
    fn non_object_payload_does_not_panic() {
        let frame = Frame::from_payload(&json!("garbage"), Utc::now());
        assert_eq!(frame.emotion, Emotion::Unknown);
    }

    #[test]
    fn unknown_emotion_name_maps_to_na() {
        assert_eq!(Emotion::parse("Confused"), Emotion::Unknown);
        assert_eq!(Emotion::Unknown.as_str(), "N/A");
    }
}
