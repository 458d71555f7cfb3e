use anyhow::{bail, Result};
use std::time::Duration;

/// Default instruction video shown by video interventions when no
/// activity-specific media has been authored.
pub const DEFAULT_INSTRUCTION_VIDEO_URL: &str =
    "https://res.cloudinary.com/doeofn1nd/video/upload/v1752085607/samples/elephants.mp4";

/// Per-user sensitivity thresholds for the decision engine. Defaults apply
/// when the behavioral classifier has no cluster for the user; a cluster
/// label swaps in one of the named profiles below.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Mean Angry confidence (trailing 50 frames) treated as extreme frustration.
    pub frustration_threshold: f64,
    /// Distraction events in the trailing 2 minutes before a vibration fires.
    pub distraction_threshold: u32,
    /// Drowsiness events in the trailing 2 minutes before a vibration fires.
    pub drowsiness_threshold: u32,
    /// Elapsed minutes after which a pause is suggested unconditionally.
    pub pause_time_minutes: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            frustration_threshold: 0.90,
            distraction_threshold: 3,
            drowsiness_threshold: 2,
            pause_time_minutes: 40,
        }
    }
}

impl Thresholds {
    /// Profile for a behavioral cluster label, or None for unrecognized
    /// labels (callers fall back to defaults).
    pub fn for_cluster(label: &str) -> Option<Thresholds> {
        match label {
            // Sustains long sessions well; intervene later and less.
            "resilient" => Some(Thresholds {
                frustration_threshold: 0.93,
                distraction_threshold: 4,
                drowsiness_threshold: 3,
                pause_time_minutes: 50,
            }),
            "steady" => Some(Thresholds::default()),
            // Abandons quickly under frustration; intervene earlier.
            "easily_frustrated" => Some(Thresholds {
                frustration_threshold: 0.85,
                distraction_threshold: 3,
                drowsiness_threshold: 2,
                pause_time_minutes: 30,
            }),
            "distractible" => Some(Thresholds {
                frustration_threshold: 0.90,
                distraction_threshold: 2,
                drowsiness_threshold: 2,
                pause_time_minutes: 35,
            }),
            "fatigue_prone" => Some(Thresholds {
                frustration_threshold: 0.90,
                distraction_threshold: 3,
                drowsiness_threshold: 1,
                pause_time_minutes: 30,
            }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frustration_threshold > 0.0 && self.frustration_threshold <= 1.0) {
            bail!(
                "frustration_threshold must be in (0, 1], got {}",
                self.frustration_threshold
            );
        }
        if self.distraction_threshold == 0 || self.drowsiness_threshold == 0 {
            bail!("distraction/drowsiness thresholds must be at least 1");
        }
        if self.pause_time_minutes <= 0 {
            bail!(
                "pause_time_minutes must be positive, got {}",
                self.pause_time_minutes
            );
        }
        Ok(())
    }
}

/// Engine-wide tunables. Intervals and cooldowns are configurable mainly so
/// tests can compress time; production uses the defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ring-buffer capacity for per-activity frame history.
    pub frame_capacity: usize,
    /// Period of the per-activity minute-summary ticker.
    pub summary_interval: Duration,
    /// Initial window during which only the camera-setup nudge may fire.
    pub grace_period_minutes: i64,
    /// Minimum seconds between any two interventions for one activity.
    pub global_cooldown_secs: i64,
    pub pause_cooldown_minutes: i64,
    pub video_cooldown_minutes: i64,
    pub text_cooldown_minutes: i64,
    pub vibration_cooldown_minutes: i64,
    /// Cooldown for the grace-period camera-setup nudge.
    pub camera_setup_cooldown_minutes: i64,
    /// Seconds a sustained-anger run must persist before the frustration
    /// cascade is considered.
    pub frustration_hold_secs: i64,
    pub instruction_video_url: String,
    /// Default thresholds; replaced per activity by a cluster profile.
    pub thresholds: Thresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_capacity: 300,
            summary_interval: Duration::from_secs(60),
            grace_period_minutes: 3,
            global_cooldown_secs: 180,
            pause_cooldown_minutes: 10,
            video_cooldown_minutes: 5,
            text_cooldown_minutes: 5,
            vibration_cooldown_minutes: 2,
            camera_setup_cooldown_minutes: 10,
            frustration_hold_secs: 20,
            instruction_video_url: DEFAULT_INSTRUCTION_VIDEO_URL.to_string(),
            thresholds: Thresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_capacity == 0 {
            bail!("frame_capacity must be at least 1");
        }
        if self.summary_interval.is_zero() {
            bail!("summary_interval must be non-zero");
        }
        if self.global_cooldown_secs < 0 || self.grace_period_minutes < 0 {
            bail!("cooldown and grace period must be non-negative");
        }
        self.thresholds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn cluster_profiles_resolve_and_validate() {
        for label in [
            "resilient",
            "steady",
            "easily_frustrated",
            "distractible",
            "fatigue_prone",
        ] {
            let profile = Thresholds::for_cluster(label).unwrap();
            profile.validate().unwrap();
        }
    }

    #[test]
    fn unknown_cluster_falls_back_to_none() {
        assert_eq!(Thresholds::for_cluster("night_owl"), None);
        assert_eq!(Thresholds::for_cluster(""), None);
    }

    #[test]
    fn invalid_thresholds_fail_fast() {
        let bad = Thresholds {
            frustration_threshold: 1.5,
            ..Thresholds::default()
        };
        assert!(bad.validate().is_err());

        let bad = Thresholds {
            pause_time_minutes: 0,
            ..Thresholds::default()
        };
        assert!(bad.validate().is_err());

        let bad = Thresholds {
            distraction_threshold: 0,
            ..Thresholds::default()
        };
        assert!(bad.validate().is_err());
    }
}
