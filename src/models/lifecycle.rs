use serde::Deserialize;

/// Activity lifecycle transitions propagated from the session system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    Paused,
    Resumed,
    Completed,
    Abandoned,
}

impl ActivityEvent {
    /// Maps a bus routing key to a lifecycle event. Unknown keys return
    /// None and are ignored by the engine.
    pub fn from_routing_key(key: &str) -> Option<ActivityEvent> {
        match key {
            "activity.paused" => Some(ActivityEvent::Paused),
            "activity.resumed" => Some(ActivityEvent::Resumed),
            "activity.completed" => Some(ActivityEvent::Completed),
            "activity.abandoned" => Some(ActivityEvent::Abandoned),
            _ => None,
        }
    }
}

/// Body of a lifecycle message from the session system.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleMessage {
    pub activity_uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
}
