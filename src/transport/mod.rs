//! Message classification and session handling for the capture stream.
//!
//! One stream carries three inbound message types: a handshake that binds
//! the stream to a user and activity, keepalive pings, and frame payloads.
//! Anything without a recognized `type` is treated as a frame, since the
//! capture client omits the field on its data packets.

use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value};

use crate::cluster::ClusterClient;
use crate::engine::MonitorEngine;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Handshake {
        user_id: Option<i64>,
        external_activity_id: Option<i64>,
    },
    Ping,
    Frame(Value),
}

impl InboundMessage {
    pub fn parse(raw: &str) -> anyhow::Result<InboundMessage> {
        let value: Value = serde_json::from_str(raw)?;
        match value.get("type").and_then(Value::as_str) {
            Some("handshake") => Ok(InboundMessage::Handshake {
                user_id: value.get("user_id").and_then(Value::as_i64),
                external_activity_id: value.get("activity_id").and_then(Value::as_i64),
            }),
            Some("ping") => Ok(InboundMessage::Ping),
            _ => Ok(InboundMessage::Frame(value)),
        }
    }
}

pub fn handshake_ack(activity_id: &str, session_id: &str) -> Value {
    json!({
        "type": "handshake_ack",
        "status": "ok",
        "activity_id": activity_id,
        "session_id": session_id,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

pub fn pong() -> Value {
    json!({ "type": "pong", "timestamp": Utc::now().to_rfc3339() })
}

/// One capture stream bound to one activity. Routes inbound text to the
/// engine and produces the control replies the client expects.
pub struct StreamSession {
    engine: MonitorEngine,
    cluster: Option<ClusterClient>,
    activity_id: String,
    session_id: String,
}

impl StreamSession {
    pub fn new(
        engine: MonitorEngine,
        cluster: Option<ClusterClient>,
        activity_id: &str,
        session_id: &str,
    ) -> Self {
        Self {
            engine,
            cluster,
            activity_id: activity_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    /// Handles one inbound text message. Returns the reply to send back,
    /// if the message calls for one. Malformed input is logged and dropped;
    /// a bad message must not tear down the stream.
    pub async fn handle_text(&self, raw: &str) -> Option<Value> {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!("unparseable message on activity {}: {err}", self.activity_id);
                return None;
            }
        };

        match message {
            InboundMessage::Handshake { user_id, .. } => {
                let cluster_label = match (user_id, &self.cluster) {
                    (Some(user_id), Some(client)) => client.get_user_cluster(user_id).await,
                    _ => None,
                };
                self.engine
                    .initialize_activity(
                        &self.activity_id,
                        &self.session_id,
                        cluster_label.as_deref(),
                    )
                    .await;
                info!("handshake complete for activity {}", self.activity_id);
                Some(handshake_ack(&self.activity_id, &self.session_id))
            }
            InboundMessage::Ping => Some(pong()),
            InboundMessage::Frame(payload) => {
                self.engine.process_frame(&self.activity_id, payload).await;
                None
            }
        }
    }

    /// Finalizes the activity when the stream closes.
    pub async fn close(&self) {
        self.engine.finalize_activity(&self.activity_id).await;
    }
}
