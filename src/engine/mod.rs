//! Activity orchestration: one worker task per live activity, addressed by
//! activity id. The engine owns the registry; workers own their state.

mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityState;
use crate::config::{EngineConfig, Thresholds};
use crate::db::Database;
use crate::models::{ActivityEvent, Intervention, LifecycleMessage};

pub use worker::ActivityCommand;

/// Command backlog per activity. Frames beyond this are dropped, which is
/// acceptable for a sampled signal.
const COMMAND_BUFFER: usize = 256;

struct ActivityHandle {
    commands: mpsc::Sender<ActivityCommand>,
    cancel_token: CancellationToken,
    join: JoinHandle<()>,
}

struct EngineInner {
    config: EngineConfig,
    db: Database,
    outbound: mpsc::Sender<Intervention>,
    activities: Mutex<HashMap<String, ActivityHandle>>,
}

/// Shared handle to the monitoring engine. Cheap to clone; all clones
/// address the same activity registry.
#[derive(Clone)]
pub struct MonitorEngine {
    inner: Arc<EngineInner>,
}

impl MonitorEngine {
    pub fn new(
        config: EngineConfig,
        db: Database,
        outbound: mpsc::Sender<Intervention>,
    ) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                db,
                outbound,
                activities: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Spawns a worker for the activity. A cluster label selects the user's
    /// sensitivity profile; unknown or absent labels use the defaults. An
    /// existing worker for the same id is replaced.
    pub async fn initialize_activity(
        &self,
        activity_id: &str,
        session_id: &str,
        user_cluster: Option<&str>,
    ) {
        let thresholds = user_cluster
            .and_then(Thresholds::for_cluster)
            .unwrap_or_else(|| self.inner.config.thresholds.clone());

        let state = ActivityState::new(
            activity_id,
            session_id,
            thresholds,
            self.inner.config.frame_capacity,
            Utc::now(),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel_token = CancellationToken::new();
        let join = tokio::spawn(worker::run_activity_worker(
            state,
            self.inner.config.clone(),
            self.inner.db.clone(),
            self.inner.outbound.clone(),
            command_rx,
            cancel_token.clone(),
        ));

        let handle = ActivityHandle {
            commands: command_tx,
            cancel_token,
            join,
        };

        let mut activities = self.inner.activities.lock().await;
        if let Some(previous) = activities.insert(activity_id.to_string(), handle) {
            warn!("activity {activity_id} re-initialized, replacing existing worker");
            previous.cancel_token.cancel();
        }
        info!(
            "activity {activity_id} initialized (session {session_id}, cluster {})",
            user_cluster.unwrap_or("default")
        );
    }

    /// Routes a raw frame payload to the activity's worker. Frames for
    /// unknown activities and frames beyond the backlog are dropped.
    pub async fn process_frame(&self, activity_id: &str, payload: serde_json::Value) {
        let activities = self.inner.activities.lock().await;
        let Some(handle) = activities.get(activity_id) else {
            return;
        };
        if let Err(err) = handle.commands.try_send(ActivityCommand::Frame(payload)) {
            warn!("dropping frame for activity {activity_id}: {err}");
        }
    }

    pub async fn pause_activity(&self, activity_id: &str) {
        self.send_command(activity_id, ActivityCommand::Pause).await;
    }

    pub async fn resume_activity(&self, activity_id: &str) {
        self.send_command(activity_id, ActivityCommand::Resume).await;
    }

    /// Stops the activity's worker and waits for its final summary.
    pub async fn finalize_activity(&self, activity_id: &str) {
        let handle = {
            let mut activities = self.inner.activities.lock().await;
            activities.remove(activity_id)
        };

        let Some(handle) = handle else {
            warn!("finalize for unknown activity {activity_id}");
            return;
        };

        handle.cancel_token.cancel();
        if let Err(err) = handle.join.await {
            warn!("activity worker {activity_id} failed to join: {err}");
        }
        info!("activity {activity_id} finalized");
    }

    /// Dispatches a lifecycle message by routing key. Unknown keys and
    /// messages without an activity id are logged and ignored.
    pub async fn handle_lifecycle_event(
        &self,
        routing_key: &str,
        payload: &serde_json::Value,
    ) {
        let Some(event) = ActivityEvent::from_routing_key(routing_key) else {
            warn!("ignoring lifecycle message with unknown routing key {routing_key}");
            return;
        };

        let message: LifecycleMessage = match serde_json::from_value(payload.clone()) {
            Ok(message) => message,
            Err(err) => {
                warn!("malformed lifecycle payload for {routing_key}: {err}");
                return;
            }
        };

        let Some(activity_id) = message.activity_uuid else {
            warn!("lifecycle message {routing_key} without activity id");
            return;
        };

        match event {
            ActivityEvent::Paused => self.pause_activity(&activity_id).await,
            ActivityEvent::Resumed => self.resume_activity(&activity_id).await,
            ActivityEvent::Completed | ActivityEvent::Abandoned => {
                self.finalize_activity(&activity_id).await
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.inner.activities.lock().await.len()
    }

    /// Cancels every worker and waits for each to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, ActivityHandle)> = {
            let mut activities = self.inner.activities.lock().await;
            activities.drain().collect()
        };

        for (activity_id, handle) in handles {
            handle.cancel_token.cancel();
            if let Err(err) = handle.join.await {
                warn!("activity worker {activity_id} failed to join: {err}");
            }
        }
        info!("monitor engine shut down");
    }

    async fn send_command(&self, activity_id: &str, command: ActivityCommand) {
        let activities = self.inner.activities.lock().await;
        let Some(handle) = activities.get(activity_id) else {
            warn!("command for unknown activity {activity_id}");
            return;
        };
        if handle.commands.send(command).await.is_err() {
            warn!("worker for activity {activity_id} is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterventionKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn no_face_frame() -> serde_json::Value {
        json!({
            "analisis_sentimiento": {
                "emocion_principal": { "nombre": "N/A", "confianza": 0.0 }
            },
            "datos_biometricos": {
                "rostro_detectado": false,
                "atencion": {
                    "mirando_pantalla": false,
                    "orientacion_cabeza": { "pitch": 0.0, "yaw": 0.0 }
                },
                "somnolencia": { "apertura_ojos_ear": 0.0 }
            }
        })
    }

    fn make_engine() -> (MonitorEngine, mpsc::Receiver<Intervention>) {
        let db = Database::new(PathBuf::from(":memory:")).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let engine = MonitorEngine::new(EngineConfig::default(), db, tx).unwrap();
        (engine, rx)
    }

    #[tokio::test]
    async fn initialize_and_finalize_lifecycle() {
        let (engine, _rx) = make_engine();

        engine.initialize_activity("act-1", "sess-1", None).await;
        engine.initialize_activity("act-2", "sess-1", Some("resilient")).await;
        assert_eq!(engine.active_count().await, 2);

        engine.finalize_activity("act-1").await;
        assert_eq!(engine.active_count().await, 1);

        engine.shutdown().await;
        assert_eq!(engine.active_count().await, 0);
    }

    #[tokio::test]
    async fn camera_setup_nudge_reaches_outbound_channel() {
        let (engine, mut rx) = make_engine();
        engine.initialize_activity("act-1", "sess-1", None).await;

        for _ in 0..150 {
            engine.process_frame("act-1", no_face_frame()).await;
        }

        let intervention = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for intervention")
            .expect("channel closed");
        assert_eq!(intervention.kind, InterventionKind::VibrationOnly);
        assert_eq!(intervention.metric_name, "camera_setup");
        assert!(intervention.vibration_enabled);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn paused_activity_ignores_frames() {
        let (engine, mut rx) = make_engine();
        engine.initialize_activity("act-1", "sess-1", None).await;
        engine.pause_activity("act-1").await;

        for _ in 0..150 {
            engine.process_frame("act-1", no_face_frame()).await;
        }

        // Give the worker a moment; nothing should come through.
        let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn lifecycle_events_dispatch_by_routing_key() {
        let (engine, _rx) = make_engine();
        engine.initialize_activity("act-1", "sess-1", None).await;

        let payload = json!({ "activity_uuid": "act-1", "session_id": "sess-1" });
        engine.handle_lifecycle_event("activity.paused", &payload).await;
        engine.handle_lifecycle_event("activity.resumed", &payload).await;
        assert_eq!(engine.active_count().await, 1);

        engine.handle_lifecycle_event("activity.completed", &payload).await;
        assert_eq!(engine.active_count().await, 0);

        // Unknown keys are ignored without effect.
        engine.handle_lifecycle_event("activity.exploded", &payload).await;

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn frames_for_unknown_activities_are_dropped() {
        let (engine, mut rx) = make_engine();

        for _ in 0..150 {
            engine.process_frame("ghost", no_face_frame()).await;
        }
        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err());
    }
}
