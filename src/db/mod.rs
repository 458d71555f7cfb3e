use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::models::frame::Emotion;
use crate::models::{EngagementLevel, Intervention, InterventionKind, MinuteSummary};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn kind_from_str(value: &str) -> Result<InterventionKind> {
    match value {
        "video_instruction" => Ok(InterventionKind::VideoInstruction),
        "text_instruction" => Ok(InterventionKind::TextInstruction),
        "vibration_only" => Ok(InterventionKind::VibrationOnly),
        "pause_suggestion" => Ok(InterventionKind::PauseSuggestion),
        _ => Err(anyhow!("unknown intervention kind '{value}'")),
    }
}

fn engagement_from_str(value: &str) -> Result<EngagementLevel> {
    EngagementLevel::parse(value).ok_or_else(|| anyhow!("unknown engagement level '{value}'"))
}

/// Handle to the SQLite store. All access goes through a dedicated worker
/// thread owning the connection; async callers submit closures and await a
/// oneshot reply.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            // ":memory:" and bare filenames have an empty parent.
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("attentiva-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn insert_intervention(&self, intervention: &Intervention) -> Result<()> {
        let record = intervention.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO interventions (packet_id, activity_id, session_id, kind, video_url, display_text, vibration_enabled, metric_name, metric_value, confidence, duration_ms, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.packet_id,
                    record.activity_id,
                    record.session_id,
                    record.kind.as_str(),
                    record.video_url,
                    record.display_text,
                    record.vibration_enabled as i64,
                    record.metric_name,
                    record.metric_value,
                    record.confidence,
                    record.duration_ms as i64,
                    record.timestamp.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert intervention")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_minute_summary(&self, summary: &MinuteSummary) -> Result<()> {
        let record = summary.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO minute_summaries (summary_id, activity_id, session_id, minute_number, predominant_emotion, emotion_confidence_avg, ear_avg, pitch_avg, yaw_avg, looking_screen_pct, face_detected_pct, distraction_count, drowsiness_count, cognitive_state, engagement_level, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    record.summary_id,
                    record.activity_id,
                    record.session_id,
                    record.minute_number as i64,
                    record.predominant_emotion.as_str(),
                    record.emotion_confidence_avg,
                    record.ear_avg,
                    record.pitch_avg,
                    record.yaw_avg,
                    record.looking_screen_pct,
                    record.face_detected_pct,
                    record.distraction_count as i64,
                    record.drowsiness_count as i64,
                    record.cognitive_state,
                    record.engagement_level.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert minute summary")?;
            Ok(())
        })
        .await
    }

    pub async fn interventions_for_activity(
        &self,
        activity_id: &str,
    ) -> Result<Vec<Intervention>> {
        let activity_id = activity_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT packet_id, activity_id, session_id, kind, video_url, display_text, vibration_enabled, metric_name, metric_value, confidence, duration_ms, timestamp
                 FROM interventions
                 WHERE activity_id = ?1
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![activity_id])?;
            let mut interventions = Vec::new();
            while let Some(row) = rows.next()? {
                interventions.push(Intervention {
                    packet_id: row.get(0)?,
                    activity_id: row.get(1)?,
                    session_id: row.get(2)?,
                    kind: kind_from_str(&row.get::<_, String>(3)?)?,
                    video_url: row.get(4)?,
                    display_text: row.get(5)?,
                    vibration_enabled: row.get::<_, i64>(6)? != 0,
                    metric_name: row.get(7)?,
                    metric_value: row.get(8)?,
                    confidence: row.get(9)?,
                    duration_ms: row.get::<_, i64>(10)? as u32,
                    timestamp: parse_datetime(&row.get::<_, String>(11)?)?,
                });
            }

            Ok(interventions)
        })
        .await
    }

    pub async fn summaries_for_activity(
        &self,
        activity_id: &str,
    ) -> Result<Vec<MinuteSummary>> {
        let activity_id = activity_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT summary_id, activity_id, session_id, minute_number, predominant_emotion, emotion_confidence_avg, ear_avg, pitch_avg, yaw_avg, looking_screen_pct, face_detected_pct, distraction_count, drowsiness_count, cognitive_state, engagement_level, created_at
                 FROM minute_summaries
                 WHERE activity_id = ?1
                 ORDER BY minute_number ASC",
            )?;

            let mut rows = stmt.query(params![activity_id])?;
            let mut summaries = Vec::new();
            while let Some(row) = rows.next()? {
                summaries.push(MinuteSummary {
                    summary_id: row.get(0)?,
                    activity_id: row.get(1)?,
                    session_id: row.get(2)?,
                    minute_number: row.get::<_, i64>(3)? as u32,
                    predominant_emotion: Emotion::parse(&row.get::<_, String>(4)?),
                    emotion_confidence_avg: row.get(5)?,
                    ear_avg: row.get(6)?,
                    pitch_avg: row.get(7)?,
                    yaw_avg: row.get(8)?,
                    looking_screen_pct: row.get(9)?,
                    face_detected_pct: row.get(10)?,
                    distraction_count: row.get::<_, i64>(11)? as u32,
                    drowsiness_count: row.get::<_, i64>(12)? as u32,
                    cognitive_state: row.get(13)?,
                    engagement_level: engagement_from_str(&row.get::<_, String>(14)?)?,
                    created_at: parse_datetime(&row.get::<_, String>(15)?)?,
                });
            }

            Ok(summaries)
        })
        .await
    }
}
