use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::activity::{build_minute_summary, evaluate, observe_frame, ActivityState};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::models::{Frame, Intervention};

/// Commands delivered to one activity's worker task.
#[derive(Debug)]
pub enum ActivityCommand {
    /// Raw frame payload as received from the capture client.
    Frame(serde_json::Value),
    Pause,
    Resume,
}

/// Owns one activity's state for its whole lifetime. Frames and lifecycle
/// changes arrive over the command channel; a ticker drives the per-minute
/// summaries; cancellation ends the loop after a final summary.
pub async fn run_activity_worker(
    mut state: ActivityState,
    config: EngineConfig,
    db: Database,
    outbound: mpsc::Sender<Intervention>,
    mut commands: mpsc::Receiver<ActivityCommand>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + config.summary_interval,
        config.summary_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ActivityCommand::Frame(payload)) => {
                        if state.is_paused {
                            continue;
                        }
                        let now = Utc::now();
                        let frame = Frame::from_payload(&payload, now);
                        state.push_frame(frame.clone());
                        observe_frame(&mut state, &frame, now);

                        if let Some(intervention) = evaluate(&mut state, &config, now) {
                            info!(
                                "intervention {} ({}) for activity {}",
                                intervention.kind.as_str(),
                                intervention.metric_name,
                                state.activity_id
                            );
                            persist_intervention(&db, &intervention);
                            if let Err(err) = outbound.send(intervention).await {
                                error!(
                                    "outbound channel closed, dropping intervention for activity {}: {err}",
                                    state.activity_id
                                );
                            }
                        }
                    }
                    Some(ActivityCommand::Pause) => {
                        info!("activity {} paused", state.activity_id);
                        state.is_paused = true;
                    }
                    Some(ActivityCommand::Resume) => {
                        info!("activity {} resumed", state.activity_id);
                        state.is_paused = false;
                        state.reset_cooldowns();
                    }
                    None => {
                        warn!("command channel closed for activity {}", state.activity_id);
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if state.is_paused {
                    continue;
                }
                if let Some(summary) = build_minute_summary(&state, Utc::now()) {
                    persist_summary(&db, summary);
                }
            }
            _ = cancel_token.cancelled() => {
                info!("activity worker {} shutting down", state.activity_id);
                break;
            }
        }
    }

    // Final rollup covers the partial minute, even when paused.
    if let Some(summary) = build_minute_summary(&state, Utc::now()) {
        if let Err(err) = db.insert_minute_summary(&summary).await {
            error!(
                "failed to persist final summary for activity {}: {err:?}",
                state.activity_id
            );
        }
    }
}

/// Persistence is fire-and-forget: a storage failure must never delay the
/// frame path.
fn persist_intervention(db: &Database, intervention: &Intervention) {
    let db = db.clone();
    let record = intervention.clone();
    tokio::spawn(async move {
        if let Err(err) = db.insert_intervention(&record).await {
            error!("failed to persist intervention {}: {err:?}", record.packet_id);
        }
    });
}

fn persist_summary(db: &Database, summary: crate::models::MinuteSummary) {
    let db = db.clone();
    tokio::spawn(async move {
        if let Err(err) = db.insert_minute_summary(&summary).await {
            error!("failed to persist summary {}: {err:?}", summary.summary_id);
        }
    });
}
