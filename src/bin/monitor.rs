//! Line-oriented runner: reads capture-stream messages from stdin (one JSON
//! document per line) and writes intervention packets and control replies to
//! stdout. Useful for local testing and for driving the engine from a shell
//! pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

use attentiva::cluster::ClusterClient;
use attentiva::transport::StreamSession;
use attentiva::{Database, EngineConfig, MonitorEngine};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db_path = std::env::var("ATTENTIVA_DB").unwrap_or_else(|_| "attentiva.db".to_string());
    let db = Database::new(PathBuf::from(db_path)).context("failed to open database")?;

    let cluster = match std::env::var("ATTENTIVA_ANALYTICS_URL") {
        Ok(url) => Some(ClusterClient::new(&url).context("invalid analytics URL")?),
        Err(_) => None,
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
    let engine = MonitorEngine::new(EngineConfig::default(), db, outbound_tx)?;

    let printer = tokio::spawn(async move {
        while let Some(intervention) = outbound_rx.recv().await {
            match serde_json::to_string(&intervention.to_wire()) {
                Ok(line) => println!("{line}"),
                Err(err) => error!("failed to serialize intervention: {err}"),
            }
        }
    });

    let activity_id = format!("act_{}", Uuid::new_v4());
    let session_id = format!("sess_{}", Uuid::new_v4());
    let session = StreamSession::new(engine.clone(), cluster, &activity_id, &session_id);
    info!("monitor ready (activity {activity_id})");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("stdin read failed")? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(reply) = session.handle_text(&line).await {
            match serde_json::to_string(&reply) {
                Ok(text) => println!("{text}"),
                Err(err) => error!("failed to serialize reply: {err}"),
            }
        }
    }

    info!("stream closed, finalizing");
    session.close().await;
    engine.shutdown().await;
    drop(printer);

    Ok(())
}
