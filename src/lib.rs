//! Real-time adaptive intervention engine for monitored learning
//! activities. Ingests per-frame biometric and affect signals, detects
//! sustained distraction, drowsiness, and frustration, and decides when to
//! nudge the learner with a vibration, an instructional aid, or a pause
//! suggestion. Each live activity runs on its own worker task.

pub mod activity;
pub mod cluster;
pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod transport;

pub use config::{EngineConfig, Thresholds};
pub use db::Database;
pub use engine::MonitorEngine;
pub use models::{Frame, Intervention, InterventionKind, MinuteSummary};
