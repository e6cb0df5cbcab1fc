use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChangeCause, Mode, Phase, SignalId, SignalStatus},
    error::ApiError,
};

/// Point-in-time copy of one signal as served to viewers and stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub id: SignalId,
    pub name: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phase: Phase,
    pub time_remaining: u32,
    pub mode: Mode,
    pub status: SignalStatus,
    pub vehicle_count: u32,
    pub avg_wait_time: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub signal_id: SignalId,
    pub old_phase: Phase,
    pub new_phase: Phase,
    pub time_remaining: u32,
    pub mode: Mode,
    pub cause: ChangeCause,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeChange {
    pub signal_id: SignalId,
    pub old_mode: Mode,
    pub new_mode: Mode,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub maintenance: usize,
    pub auto: usize,
    pub manual: usize,
    pub emergency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub uptime_seconds: u64,
    pub signals: usize,
    pub connected_viewers: usize,
    pub tick_interval_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    StartUpdates,
    StopUpdates,
    SetMode {
        signal_id: SignalId,
        mode: String,
    },
    SetPhase {
        signal_id: SignalId,
        phase: String,
        #[serde(default)]
        time_remaining: Option<u32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SignalsUpdated { signals: Vec<SignalSnapshot> },
    PhaseChanged { change: PhaseChange },
    ModeChanged { change: ModeChange },
    SignalUpdated { signal: SignalSnapshot },
    Error(ApiError),
}

impl ServerEvent {
    /// Periodic snapshots can be paused per viewer; notifications cannot.
    pub fn is_periodic(&self) -> bool {
        matches!(self, ServerEvent::SignalsUpdated { .. })
    }
}
