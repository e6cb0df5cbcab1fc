use chrono::{DateTime, Utc};
use rand::Rng;
use shared::{
    domain::{ChangeCause, Mode, Phase, SignalId, SignalSite, SignalStatus},
    protocol::{ModeChange, PhaseChange, SignalSnapshot},
};

use crate::error::ControlError;

pub const GREEN_SECONDS: u32 = 45;
pub const EMERGENCY_GREEN_SECONDS: u32 = 90;
pub const YELLOW_SECONDS: u32 = 5;
pub const RED_SECONDS: u32 = 30;
/// Hold applied by a manual phase change when the operator gives no duration.
pub const MANUAL_HOLD_SECONDS: u32 = 60;

/// Next phase and its countdown once the current phase times out.
pub fn next_phase(phase: Phase, mode: Mode) -> (Phase, u32) {
    match phase {
        Phase::Green => (Phase::Yellow, YELLOW_SECONDS),
        Phase::Yellow => (Phase::Red, RED_SECONDS),
        Phase::Red if mode == Mode::Emergency => (Phase::Green, EMERGENCY_GREEN_SECONDS),
        Phase::Red => (Phase::Green, GREEN_SECONDS),
    }
}

/// One intersection's light. Phase, countdown and mode only change through
/// [`Signal::advance`], [`Signal::set_mode`] and [`Signal::set_phase`].
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    id: SignalId,
    site: SignalSite,
    phase: Phase,
    time_remaining: u32,
    mode: Mode,
    status: SignalStatus,
    vehicle_count: u32,
    avg_wait_time: u32,
    updated_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        id: impl Into<SignalId>,
        site: SignalSite,
        phase: Phase,
        time_remaining: u32,
        mode: Mode,
    ) -> Self {
        Self {
            id: id.into(),
            site,
            phase,
            time_remaining,
            mode,
            status: SignalStatus::Active,
            vehicle_count: 0,
            avg_wait_time: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: SignalStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_traffic(mut self, vehicle_count: u32, avg_wait_time: u32) -> Self {
        self.vehicle_count = vehicle_count;
        self.avg_wait_time = avg_wait_time;
        self
    }

    pub fn from_snapshot(snapshot: SignalSnapshot) -> Self {
        Self {
            id: snapshot.id,
            site: SignalSite {
                name: snapshot.name,
                location: snapshot.location,
                latitude: snapshot.latitude,
                longitude: snapshot.longitude,
            },
            phase: snapshot.phase,
            time_remaining: snapshot.time_remaining,
            mode: snapshot.mode,
            status: snapshot.status,
            vehicle_count: snapshot.vehicle_count,
            avg_wait_time: snapshot.avg_wait_time,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn id(&self) -> &SignalId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    pub fn vehicle_count(&self) -> u32 {
        self.vehicle_count
    }

    /// In service and counting down on its own.
    pub fn is_timer_driven(&self) -> bool {
        self.status == SignalStatus::Active && self.mode.runs_on_timer()
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            id: self.id.clone(),
            name: self.site.name.clone(),
            location: self.site.location.clone(),
            latitude: self.site.latitude,
            longitude: self.site.longitude,
            phase: self.phase,
            time_remaining: self.time_remaining,
            mode: self.mode,
            status: self.status,
            vehicle_count: self.vehicle_count,
            avg_wait_time: self.avg_wait_time,
            updated_at: self.updated_at,
        }
    }

    /// One tick of the countdown. Manual mode ignores ticks entirely.
    ///
    /// The countdown is decremented first; when the decremented value is 0
    /// the phase switches in the same tick and the countdown restarts from
    /// the transition table.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<PhaseChange> {
        if !self.mode.runs_on_timer() {
            return None;
        }

        self.updated_at = now;
        let remaining = self.time_remaining.saturating_sub(1);
        if remaining > 0 {
            self.time_remaining = remaining;
            return None;
        }

        let (new_phase, duration) = next_phase(self.phase, self.mode);
        Some(self.switch_to(new_phase, duration, ChangeCause::Timer, now))
    }

    pub fn set_mode(&mut self, mode: Mode, now: DateTime<Utc>) -> ModeChange {
        let old_mode = self.mode;
        self.mode = mode;
        self.updated_at = now;
        ModeChange {
            signal_id: self.id.clone(),
            old_mode,
            new_mode: mode,
            at: now,
        }
    }

    /// Operator override. Only valid in manual mode; `hold` defaults to
    /// [`MANUAL_HOLD_SECONDS`] and must be non-zero when given.
    pub fn set_phase(
        &mut self,
        phase: Phase,
        hold: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<PhaseChange, ControlError> {
        if self.mode != Mode::Manual {
            return Err(ControlError::PhaseChangeNotAllowed {
                id: self.id.clone(),
                mode: self.mode,
            });
        }
        let duration = match hold {
            Some(0) => return Err(ControlError::InvalidDuration),
            Some(seconds) => seconds,
            None => MANUAL_HOLD_SECONDS,
        };
        Ok(self.switch_to(phase, duration, ChangeCause::Manual, now))
    }

    pub fn set_status(&mut self, status: SignalStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Random walk of the informational vehicle counter, floored at zero.
    pub fn drift_vehicle_count<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if rng.gen_bool(0.5) {
            self.vehicle_count = self.vehicle_count.saturating_add(1);
        } else {
            self.vehicle_count = self.vehicle_count.saturating_sub(1);
        }
    }

    fn switch_to(
        &mut self,
        new_phase: Phase,
        duration: u32,
        cause: ChangeCause,
        now: DateTime<Utc>,
    ) -> PhaseChange {
        let old_phase = self.phase;
        self.phase = new_phase;
        self.time_remaining = duration;
        self.updated_at = now;
        PhaseChange {
            signal_id: self.id.clone(),
            old_phase,
            new_phase,
            time_remaining: duration,
            mode: self.mode,
            cause,
            at: now,
        }
    }
}

#[cfg(test)]
#[path = "tests/signal_tests.rs"]
mod tests;
