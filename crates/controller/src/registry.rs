use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use shared::{
    domain::{Mode, Phase, SignalId, SignalStatus},
    protocol::{ModeChange, PhaseChange, SignalSnapshot, SignalStats},
};

use crate::{error::ControlError, signal::Signal};

/// Every signal tracked by the process, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct SignalRegistry {
    signals: BTreeMap<SignalId, Signal>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a signal, returning the one it replaced.
    pub fn insert(&mut self, signal: Signal) -> Option<Signal> {
        self.signals.insert(signal.id().clone(), signal)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn contains(&self, id: &SignalId) -> bool {
        self.signals.contains_key(id)
    }

    pub fn get(&self, id: &SignalId) -> Option<SignalSnapshot> {
        self.signals.get(id).map(Signal::snapshot)
    }

    pub fn list(&self) -> Vec<SignalSnapshot> {
        self.signals.values().map(Signal::snapshot).collect()
    }

    pub fn set_mode(
        &mut self,
        id: &SignalId,
        mode: Mode,
        now: DateTime<Utc>,
    ) -> Result<ModeChange, ControlError> {
        Ok(self.signal_mut(id)?.set_mode(mode, now))
    }

    pub fn set_phase(
        &mut self,
        id: &SignalId,
        phase: Phase,
        hold: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<PhaseChange, ControlError> {
        self.signal_mut(id)?.set_phase(phase, hold, now)
    }

    pub fn set_status(
        &mut self,
        id: &SignalId,
        status: SignalStatus,
        now: DateTime<Utc>,
    ) -> Result<SignalSnapshot, ControlError> {
        let signal = self.signal_mut(id)?;
        signal.set_status(status, now);
        Ok(signal.snapshot())
    }

    /// Advances every in-service signal by one tick. Signals that are
    /// inactive or under maintenance keep their state.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<PhaseChange> {
        self.signals
            .values_mut()
            .filter(|signal| signal.status() == SignalStatus::Active)
            .filter_map(|signal| signal.advance(now))
            .collect()
    }

    /// Simulated traffic only moves at lights that are running on their
    /// timer. Manual and out-of-service lights keep their counters.
    pub fn drift_vehicle_counts<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for signal in self.signals.values_mut().filter(|s| s.is_timer_driven()) {
            signal.drift_vehicle_count(rng);
        }
    }

    pub fn stats(&self) -> SignalStats {
        self.signals
            .values()
            .fold(SignalStats::default(), |mut stats, signal| {
                stats.total += 1;
                match signal.status() {
                    SignalStatus::Active => stats.active += 1,
                    SignalStatus::Inactive => stats.inactive += 1,
                    SignalStatus::Maintenance => stats.maintenance += 1,
                }
                match signal.mode() {
                    Mode::Auto => stats.auto += 1,
                    Mode::Manual => stats.manual += 1,
                    Mode::Emergency => stats.emergency += 1,
                }
                stats
            })
    }

    fn signal_mut(&mut self, id: &SignalId) -> Result<&mut Signal, ControlError> {
        self.signals
            .get_mut(id)
            .ok_or_else(|| ControlError::UnknownSignalId(id.clone()))
    }
}

impl FromIterator<Signal> for SignalRegistry {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        let mut registry = Self::new();
        for signal in iter {
            registry.insert(signal);
        }
        registry
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
