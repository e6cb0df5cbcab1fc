use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use shared::{
    domain::{Mode, Phase, SignalId, SignalStatus},
    protocol::{ModeChange, PhaseChange, ServerEvent, SignalSnapshot, SignalStats},
};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::{error::ControlError, registry::SignalRegistry};

/// Result of one scheduler tick, taken under a single write lock.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub changes: Vec<PhaseChange>,
    pub signals: Vec<SignalSnapshot>,
}

/// A command's notification together with the signal exactly as the
/// command left it, read under the same write lock.
#[derive(Debug, Clone)]
pub struct Applied<C> {
    pub change: C,
    pub signal: SignalSnapshot,
}

/// Cloneable handle to the process-wide registry.
///
/// Every mutation takes the registry's write lock, so a tick and an operator
/// command never interleave. Reads hand out snapshot copies. Notifications
/// are published on the event channel after the lock is released.
#[derive(Clone)]
pub struct SignalController {
    registry: Arc<RwLock<SignalRegistry>>,
    events: broadcast::Sender<ServerEvent>,
}

impl SignalController {
    pub fn new(registry: SignalRegistry, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            registry: Arc::new(RwLock::new(registry)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Sends an event to every subscriber. Having no subscribers is normal.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.is_empty()
    }

    pub async fn contains(&self, id: &SignalId) -> bool {
        self.registry.read().await.contains(id)
    }

    pub async fn snapshot(&self, id: &SignalId) -> Result<SignalSnapshot, ControlError> {
        snapshot_of(&*self.registry.read().await, id)
    }

    pub async fn list(&self) -> Vec<SignalSnapshot> {
        self.registry.read().await.list()
    }

    pub async fn stats(&self) -> SignalStats {
        self.registry.read().await.stats()
    }

    pub async fn set_mode(
        &self,
        id: &SignalId,
        mode: Mode,
    ) -> Result<Applied<ModeChange>, ControlError> {
        let applied = {
            let mut registry = self.registry.write().await;
            let change = registry.set_mode(id, mode, Utc::now())?;
            Applied {
                change,
                signal: snapshot_of(&registry, id)?,
            }
        };
        let change = &applied.change;
        debug!(signal = %id, from = %change.old_mode, to = %change.new_mode, "mode changed");
        self.publish(ServerEvent::ModeChanged {
            change: change.clone(),
        });
        Ok(applied)
    }

    pub async fn set_phase(
        &self,
        id: &SignalId,
        phase: Phase,
        hold: Option<u32>,
    ) -> Result<Applied<PhaseChange>, ControlError> {
        let applied = {
            let mut registry = self.registry.write().await;
            let change = registry.set_phase(id, phase, hold, Utc::now())?;
            Applied {
                change,
                signal: snapshot_of(&registry, id)?,
            }
        };
        let change = &applied.change;
        debug!(
            signal = %id,
            from = %change.old_phase,
            to = %change.new_phase,
            hold = change.time_remaining,
            "manual phase change"
        );
        self.publish(ServerEvent::PhaseChanged {
            change: change.clone(),
        });
        Ok(applied)
    }

    pub async fn set_status(
        &self,
        id: &SignalId,
        status: SignalStatus,
    ) -> Result<SignalSnapshot, ControlError> {
        let signal = self
            .registry
            .write()
            .await
            .set_status(id, status, Utc::now())?;
        self.publish(ServerEvent::SignalUpdated {
            signal: signal.clone(),
        });
        Ok(signal)
    }

    /// Advances every signal once and, when `rng` is given, drifts the
    /// vehicle counters. Phase changes are published individually.
    pub async fn tick(&self, rng: Option<&mut (dyn RngCore + Send)>) -> TickOutcome {
        let outcome = {
            let mut registry = self.registry.write().await;
            let changes = registry.tick(Utc::now());
            if let Some(rng) = rng {
                registry.drift_vehicle_counts(rng);
            }
            TickOutcome {
                changes,
                signals: registry.list(),
            }
        };

        for change in &outcome.changes {
            debug!(
                signal = %change.signal_id,
                from = %change.old_phase,
                to = %change.new_phase,
                time_remaining = change.time_remaining,
                "phase changed"
            );
            self.publish(ServerEvent::PhaseChanged {
                change: change.clone(),
            });
        }
        outcome
    }
}

fn snapshot_of(registry: &SignalRegistry, id: &SignalId) -> Result<SignalSnapshot, ControlError> {
    registry
        .get(id)
        .ok_or_else(|| ControlError::UnknownSignalId(id.clone()))
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
