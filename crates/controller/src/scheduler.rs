use std::{sync::Arc, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use shared::protocol::ServerEvent;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info};

use crate::{
    controller::{SignalController, TickOutcome},
    store::SignalStore,
};

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Publish a full `signals_updated` snapshot every N ticks; 0 disables.
    pub broadcast_every_ticks: u32,
    pub simulate_traffic: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            broadcast_every_ticks: 2,
            simulate_traffic: false,
        }
    }
}

/// Drives [`SignalController::tick`] once per interval for the life of the
/// process, persisting each tick to the optional store.
pub struct TickScheduler {
    controller: SignalController,
    store: Option<Arc<dyn SignalStore>>,
    config: SchedulerConfig,
    rng: StdRng,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(controller: SignalController, config: SchedulerConfig) -> Self {
        Self {
            controller,
            store: None,
            config,
            rng: StdRng::from_entropy(),
            ticks: 0,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` turns true or its sender is dropped. The first
    /// tick fires one full interval after start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.tick_interval.max(MIN_TICK_INTERVAL);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(interval_ms = period.as_millis() as u64, "tick scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(ticks = self.ticks, "tick scheduler stopped");
    }

    /// One scheduler step, exposed for callers that drive time themselves.
    pub async fn tick_once(&mut self) -> TickOutcome {
        self.ticks += 1;
        let rng = self
            .config
            .simulate_traffic
            .then_some(&mut self.rng as &mut (dyn rand::RngCore + Send));
        let outcome = self.controller.tick(rng).await;

        let every = u64::from(self.config.broadcast_every_ticks);
        if every > 0 && self.ticks % every == 0 {
            self.controller.publish(ServerEvent::SignalsUpdated {
                signals: outcome.signals.clone(),
            });
        }

        if let Some(store) = &self.store {
            persist(store.as_ref(), &outcome).await;
        }
        outcome
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

async fn persist(store: &dyn SignalStore, outcome: &TickOutcome) {
    if let Err(error) = store.save_signals(&outcome.signals).await {
        error!(%error, "failed to persist signal snapshots");
    }
    for change in &outcome.changes {
        if let Err(error) = store.record_phase_change(change).await {
            error!(signal = %change.signal_id, %error, "failed to record phase change");
        }
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
