use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{Mode, Phase, SignalSite},
    protocol::{PhaseChange, SignalSnapshot},
};
use tracing::info;

use crate::{registry::SignalRegistry, signal::Signal};

/// Where signal state outlives the process.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn load_signals(&self) -> Result<Vec<SignalSnapshot>>;
    async fn save_signals(&self, signals: &[SignalSnapshot]) -> Result<()>;
    async fn record_phase_change(&self, change: &PhaseChange) -> Result<()>;
}

/// The intersections a fresh installation starts with.
pub fn default_signals() -> Vec<Signal> {
    vec![
        Signal::new(
            "TL_001",
            SignalSite {
                name: "Highway 101 & Oak St".into(),
                location: "Highway 101 & Oak St".into(),
                latitude: 37.7749,
                longitude: -122.4194,
            },
            Phase::Green,
            45,
            Mode::Emergency,
        )
        .with_traffic(15, 120),
        Signal::new(
            "TL_002",
            SignalSite {
                name: "Downtown Bridge Entry".into(),
                location: "Downtown Bridge Entry".into(),
                latitude: 37.7849,
                longitude: -122.4094,
            },
            Phase::Red,
            30,
            Mode::Manual,
        )
        .with_traffic(25, 180),
        Signal::new(
            "TL_003",
            SignalSite {
                name: "Airport Access & Main".into(),
                location: "Airport Access & Main".into(),
                latitude: 37.7649,
                longitude: -122.4294,
            },
            Phase::Yellow,
            5,
            Mode::Auto,
        )
        .with_traffic(8, 90),
    ]
}

/// Builds the registry from whatever the store holds. An empty store is
/// seeded with [`default_signals`] when `seed_defaults` is set.
pub async fn bootstrap_registry<S>(store: &S, seed_defaults: bool) -> Result<SignalRegistry>
where
    S: SignalStore + ?Sized,
{
    let stored = store.load_signals().await?;
    if !stored.is_empty() {
        info!(signals = stored.len(), "restored signals from store");
        return Ok(stored.into_iter().map(Signal::from_snapshot).collect());
    }

    if !seed_defaults {
        return Ok(SignalRegistry::new());
    }

    let registry: SignalRegistry = default_signals().into_iter().collect();
    store.save_signals(&registry.list()).await?;
    info!(signals = registry.len(), "seeded default signals");
    Ok(registry)
}
