//! Traffic-signal phase control: the per-intersection state machine, the
//! process-wide registry that owns every signal, and the tick scheduler that
//! drives them.

pub mod controller;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod signal;
pub mod store;

pub use controller::{Applied, SignalController, TickOutcome};
pub use error::ControlError;
pub use registry::SignalRegistry;
pub use scheduler::{SchedulerConfig, TickScheduler};
pub use signal::Signal;
pub use store::{bootstrap_registry, default_signals, SignalStore};
