use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use controller::{bootstrap_registry, ControlError, SignalRegistry};
use shared::{
    domain::{Mode, Phase, SignalId, SignalStatus},
    protocol::SignalSnapshot,
};
use storage::Storage;

/// Offline maintenance for the traffic-light database. Stop the server
/// first: its next tick overwrites rows changed here.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/signals.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert the default intersections into an empty database.
    Seed,
    List,
    Stats,
    SetMode {
        id: String,
        mode: String,
    },
    SetPhase {
        id: String,
        phase: String,
        #[arg(long)]
        seconds: Option<u32>,
    },
    SetStatus {
        id: String,
        status: String,
    },
    History {
        id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => {
            let registry = bootstrap_registry(&storage, true).await?;
            println!("{} traffic lights in database", registry.len());
        }
        Command::List => {
            let registry = load(&storage).await?;
            for signal in registry.list() {
                print_signal(&signal);
            }
        }
        Command::Stats => {
            let stats = load(&storage).await?.stats();
            println!(
                "total={} active={} inactive={} maintenance={} auto={} manual={} emergency={}",
                stats.total,
                stats.active,
                stats.inactive,
                stats.maintenance,
                stats.auto,
                stats.manual,
                stats.emergency
            );
        }
        Command::SetMode { id, mode } => {
            let id = SignalId(id);
            let mode = mode.parse::<Mode>().map_err(ControlError::from)?;
            let mut registry = load(&storage).await?;
            let change = registry.set_mode(&id, mode, Utc::now())?;
            save(&storage, &registry, &id).await?;
            println!("{id}: {} -> {}", change.old_mode, change.new_mode);
        }
        Command::SetPhase { id, phase, seconds } => {
            let id = SignalId(id);
            let phase = phase.parse::<Phase>().map_err(ControlError::from)?;
            let mut registry = load(&storage).await?;
            let change = registry.set_phase(&id, phase, seconds, Utc::now())?;
            save(&storage, &registry, &id).await?;
            storage.record_phase_change(&change).await?;
            println!(
                "{id}: {} -> {} for {}s",
                change.old_phase, change.new_phase, change.time_remaining
            );
        }
        Command::SetStatus { id, status } => {
            let id = SignalId(id);
            let status = status.parse::<SignalStatus>().map_err(ControlError::from)?;
            let mut registry = load(&storage).await?;
            let signal = registry.set_status(&id, status, Utc::now())?;
            storage.upsert_signal(&signal).await?;
            println!("{id}: status {}", signal.status);
        }
        Command::History { id, limit } => {
            let id = SignalId(id);
            if storage.load_signal(&id).await?.is_none() {
                bail!(ControlError::UnknownSignalId(id));
            }
            for change in storage.list_phase_changes(&id, limit).await? {
                println!(
                    "{} {} -> {} ({}s, {}, {})",
                    change.at.to_rfc3339(),
                    change.old_phase,
                    change.new_phase,
                    change.time_remaining,
                    change.mode,
                    change.cause
                );
            }
        }
    }

    Ok(())
}

async fn load(storage: &Storage) -> Result<SignalRegistry> {
    bootstrap_registry(storage, false)
        .await
        .context("failed to load traffic lights")
}

async fn save(storage: &Storage, registry: &SignalRegistry, id: &SignalId) -> Result<()> {
    let snapshot = registry
        .get(id)
        .ok_or_else(|| ControlError::UnknownSignalId(id.clone()))?;
    storage.upsert_signal(&snapshot).await
}

fn print_signal(signal: &SignalSnapshot) {
    println!(
        "{:<8} {:<7} {:>4}s {:<10} {:<12} {}",
        signal.id.as_str(),
        signal.phase.as_str(),
        signal.time_remaining,
        signal.mode.as_str(),
        signal.status.as_str(),
        signal.name
    );
}
