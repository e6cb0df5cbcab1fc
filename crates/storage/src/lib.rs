use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use controller::SignalStore;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{ChangeCause, Mode, Phase, SignalId, SignalStatus},
    protocol::{PhaseChange, SignalSnapshot},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

// `updated_at` is UTC RFC 3339 text, which orders chronologically as a string.
const UPSERT_SIGNAL: &str = "INSERT INTO traffic_lights (
        id, name, location, latitude, longitude, current_phase, time_remaining,
        mode, status, vehicle_count, avg_wait_time, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        location = excluded.location,
        latitude = excluded.latitude,
        longitude = excluded.longitude,
        current_phase = excluded.current_phase,
        time_remaining = excluded.time_remaining,
        mode = excluded.mode,
        status = excluded.status,
        vehicle_count = excluded.vehicle_count,
        avg_wait_time = excluded.avg_wait_time,
        updated_at = excluded.updated_at
     WHERE excluded.updated_at >= traffic_lights.updated_at";

const SELECT_SIGNAL_COLUMNS: &str = "SELECT id, name, location, latitude, longitude, current_phase,
        time_remaining, mode, status, vehicle_count, avg_wait_time, updated_at
     FROM traffic_lights";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts or refreshes a row. A snapshot older than the stored row is
    /// ignored, so a late tick cannot undo an operator command.
    pub async fn upsert_signal(&self, signal: &SignalSnapshot) -> Result<()> {
        upsert_with(&self.pool, signal)
            .await
            .with_context(|| format!("failed to store traffic light {}", signal.id))
    }

    /// Writes all snapshots in one transaction so readers never see half a tick.
    pub async fn save_signals(&self, signals: &[SignalSnapshot]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for signal in signals {
            upsert_with(&mut *tx, signal)
                .await
                .with_context(|| format!("failed to store traffic light {}", signal.id))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_signals(&self) -> Result<Vec<SignalSnapshot>> {
        let rows = sqlx::query(&format!("{SELECT_SIGNAL_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(signal_from_row).collect()
    }

    pub async fn load_signal(&self, id: &SignalId) -> Result<Option<SignalSnapshot>> {
        let row = sqlx::query(&format!("{SELECT_SIGNAL_COLUMNS} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(signal_from_row).transpose()
    }

    pub async fn record_phase_change(&self, change: &PhaseChange) -> Result<i64> {
        let rec = sqlx::query(
            "INSERT INTO phase_changes (
                signal_id, old_phase, new_phase, time_remaining, mode, cause, changed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(change.signal_id.as_str())
        .bind(change.old_phase.as_str())
        .bind(change.new_phase.as_str())
        .bind(i64::from(change.time_remaining))
        .bind(change.mode.as_str())
        .bind(change.cause.as_str())
        .bind(change.at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to record phase change for {}", change.signal_id))?;
        Ok(rec.get::<i64, _>(0))
    }

    /// Most recent transitions first.
    pub async fn list_phase_changes(&self, id: &SignalId, limit: u32) -> Result<Vec<PhaseChange>> {
        let rows = sqlx::query(
            "SELECT signal_id, old_phase, new_phase, time_remaining, mode, cause, changed_at
             FROM phase_changes
             WHERE signal_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(phase_change_from_row).collect()
    }
}

async fn upsert_with<'e, E>(executor: E, signal: &SignalSnapshot) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(UPSERT_SIGNAL)
        .bind(signal.id.as_str())
        .bind(signal.name.as_str())
        .bind(signal.location.as_str())
        .bind(signal.latitude)
        .bind(signal.longitude)
        .bind(signal.phase.as_str())
        .bind(i64::from(signal.time_remaining))
        .bind(signal.mode.as_str())
        .bind(signal.status.as_str())
        .bind(i64::from(signal.vehicle_count))
        .bind(i64::from(signal.avg_wait_time))
        .bind(signal.updated_at)
        .execute(executor)
        .await?;
    Ok(())
}

fn signal_from_row(row: &SqliteRow) -> Result<SignalSnapshot> {
    let id: String = row.try_get("id")?;
    Ok(SignalSnapshot {
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        phase: parse_column::<Phase>(row, "current_phase")?,
        time_remaining: u32_column(row, "time_remaining")?,
        mode: parse_column::<Mode>(row, "mode")?,
        status: parse_column::<SignalStatus>(row, "status")?,
        vehicle_count: u32_column(row, "vehicle_count")?,
        avg_wait_time: u32_column(row, "avg_wait_time")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        id: SignalId(id),
    })
}

fn phase_change_from_row(row: &SqliteRow) -> Result<PhaseChange> {
    Ok(PhaseChange {
        signal_id: SignalId(row.try_get("signal_id")?),
        old_phase: parse_column::<Phase>(row, "old_phase")?,
        new_phase: parse_column::<Phase>(row, "new_phase")?,
        time_remaining: u32_column(row, "time_remaining")?,
        mode: parse_column::<Mode>(row, "mode")?,
        cause: parse_column::<ChangeCause>(row, "cause")?,
        at: row.try_get::<DateTime<Utc>, _>("changed_at")?,
    })
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .with_context(|| format!("column '{column}' holds unexpected value '{raw}'"))
}

fn u32_column(row: &SqliteRow, column: &str) -> Result<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).with_context(|| format!("column '{column}' out of range: {raw}"))
}

#[async_trait]
impl SignalStore for Storage {
    async fn load_signals(&self) -> Result<Vec<SignalSnapshot>> {
        Storage::load_signals(self).await
    }

    async fn save_signals(&self, signals: &[SignalSnapshot]) -> Result<()> {
        Storage::save_signals(self, signals).await
    }

    async fn record_phase_change(&self, change: &PhaseChange) -> Result<()> {
        Storage::record_phase_change(self, change).await.map(|_| ())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
