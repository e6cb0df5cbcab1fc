use controller::{ControlError, SignalController};
use shared::{
    domain::{Mode, Phase, SignalId},
    error::{ApiError, ErrorCode},
    protocol::{PhaseChange, SignalSnapshot, SignalStats},
};
use storage::Storage;
use tracing::warn;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct ApiContext {
    pub controller: SignalController,
    pub storage: Storage,
}

pub async fn list_signals(ctx: &ApiContext) -> Vec<SignalSnapshot> {
    ctx.controller.list().await
}

pub async fn get_signal(ctx: &ApiContext, id: &SignalId) -> Result<SignalSnapshot, ApiError> {
    Ok(ctx.controller.snapshot(id).await?)
}

pub async fn signal_stats(ctx: &ApiContext) -> SignalStats {
    ctx.controller.stats().await
}

/// Switches a signal's operating mode. Accepts any casing and the `smart`
/// alias for emergency mode.
pub async fn update_mode(
    ctx: &ApiContext,
    id: &SignalId,
    raw_mode: &str,
) -> Result<SignalSnapshot, ApiError> {
    let mode = raw_mode.parse::<Mode>().map_err(ControlError::from)?;
    let applied = ctx.controller.set_mode(id, mode).await?;
    persist_signal(ctx, &applied.signal).await;
    Ok(applied.signal)
}

/// Operator phase override. Only signals in manual mode accept it; the new
/// phase is held for `hold` seconds, or the manual default when omitted.
pub async fn update_phase(
    ctx: &ApiContext,
    id: &SignalId,
    raw_phase: &str,
    hold: Option<u32>,
) -> Result<SignalSnapshot, ApiError> {
    let phase = raw_phase.parse::<Phase>().map_err(ControlError::from)?;
    let applied = ctx.controller.set_phase(id, phase, hold).await?;
    persist_signal(ctx, &applied.signal).await;
    if let Err(error) = ctx.storage.record_phase_change(&applied.change).await {
        warn!(signal = %id, %error, "failed to record manual phase change");
    }
    Ok(applied.signal)
}

pub async fn phase_history(
    ctx: &ApiContext,
    id: &SignalId,
    limit: Option<u32>,
) -> Result<Vec<PhaseChange>, ApiError> {
    if !ctx.controller.contains(id).await {
        return Err(ControlError::UnknownSignalId(id.clone()).into());
    }
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    ctx.storage
        .list_phase_changes(id, limit)
        .await
        .map_err(internal)
}

async fn persist_signal(ctx: &ApiContext, snapshot: &SignalSnapshot) {
    if let Err(error) = ctx.storage.upsert_signal(snapshot).await {
        warn!(signal = %snapshot.id, %error, "failed to persist signal");
    }
}

pub fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller::bootstrap_registry;
    use shared::domain::ChangeCause;

    async fn setup() -> ApiContext {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let registry = bootstrap_registry(&storage, true).await.expect("seed");
        ApiContext {
            controller: SignalController::new(registry, 32),
            storage,
        }
    }

    #[tokio::test]
    async fn lists_seeded_signals_in_id_order() {
        let ctx = setup().await;
        let ids: Vec<_> = list_signals(&ctx)
            .await
            .into_iter()
            .map(|s| s.id.0)
            .collect();
        assert_eq!(ids, vec!["TL_001", "TL_002", "TL_003"]);
    }

    #[tokio::test]
    async fn unknown_signal_maps_to_not_found() {
        let ctx = setup().await;
        let err = get_signal(&ctx, &SignalId::from("TL_999"))
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = update_mode(&ctx, &SignalId::from("TL_999"), "auto")
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn invalid_mode_is_a_validation_error() {
        let ctx = setup().await;
        let err = update_mode(&ctx, &SignalId::from("TL_001"), "turbo")
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("turbo"));
    }

    #[tokio::test]
    async fn smart_alias_selects_emergency_and_is_persisted() {
        let ctx = setup().await;
        let id = SignalId::from("TL_003");
        let updated = update_mode(&ctx, &id, "SMART").await.expect("mode");
        assert_eq!(updated.mode, Mode::Emergency);

        let stored = ctx
            .storage
            .load_signal(&id)
            .await
            .expect("load")
            .expect("row");
        assert_eq!(stored.mode, Mode::Emergency);
    }

    #[tokio::test]
    async fn phase_override_requires_manual_mode() {
        let ctx = setup().await;
        let id = SignalId::from("TL_003");
        let err = update_phase(&ctx, &id, "green", None)
            .await
            .expect_err("auto signal");
        assert_eq!(err.code, ErrorCode::Validation);
        let unchanged = get_signal(&ctx, &id).await.expect("signal");
        assert_eq!((unchanged.phase, unchanged.time_remaining), (Phase::Yellow, 5));
    }

    #[tokio::test]
    async fn manual_override_is_persisted_with_history() {
        let ctx = setup().await;
        let id = SignalId::from("TL_002");
        let updated = update_phase(&ctx, &id, "Green", None)
            .await
            .expect("override");
        assert_eq!((updated.phase, updated.time_remaining), (Phase::Green, 60));

        let history = phase_history(&ctx, &id, None).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_phase, Phase::Red);
        assert_eq!(history[0].cause, ChangeCause::Manual);
    }

    #[tokio::test]
    async fn unknown_phase_is_rejected_without_touching_state() {
        let ctx = setup().await;
        let id = SignalId::from("TL_002");
        let err = update_phase(&ctx, &id, "blue", None)
            .await
            .expect_err("unknown phase");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("blue"));

        let unchanged = get_signal(&ctx, &id).await.expect("signal");
        assert_eq!((unchanged.phase, unchanged.time_remaining), (Phase::Red, 30));
        assert!(phase_history(&ctx, &id, None).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn zero_second_hold_is_rejected() {
        let ctx = setup().await;
        let err = update_phase(&ctx, &SignalId::from("TL_002"), "green", Some(0))
            .await
            .expect_err("zero hold");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn history_for_unknown_signal_is_not_found() {
        let ctx = setup().await;
        let err = phase_history(&ctx, &SignalId::from("TL_404"), Some(5))
            .await
            .expect_err("unknown");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn stats_reflect_seeded_modes() {
        let ctx = setup().await;
        let stats = signal_stats(&ctx).await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 3);
        assert_eq!((stats.auto, stats.manual, stats.emergency), (1, 1, 1));
    }
}
