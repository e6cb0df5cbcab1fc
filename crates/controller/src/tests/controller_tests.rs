use super::*;
use crate::signal::{Signal, MANUAL_HOLD_SECONDS};
use rand::{rngs::StdRng, SeedableRng};
use shared::{domain::SignalSite, error::ErrorCode};

fn controller() -> SignalController {
    let registry = [
        Signal::new("TL_001", SignalSite::named("North"), Phase::Green, 1, Mode::Auto),
        Signal::new("TL_002", SignalSite::named("South"), Phase::Red, 30, Mode::Manual),
    ]
    .into_iter()
    .collect();
    SignalController::new(registry, 16)
}

#[tokio::test]
async fn tick_publishes_phase_changes() {
    let controller = controller();
    let mut events = controller.subscribe();

    let outcome = controller.tick(None).await;
    assert_eq!(outcome.changes.len(), 1);
    assert_eq!(outcome.signals.len(), 2);

    let ServerEvent::PhaseChanged { change } = events.recv().await.expect("event") else {
        panic!("expected phase change");
    };
    assert_eq!(change.signal_id, SignalId::from("TL_001"));
    assert_eq!(change.old_phase, Phase::Green);
    assert_eq!(change.new_phase, Phase::Yellow);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn tick_with_rng_keeps_phase_logic_identical() {
    let plain = controller();
    let drifting = controller();
    let mut rng = StdRng::seed_from_u64(3);

    let a = plain.tick(None).await;
    let b = drifting.tick(Some(&mut rng)).await;
    let phases = |o: &TickOutcome| -> Vec<_> {
        o.signals
            .iter()
            .map(|s| (s.phase, s.time_remaining))
            .collect()
    };
    assert_eq!(phases(&a), phases(&b));
}

#[tokio::test]
async fn rejected_commands_publish_nothing() {
    let controller = controller();
    let mut events = controller.subscribe();

    let err = controller
        .set_phase(&SignalId::from("TL_001"), Phase::Red, None)
        .await
        .expect_err("auto mode");
    assert_eq!(err.code(), ErrorCode::Validation);

    let err = controller
        .set_mode(&SignalId::from("nope"), Mode::Auto)
        .await
        .expect_err("unknown id");
    assert_eq!(err.code(), ErrorCode::NotFound);

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn manual_override_is_published_and_visible() {
    let controller = controller();
    let mut events = controller.subscribe();
    let id = SignalId::from("TL_002");

    controller
        .set_phase(&id, Phase::Green, None)
        .await
        .expect("manual");
    let ServerEvent::PhaseChanged { change } = events.recv().await.expect("event") else {
        panic!("expected phase change");
    };
    assert_eq!(change.time_remaining, MANUAL_HOLD_SECONDS);

    let snapshot = controller.snapshot(&id).await.expect("snapshot");
    assert_eq!(
        (snapshot.phase, snapshot.time_remaining),
        (Phase::Green, MANUAL_HOLD_SECONDS)
    );
}

#[tokio::test]
async fn mode_change_then_tick_resumes_countdown() {
    let controller = controller();
    let id = SignalId::from("TL_002");

    controller.tick(None).await;
    assert_eq!(controller.snapshot(&id).await.expect("s").time_remaining, 30);

    controller.set_mode(&id, Mode::Auto).await.expect("mode");
    controller.tick(None).await;
    assert_eq!(controller.snapshot(&id).await.expect("s").time_remaining, 29);
    assert_eq!(controller.stats().await.auto, 2);
}

#[tokio::test]
async fn status_change_emits_signal_update() {
    let controller = controller();
    let mut events = controller.subscribe();
    let id = SignalId::from("TL_001");

    controller
        .set_status(&id, SignalStatus::Maintenance)
        .await
        .expect("status");
    let ServerEvent::SignalUpdated { signal } = events.recv().await.expect("event") else {
        panic!("expected signal update");
    };
    assert_eq!(signal.status, SignalStatus::Maintenance);

    let outcome = controller.tick(None).await;
    assert!(outcome.changes.is_empty());
}

#[tokio::test]
async fn commands_return_the_state_they_produced() {
    let controller = controller();
    let id = SignalId::from("TL_002");

    let applied = controller
        .set_phase(&id, Phase::Yellow, Some(7))
        .await
        .expect("manual");
    assert_eq!(
        (applied.signal.phase, applied.signal.time_remaining),
        (Phase::Yellow, 7)
    );
    assert_eq!(applied.signal.updated_at, applied.change.at);

    let applied = controller.set_mode(&id, Mode::Auto).await.expect("mode");
    controller.tick(None).await;
    assert_eq!(applied.signal.mode, Mode::Auto);
    assert_eq!(applied.signal.time_remaining, 7);
    assert_eq!(applied.signal.updated_at, applied.change.at);
    assert_eq!(controller.snapshot(&id).await.expect("s").time_remaining, 6);
}
