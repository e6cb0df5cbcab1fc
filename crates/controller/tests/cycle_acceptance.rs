use controller::{
    signal::{
        next_phase, EMERGENCY_GREEN_SECONDS, GREEN_SECONDS, MANUAL_HOLD_SECONDS, RED_SECONDS,
        YELLOW_SECONDS,
    },
    ControlError, SignalController, SignalRegistry,
};
use shared::domain::{ChangeCause, Mode, Phase, SignalId, SignalSite};

fn single(phase: Phase, time_remaining: u32, mode: Mode) -> (SignalController, SignalId) {
    let id = SignalId::from("TL_ACCEPT");
    let registry: SignalRegistry = std::iter::once(controller::Signal::new(
        id.clone(),
        SignalSite::named("Acceptance"),
        phase,
        time_remaining,
        mode,
    ))
    .collect();
    (SignalController::new(registry, 256), id)
}

#[tokio::test]
async fn auto_signal_visits_phases_in_strict_order_for_many_cycles() {
    let (controller, _id) = single(Phase::Green, GREEN_SECONDS, Mode::Auto);
    let cycle = GREEN_SECONDS + YELLOW_SECONDS + RED_SECONDS;

    let mut transitions = Vec::new();
    for _ in 0..(cycle * 4) {
        let outcome = controller.tick(None).await;
        transitions.extend(outcome.changes);
    }

    assert_eq!(transitions.len(), 12);
    for change in &transitions {
        assert_eq!(change.cause, ChangeCause::Timer);
        let (expected, duration) = next_phase(change.old_phase, Mode::Auto);
        assert_eq!(change.new_phase, expected);
        assert_eq!(change.time_remaining, duration);
    }
    let order: Vec<Phase> = transitions.iter().take(3).map(|c| c.new_phase).collect();
    assert_eq!(order, vec![Phase::Yellow, Phase::Red, Phase::Green]);
}

#[tokio::test]
async fn emergency_cycle_is_longer_by_the_extended_green() {
    let (controller, id) = single(Phase::Red, 1, Mode::Emergency);
    controller.tick(None).await;
    let snapshot = controller.snapshot(&id).await.expect("snapshot");
    assert_eq!(
        (snapshot.phase, snapshot.time_remaining),
        (Phase::Green, EMERGENCY_GREEN_SECONDS)
    );

    let mut ticks_until_yellow = 0;
    loop {
        ticks_until_yellow += 1;
        let outcome = controller.tick(None).await;
        if !outcome.changes.is_empty() {
            break;
        }
    }
    assert_eq!(ticks_until_yellow, EMERGENCY_GREEN_SECONDS);
}

#[tokio::test]
async fn operator_session_freeze_override_resume() {
    let (controller, id) = single(Phase::Green, 20, Mode::Auto);
    controller.tick(None).await;

    controller.set_mode(&id, Mode::Manual).await.expect("manual");
    for _ in 0..10 {
        controller.tick(None).await;
    }
    assert_eq!(controller.snapshot(&id).await.expect("s").time_remaining, 19);

    controller
        .set_phase(&id, Phase::Red, None)
        .await
        .expect("override");
    let snapshot = controller.snapshot(&id).await.expect("s");
    assert_eq!(
        (snapshot.phase, snapshot.time_remaining),
        (Phase::Red, MANUAL_HOLD_SECONDS)
    );

    controller.set_mode(&id, Mode::Auto).await.expect("auto");
    controller.tick(None).await;
    assert_eq!(
        controller.snapshot(&id).await.expect("s").time_remaining,
        MANUAL_HOLD_SECONDS - 1
    );

    let err = controller
        .set_phase(&id, Phase::Green, None)
        .await
        .expect_err("auto again");
    assert!(matches!(err, ControlError::PhaseChangeNotAllowed { .. }));
}
