//! Reconnect loop and lifecycle tests.
//!
//! All tests run on a paused clock, so retry delays and liveness polls
//! complete instantly and deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use astro_live::audio::{
    AudioFocusGuard, AudioMode, AudioRoutingSnapshot, PlatformCapabilities, SoftwareAudioDevice,
};
use astro_live::live::{
    ChartContext, LiveSessionManager, LiveSettings, LoopPhase, ManagerState, ReconnectPolicy,
    SessionConfig,
};
use astro_live::AstroLiveError;
use common::{Harness, ScriptedEndpoint, SessionScript, Step};

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn original_routing() -> AudioRoutingSnapshot {
    AudioRoutingSnapshot {
        mode: AudioMode::InCall,
        speakerphone: false,
    }
}

#[tokio::test(start_paused = true)]
async fn test_failures_then_success_resets_retry() {
    for failures in 1..5usize {
        let steps = std::iter::repeat(Step::Fail)
            .take(failures)
            .chain(std::iter::once(Step::Succeed(SessionScript::forever())));
        let harness = Harness::new(ScriptedEndpoint::new(steps, Step::Hang));

        harness.manager.start().unwrap();
        advance(failures as u64 * 2000 + 500).await;

        let diagnostics = harness.manager.diagnostics();
        assert_eq!(diagnostics.phase, LoopPhase::Monitoring, "failures = {failures}");
        assert_eq!(diagnostics.retry_attempts, 0);
        assert_eq!(harness.calls.connects(), failures + 1);
        assert_eq!(harness.manager.state(), ManagerState::Listening);

        harness.manager.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_five_failures_stop_without_sixth_attempt() {
    let harness = Harness::new(ScriptedEndpoint::new([], Step::Fail));
    let mut state = harness.manager.subscribe_state();

    harness.manager.start().unwrap();
    advance(60_000).await;

    assert_eq!(harness.calls.connects(), 5);
    assert_eq!(harness.manager.state(), ManagerState::Stopped);
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), ManagerState::Stopped);

    let diagnostics = harness.manager.diagnostics();
    assert_eq!(diagnostics.phase, LoopPhase::Idle);
    assert_eq!(diagnostics.retry_attempts, 5);
    assert_eq!(diagnostics.focus.outstanding(), 0);

    let times = harness.calls.connect_times();
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(2000), "gap {gap:?}");
        assert!(gap < Duration::from_millis(2100), "gap {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_exhaustion() {
    let steps = std::iter::repeat(Step::Fail)
        .take(5)
        .chain(std::iter::once(Step::Succeed(SessionScript::forever())));
    let harness = Harness::new(ScriptedEndpoint::new(steps, Step::Hang));

    harness.manager.start().unwrap();
    advance(20_000).await;
    assert_eq!(harness.manager.state(), ManagerState::Stopped);

    harness.manager.start().unwrap();
    advance(500).await;

    assert_eq!(harness.manager.state(), ManagerState::Listening);
    assert_eq!(harness.manager.diagnostics().phase, LoopPhase::Monitoring);
    assert_eq!(harness.calls.connects(), 6);

    harness.manager.stop().await;
    assert_eq!(harness.manager.state(), ManagerState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_as_soon_as_stopped_is_observed() {
    let policy = ReconnectPolicy {
        max_attempts: 1,
        delay: Duration::ZERO,
        ..ReconnectPolicy::default()
    };
    let harness = Harness::with_policy(ScriptedEndpoint::new([], Step::Fail), policy);
    let mut state = harness.manager.subscribe_state();

    for round in 1..=200usize {
        harness.manager.start().unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ManagerState::Stopped),
        )
        .await
        .expect("worker did not stop")
        .unwrap();

        assert_eq!(harness.calls.connects(), round, "restart ignored in round {round}");
    }

    assert_eq!(harness.manager.diagnostics().focus.outstanding(), 0);
    harness.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_connecting_releases_focus() {
    let harness = Harness::new(ScriptedEndpoint::new([], Step::Hang));

    harness.manager.start().unwrap();
    advance(100).await;
    assert_eq!(harness.manager.diagnostics().phase, LoopPhase::Connecting);

    harness.manager.stop().await;

    let diagnostics = harness.manager.diagnostics();
    assert_eq!(diagnostics.focus.acquired, diagnostics.focus.released);
    assert_eq!(diagnostics.phase, LoopPhase::Idle);
    assert_eq!(harness.device.routing(), original_routing());
    assert!(!harness.device.focus_held());
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_monitoring_restores_routing() {
    let harness = Harness::new(ScriptedEndpoint::new([], Step::Succeed(SessionScript::forever())));

    harness.manager.start().unwrap();
    advance(2500).await;

    assert_eq!(harness.manager.diagnostics().phase, LoopPhase::Monitoring);
    assert_eq!(
        harness.device.routing(),
        AudioRoutingSnapshot {
            mode: AudioMode::Normal,
            speakerphone: true,
        }
    );
    assert!(harness.device.focus_held());

    harness.manager.stop().await;

    assert_eq!(harness.device.routing(), original_routing());
    assert!(!harness.device.focus_held());
    assert_eq!(harness.calls.stops(), 1);
    assert_eq!(harness.calls.closes(), 1);
    assert_eq!(harness.manager.diagnostics().focus.outstanding(), 0);
    assert_eq!(harness.manager.state(), ManagerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_creates_one_session() {
    let harness = Harness::new(ScriptedEndpoint::new([], Step::Succeed(SessionScript::forever())));

    harness.manager.start().unwrap();
    harness.manager.start().unwrap();
    advance(1500).await;
    harness.manager.start().unwrap();
    advance(1500).await;

    assert_eq!(harness.calls.connects(), 1);
    assert_eq!(harness.manager.diagnostics().focus.acquired, 1);

    harness.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_inactive_session_reconnects_after_delay() {
    let steps = [
        Step::Succeed(SessionScript::active_for(2)),
        Step::Succeed(SessionScript::forever()),
    ];
    let harness = Harness::new(ScriptedEndpoint::new(steps, Step::Hang));

    harness.manager.start().unwrap();

    // Polls at 1s and 2s report active, the third at 3s does not.
    advance(3500).await;
    let diagnostics = harness.manager.diagnostics();
    assert_eq!(diagnostics.phase, LoopPhase::Reconnecting);
    assert_eq!(diagnostics.retry_attempts, 1);
    assert_eq!(diagnostics.focus.outstanding(), 0);
    assert_eq!(harness.calls.connects(), 1);
    assert_eq!(harness.calls.closes(), 1);

    advance(2000).await;
    let diagnostics = harness.manager.diagnostics();
    assert_eq!(harness.calls.connects(), 2);
    assert_eq!(diagnostics.phase, LoopPhase::Monitoring);
    assert_eq!(diagnostics.retry_attempts, 0);

    let times = harness.calls.connect_times();
    let gap = times[1] - times[0];
    assert!(gap >= Duration::from_millis(5000), "gap {gap:?}");
    assert!(gap < Duration::from_millis(5100), "gap {gap:?}");

    harness.manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_teardown_failures_are_isolated() {
    let broken = SessionScript {
        active_polls: 0,
        fail_stop: true,
        fail_close: true,
        ..SessionScript::default()
    };
    let steps = [Step::Succeed(broken), Step::Succeed(SessionScript::forever())];
    let harness = Harness::new(ScriptedEndpoint::new(steps, Step::Hang));

    harness.manager.start().unwrap();
    advance(1500).await;

    // Both steps ran even though each failed, and focus came back.
    assert_eq!(harness.calls.stops(), 1);
    assert_eq!(harness.calls.closes(), 1);
    assert_eq!(harness.manager.diagnostics().focus.outstanding(), 0);
    assert_eq!(harness.device.routing(), original_routing());

    advance(2000).await;
    assert_eq!(harness.calls.connects(), 2);
    assert_eq!(harness.manager.diagnostics().phase, LoopPhase::Monitoring);

    harness.manager.stop().await;
    assert_eq!(harness.manager.diagnostics().focus.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_counts_as_drop() {
    let failing = SessionScript {
        fail_start: true,
        ..SessionScript::forever()
    };
    let harness = Harness::new(ScriptedEndpoint::new([], Step::Succeed(failing)));

    harness.manager.start().unwrap();
    advance(500).await;

    let diagnostics = harness.manager.diagnostics();
    assert_eq!(diagnostics.phase, LoopPhase::Reconnecting);
    assert_eq!(diagnostics.retry_attempts, 1);
    assert_eq!(diagnostics.focus.outstanding(), 0);
    assert_eq!(harness.calls.closes(), 1);
    assert_eq!(harness.calls.stops(), 0);

    // The connect itself succeeds, so the counter starts over every time.
    advance(2000).await;
    assert_eq!(harness.calls.connects(), 2);
    assert_eq!(harness.manager.diagnostics().retry_attempts, 1);
    assert_eq!(harness.manager.state(), ManagerState::Listening);

    harness.manager.stop().await;
}

#[tokio::test]
async fn test_permission_denied_by_gate() {
    let device = Arc::new(SoftwareAudioDevice::new());
    let manager = LiveSessionManager::new(
        SessionConfig::for_chart(&LiveSettings::default(), &ChartContext::default()),
        Arc::new(ScriptedEndpoint::new([], Step::Hang)),
        AudioFocusGuard::new(device.clone(), PlatformCapabilities::new(28)),
        Arc::new(|| false),
    );

    assert!(matches!(
        manager.start(),
        Err(AstroLiveError::PermissionDenied)
    ));
    assert_eq!(manager.state(), ManagerState::Idle);
    assert_eq!(device.focus_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_focus() {
    let harness = Harness::new(ScriptedEndpoint::new([], Step::Succeed(SessionScript::forever())));
    let device = harness.device.clone();

    harness.manager.start().unwrap();
    advance(1500).await;
    assert!(device.focus_held());

    drop(harness);
    advance(100).await;

    assert!(!device.focus_held());
    assert_eq!(device.routing(), original_routing());
}
