//! Circuit breaker behavior through the public registry surface.

use breakwater::{
    AlertAction, AlertLevel, BreakerConfig, CircuitState, GuardRegistry, InMemoryAlertSink,
    ManualClock,
};
use std::sync::Arc;

fn registry() -> (GuardRegistry, Arc<ManualClock>, Arc<InMemoryAlertSink>) {
    let clock = ManualClock::new(1_700_000_000_000);
    let sink = Arc::new(InMemoryAlertSink::default());
    let registry = GuardRegistry::builder()
        .clock(clock.clone())
        .alert_sink(sink.clone())
        .build()
        .unwrap();
    (registry, clock, sink)
}

#[test]
fn five_failures_open_the_circuit_with_one_alert() {
    let (registry, _, sink) = registry();

    for i in 0..4 {
        assert!(
            registry.record_failure("auth").is_none(),
            "no alert expected on failure {}",
            i + 1
        );
        assert_eq!(registry.circuit_state("auth"), CircuitState::Closed);
    }
    let alert = registry.record_failure("auth").expect("opened on 5th");
    assert_eq!(alert.level, AlertLevel::Critical);
    assert_eq!(alert.action, AlertAction::Opened);
    assert_eq!(registry.circuit_state("auth"), CircuitState::Open);

    let opened = sink
        .alerts_for("auth")
        .into_iter()
        .filter(|a| a.action == AlertAction::Opened)
        .count();
    assert_eq!(opened, 1);
}

#[test]
fn open_circuit_rejects_until_timeout_boundary() {
    let (registry, clock, _) = registry();
    for _ in 0..5 {
        registry.record_failure("db");
    }
    assert!(!registry.allow("db"));

    clock.advance(59_999);
    assert_eq!(registry.circuit_state("db"), CircuitState::Open);

    clock.advance(2); // 60_001 ms after the last failure
    assert_eq!(registry.circuit_state("db"), CircuitState::HalfOpen);
    assert!(registry.allow("db"));
}

#[test]
fn half_open_needs_exactly_three_successes_to_close() {
    let (registry, clock, sink) = registry();
    for _ in 0..5 {
        registry.record_failure("api");
    }
    clock.advance(60_000);
    assert_eq!(registry.circuit_state("api"), CircuitState::HalfOpen);

    assert!(registry.record_success("api").is_none());
    assert!(registry.record_success("api").is_none());
    let alert = registry.record_success("api").expect("closed on 3rd");
    assert_eq!(alert.action, AlertAction::Closed);
    assert_eq!(alert.level, AlertLevel::Info);
    assert_eq!(registry.circuit_state("api"), CircuitState::Closed);

    assert!(sink
        .alerts_for("api")
        .iter()
        .any(|a| a.action == AlertAction::HalfOpen));
}

#[test]
fn half_open_failure_reopens_with_streak_of_one() {
    let (registry, clock, _) = registry();
    for _ in 0..5 {
        registry.record_failure("flaky");
    }
    clock.advance(60_000);
    assert_eq!(registry.circuit_state("flaky"), CircuitState::HalfOpen);

    let alert = registry.record_failure("flaky").expect("re-opened");
    assert_eq!(alert.action, AlertAction::Opened);
    let snap = registry.circuit_snapshot("flaky").unwrap();
    assert_eq!(snap.state, CircuitState::Open);
    assert_eq!(snap.consecutive_failures, 1);
}

#[test]
fn streak_counters_are_mutually_exclusive() {
    let (registry, _, _) = registry();
    let pattern = [true, true, false, true, false, false, true];
    for ok in pattern {
        if ok {
            registry.record_success("mixed");
        } else {
            registry.record_failure("mixed");
        }
        let snap = registry.circuit_snapshot("mixed").unwrap();
        assert!(
            snap.consecutive_failures == 0 || snap.consecutive_successes == 0,
            "streaks must never both be positive"
        );
    }
}

#[test]
fn error_rate_updates_with_every_event() {
    let (registry, _, _) = registry();
    registry.record_success("svc");
    registry.record_failure("svc");
    let snap = registry.circuit_snapshot("svc").unwrap();
    assert_eq!(snap.total_requests, 2);
    assert_eq!(snap.total_failures, 1);
    assert!((snap.error_rate - 50.0).abs() < 1e-9);
}

#[test]
fn admin_overrides_always_succeed_and_alert() {
    let (registry, _, sink) = registry();

    let alert = registry.force_open("svc");
    assert_eq!(alert.level, AlertLevel::Warning);
    assert!(!registry.allow("svc"));

    let alert = registry.force_close("svc");
    assert_eq!(alert.level, AlertLevel::Info);
    assert!(registry.allow("svc"));

    for _ in 0..3 {
        registry.record_failure("svc");
    }
    let alert = registry.reset("svc");
    assert_eq!(alert.action, AlertAction::Recovery);
    let snap = registry.circuit_snapshot("svc").unwrap();
    assert_eq!(snap.total_requests, 0);
    assert_eq!(sink.alerts_for("svc").len(), 3);
}

#[test]
fn per_identifier_breaker_override() {
    let (registry, _, _) = registry();
    registry
        .configure_breaker(
            "fragile",
            BreakerConfig::new()
                .with_failure_threshold(2)
                .with_open_timeout_ms(1_000),
        )
        .unwrap();

    registry.record_failure("fragile");
    registry.record_failure("fragile");
    assert_eq!(registry.circuit_state("fragile"), CircuitState::Open);

    registry.record_failure("robust");
    registry.record_failure("robust");
    assert_eq!(registry.circuit_state("robust"), CircuitState::Closed);
}

#[test]
fn shorter_override_timeout_recovers_sooner() {
    let (registry, clock, _) = registry();
    registry
        .configure_breaker(
            "fast",
            BreakerConfig::new()
                .with_failure_threshold(1)
                .with_open_timeout_ms(500),
        )
        .unwrap();
    registry.record_failure("fast");
    assert_eq!(registry.circuit_state("fast"), CircuitState::Open);
    clock.advance(500);
    assert_eq!(registry.circuit_state("fast"), CircuitState::HalfOpen);
}

#[test]
fn concurrent_outcome_reports_lose_nothing() {
    use std::thread;
    let clock = ManualClock::new(0);
    let registry = Arc::new(
        GuardRegistry::builder()
            .clock(clock)
            .breaker_defaults(BreakerConfig::new().with_failure_threshold(u32::MAX))
            .build()
            .unwrap(),
    );

    let mut handles = vec![];
    for worker in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            for _ in 0..250 {
                if worker % 2 == 0 {
                    registry.record_failure("shared");
                } else {
                    registry.record_success("shared");
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let snap = registry.circuit_snapshot("shared").unwrap();
    assert_eq!(snap.total_requests, 2_000);
    assert_eq!(snap.total_failures, 1_000);
    assert!((snap.error_rate - 50.0).abs() < 1e-9);
}
