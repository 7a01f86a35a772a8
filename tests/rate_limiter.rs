//! Rate limiter behavior through the public registry surface.

use breakwater::{
    GuardRegistry, InMemoryAlertSink, LimiterConfig, ManualClock, QuotaConfig, Strategy,
    TokenBucketConfig, WindowConfig,
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
fn token_bucket_burst_drains_then_rejects_with_wait_hint() {
    let (registry, _, _) = registry();
    registry
        .configure(
            "x",
            LimiterConfig::TokenBucket(
                TokenBucketConfig::new()
                    .with_capacity(10.0)
                    .with_refill_per_sec(1.0),
            ),
        )
        .unwrap();

    for expected in (0..10).rev() {
        let d = registry.check("x", Strategy::TokenBucket, 1).unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, expected);
    }

    let d = registry.check("x", Strategy::TokenBucket, 1).unwrap();
    assert!(!d.allowed);
    assert_eq!(d.retry_after_ms, Some(1_000));
}

#[test]
fn token_bucket_full_again_after_capacity_over_rate() {
    let (registry, clock, _) = registry();
    registry
        .configure(
            "x",
            LimiterConfig::TokenBucket(
                TokenBucketConfig::new()
                    .with_capacity(10.0)
                    .with_refill_per_sec(1.0),
            ),
        )
        .unwrap();
    for _ in 0..10 {
        registry.check("x", Strategy::TokenBucket, 1).unwrap();
    }
    // capacity / refill_per_sec = 10 seconds from empty to full
    clock.advance(10_000);
    let d = registry.check("x", Strategy::TokenBucket, 1).unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 9);
}

#[test]
fn sliding_window_hard_ceiling_and_rollover() {
    let (registry, clock, _) = registry();
    registry
        .configure(
            "ip:10.0.0.1",
            LimiterConfig::SlidingWindow(
                WindowConfig::new()
                    .with_window_ms(60_000)
                    .with_max_requests(3),
            ),
        )
        .unwrap();

    for _ in 0..3 {
        assert!(registry
            .check("ip:10.0.0.1", Strategy::SlidingWindow, 1)
            .unwrap()
            .allowed);
    }
    let d = registry
        .check("ip:10.0.0.1", Strategy::SlidingWindow, 1)
        .unwrap();
    assert!(!d.allowed);
    assert_eq!(d.retry_after_ms, Some(60_000));

    clock.advance(61_000);
    let d = registry
        .check("ip:10.0.0.1", Strategy::SlidingWindow, 1)
        .unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 2);
}

#[test]
fn window_reset_at_tracks_window_start() {
    let (registry, clock, _) = registry();
    let start = 1_700_000_000_000u64;
    registry
        .configure(
            "w",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_window_ms(60_000)),
        )
        .unwrap();
    let d = registry.check("w", Strategy::SlidingWindow, 1).unwrap();
    assert_eq!(d.reset_at_ms, start + 60_000);

    clock.advance(10_000);
    let d = registry.check("w", Strategy::SlidingWindow, 1).unwrap();
    // Same window, same reset point
    assert_eq!(d.reset_at_ms, start + 60_000);
}

#[test]
fn quota_matches_window_mechanics_at_day_scale() {
    let (registry, clock, _) = registry();
    // Defaults: 10_000 per 24h; use a small override to keep the test tight
    registry
        .configure(
            "tenant-a",
            LimiterConfig::Quota(
                QuotaConfig::new()
                    .with_period_ms(86_400_000)
                    .with_max_per_period(3),
            ),
        )
        .unwrap();

    for _ in 0..3 {
        assert!(registry.check("tenant-a", Strategy::Quota, 1).unwrap().allowed);
    }
    let d = registry.check("tenant-a", Strategy::Quota, 1).unwrap();
    assert!(!d.allowed);
    assert_eq!(d.retry_after_ms, Some(86_400_000));

    clock.advance(86_400_000);
    assert!(registry.check("tenant-a", Strategy::Quota, 1).unwrap().allowed);
}

#[test]
fn default_quota_admits_ten_thousand() {
    let (registry, _, _) = registry();
    for _ in 0..10_000 {
        assert!(registry.check("bulk", Strategy::Quota, 1).unwrap().allowed);
    }
    let d = registry.check("bulk", Strategy::Quota, 1).unwrap();
    assert!(!d.allowed);
}

#[test]
fn cost_above_maximum_is_rejected_without_retry_hint() {
    let (registry, _, _) = registry();
    registry
        .configure(
            "b",
            LimiterConfig::TokenBucket(
                TokenBucketConfig::new()
                    .with_capacity(10.0)
                    .with_refill_per_sec(100.0),
            ),
        )
        .unwrap();
    let d = registry.check("b", Strategy::TokenBucket, 11).unwrap();
    assert!(!d.allowed);
    assert!(d.retry_after_ms.is_none(), "waiting can never satisfy this");

    registry
        .configure(
            "w",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_max_requests(5)),
        )
        .unwrap();
    let d = registry.check("w", Strategy::SlidingWindow, 6).unwrap();
    assert!(!d.allowed);
    assert!(d.retry_after_ms.is_none());
}

#[test]
fn multi_unit_cost_consumes_proportionally() {
    let (registry, _, _) = registry();
    registry
        .configure(
            "c",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_max_requests(10)),
        )
        .unwrap();
    let d = registry.check("c", Strategy::SlidingWindow, 7).unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 3);
    assert!(!registry.check("c", Strategy::SlidingWindow, 4).unwrap().allowed);
    assert!(registry.check("c", Strategy::SlidingWindow, 3).unwrap().allowed);
}

#[test]
fn refill_is_immediate_and_alerts() {
    let (registry, _, sink) = registry();
    registry
        .configure(
            "r",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_max_requests(1)),
        )
        .unwrap();
    registry.check("r", Strategy::SlidingWindow, 1).unwrap();
    assert!(!registry.check("r", Strategy::SlidingWindow, 1).unwrap().allowed);

    registry.refill("r", Strategy::SlidingWindow).unwrap();
    assert!(registry.check("r", Strategy::SlidingWindow, 1).unwrap().allowed);
    assert!(!sink.alerts_for("r").is_empty());
}

#[test]
fn configure_validation_is_all_or_nothing() {
    let (registry, _, _) = registry();
    // Valid override applies
    registry
        .configure(
            "v",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_max_requests(2)),
        )
        .unwrap();
    // Invalid one is rejected and must not disturb the existing override
    assert!(registry
        .configure(
            "v",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_max_requests(0)),
        )
        .is_err());

    assert!(registry.check("v", Strategy::SlidingWindow, 1).unwrap().allowed);
    assert!(registry.check("v", Strategy::SlidingWindow, 1).unwrap().allowed);
    assert!(!registry.check("v", Strategy::SlidingWindow, 1).unwrap().allowed);
}

#[test]
fn invalid_check_input_is_an_error() {
    let (registry, _, _) = registry();
    assert!(registry.check("", Strategy::Quota, 1).is_err());
    assert!(registry.check("x", Strategy::Quota, 0).is_err());
}

#[test]
fn strategies_do_not_share_counters() {
    let (registry, _, _) = registry();
    registry
        .configure(
            "svc",
            LimiterConfig::SlidingWindow(WindowConfig::new().with_max_requests(1)),
        )
        .unwrap();
    assert!(registry.check("svc", Strategy::SlidingWindow, 1).unwrap().allowed);
    assert!(!registry.check("svc", Strategy::SlidingWindow, 1).unwrap().allowed);
    assert!(registry.check("svc", Strategy::TokenBucket, 1).unwrap().allowed);
    assert!(registry.check("svc", Strategy::Quota, 1).unwrap().allowed);
}
