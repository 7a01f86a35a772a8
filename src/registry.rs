//! The one shared entry point.
//!
//! A [`GuardRegistry`] owns the circuit breaker, the rate limiter, the clock,
//! and the alert sink, and is constructed once at startup and passed by
//! reference to callers. There is deliberately no process-wide singleton:
//! "one shared state per process" is the caller wiring one registry through,
//! which also makes the whole layer trivially substitutable in tests.

use crate::alert::{noop_sink, Alert, AlertSink};
use crate::analytics::{build_report, AnalyticsReport};
use crate::breaker::{CircuitBreaker, CircuitState, EndpointMetrics};
use crate::clock::{Clock, SystemClock};
use crate::config::{BreakerConfig, LimiterConfig, QuotaConfig, TokenBucketConfig, WindowConfig};
use crate::limiter::{Decision, RateLimiter, Strategy};
use crate::Result;
use std::sync::Arc;

/// Shared admission control state for one process.
pub struct GuardRegistry {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl GuardRegistry {
    /// A registry with production defaults, the system clock, and no alert
    /// sink.
    pub fn new() -> Self {
        GuardRegistryBuilder::new()
            .build()
            .expect("default configuration is valid")
    }

    pub fn builder() -> GuardRegistryBuilder {
        GuardRegistryBuilder::new()
    }

    // --- circuit breaker surface ---

    /// Current circuit state (applies the lazy OPEN -> HALF_OPEN check).
    pub fn circuit_state(&self, identifier: &str) -> CircuitState {
        self.breaker.state(identifier)
    }

    /// True unless the circuit is OPEN.
    pub fn allow(&self, identifier: &str) -> bool {
        self.breaker.allow(identifier)
    }

    pub fn record_failure(&self, identifier: &str) -> Option<Alert> {
        self.breaker.record_failure(identifier)
    }

    pub fn record_success(&self, identifier: &str) -> Option<Alert> {
        self.breaker.record_success(identifier)
    }

    pub fn force_open(&self, identifier: &str) -> Alert {
        self.breaker.force_open(identifier)
    }

    pub fn force_close(&self, identifier: &str) -> Alert {
        self.breaker.force_close(identifier)
    }

    pub fn reset(&self, identifier: &str) -> Alert {
        self.breaker.reset(identifier)
    }

    pub fn configure_breaker(&self, identifier: &str, config: BreakerConfig) -> Result<()> {
        self.breaker.configure(identifier, config)
    }

    pub fn circuit_snapshot(&self, identifier: &str) -> Option<EndpointMetrics> {
        self.breaker.snapshot(identifier)
    }

    // --- rate limiter surface ---

    /// Admission check; consumes `cost` units on success.
    pub fn check(&self, identifier: &str, strategy: Strategy, cost: u32) -> Result<Decision> {
        self.limiter.check(identifier, strategy, cost)
    }

    /// Install a per-identifier strategy override.
    pub fn configure(&self, identifier: &str, config: LimiterConfig) -> Result<()> {
        self.limiter.configure(identifier, config)
    }

    /// Administrative reset to full capacity / zero usage.
    pub fn refill(&self, identifier: &str, strategy: Strategy) -> Result<()> {
        self.limiter.refill(identifier, strategy)
    }

    // --- analytics and maintenance ---

    /// Aggregate report over every tracked identifier in both subsystems.
    pub fn analytics(&self) -> AnalyticsReport {
        build_report(
            self.breaker.snapshot_all(),
            self.limiter.snapshot_all(),
            self.clock.now_ms(),
        )
    }

    /// Proactively apply the OPEN -> HALF_OPEN check across all circuits;
    /// returns how many transitioned. Equivalent to the lazy per-check
    /// evaluation, exposed for the periodic sweep.
    pub fn sweep_recovery(&self) -> usize {
        self.breaker.sweep_recovery()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl Default for GuardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`GuardRegistry`]. Defaults: production thresholds, system clock,
/// no-op alert sink.
pub struct GuardRegistryBuilder {
    breaker_defaults: BreakerConfig,
    bucket_defaults: TokenBucketConfig,
    window_defaults: WindowConfig,
    quota_defaults: QuotaConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AlertSink>,
}

impl GuardRegistryBuilder {
    pub fn new() -> Self {
        Self {
            breaker_defaults: BreakerConfig::default(),
            bucket_defaults: TokenBucketConfig::default(),
            window_defaults: WindowConfig::default(),
            quota_defaults: QuotaConfig::default(),
            clock: Arc::new(SystemClock),
            sink: noop_sink(),
        }
    }

    pub fn breaker_defaults(mut self, config: BreakerConfig) -> Self {
        self.breaker_defaults = config;
        self
    }

    pub fn token_bucket_defaults(mut self, config: TokenBucketConfig) -> Self {
        self.bucket_defaults = config;
        self
    }

    pub fn window_defaults(mut self, config: WindowConfig) -> Self {
        self.window_defaults = config;
        self
    }

    pub fn quota_defaults(mut self, config: QuotaConfig) -> Self {
        self.quota_defaults = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validates every default before anything is constructed.
    pub fn build(self) -> Result<GuardRegistry> {
        self.breaker_defaults.validate()?;
        self.bucket_defaults.validate()?;
        self.window_defaults.validate()?;
        self.quota_defaults.validate()?;
        let breaker = CircuitBreaker::new(
            self.breaker_defaults,
            self.clock.clone(),
            self.sink.clone(),
        );
        let limiter = RateLimiter::new(
            self.bucket_defaults,
            self.window_defaults,
            self.quota_defaults,
            self.clock.clone(),
            self.sink,
        );
        Ok(GuardRegistry {
            breaker,
            limiter,
            clock: self.clock,
        })
    }
}

impl Default for GuardRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
