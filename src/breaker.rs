//! Per-identifier circuit breaker.
//!
//! One [`EndpointMetrics`] record per identifier, created lazily on first
//! reference and held in a concurrent map. State transitions:
//!
//! - **CLOSED**: requests pass; failures are counted.
//! - **OPEN**: requests are rejected immediately.
//! - **HALF_OPEN**: limited probing; one failure re-opens, enough
//!   consecutive successes close.
//!
//! OPEN -> HALF_OPEN is not driven by a timer: it is a pure function of
//! "now minus last failure time", applied whenever the identifier's state
//! is read (and optionally by the periodic sweep in [`crate::sweep`]).

use crate::alert::{Alert, AlertAction, AlertLevel, AlertSink};
use crate::clock::Clock;
use crate::config::BreakerConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Counters for one identifier.
///
/// Invariant: `consecutive_failures > 0` implies `consecutive_successes == 0`
/// and vice versa; each event zeroes the other counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub identifier: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    /// Derived: `total_failures / total_requests * 100`.
    pub error_rate: f64,
    pub last_failure_at_ms: Option<u64>,
    pub last_success_at_ms: Option<u64>,
    pub last_state_change_at_ms: Option<u64>,
}

impl EndpointMetrics {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_requests: 0,
            total_failures: 0,
            error_rate: 0.0,
            last_failure_at_ms: None,
            last_success_at_ms: None,
            last_state_change_at_ms: None,
        }
    }

    fn recompute_error_rate(&mut self) {
        self.error_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_requests as f64 * 100.0
        };
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Shared circuit breaker over all identifiers.
pub struct CircuitBreaker {
    defaults: BreakerConfig,
    overrides: DashMap<String, BreakerConfig>,
    records: DashMap<String, EndpointMetrics>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AlertSink>,
}

impl CircuitBreaker {
    pub fn new(defaults: BreakerConfig, clock: Arc<dyn Clock>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            defaults,
            overrides: DashMap::new(),
            records: DashMap::new(),
            clock,
            sink,
        }
    }

    fn config_for(&self, identifier: &str) -> BreakerConfig {
        self.overrides
            .get(identifier)
            .map(|c| c.clone())
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Install a per-identifier threshold override.
    pub fn configure(&self, identifier: &str, config: BreakerConfig) -> crate::Result<()> {
        validate_identifier(identifier)?;
        config.validate()?;
        self.overrides.insert(identifier.to_string(), config);
        Ok(())
    }

    /// Current state, after the lazy OPEN -> HALF_OPEN recovery check.
    ///
    /// Callers should treat [`CircuitState::Open`] as "reject immediately";
    /// HALF_OPEN passes through but the outcome must be reported so the
    /// machine can converge.
    pub fn state(&self, identifier: &str) -> CircuitState {
        let cfg = self.config_for(identifier);
        let now = self.clock.now_ms();
        let (state, alert) = {
            let mut rec = self
                .records
                .entry(identifier.to_string())
                .or_insert_with(|| EndpointMetrics::new(identifier));
            let alert = Self::attempt_recovery(&mut rec, &cfg, now);
            (rec.state, alert)
        };
        if let Some(alert) = alert {
            self.sink.emit(&alert);
        }
        state
    }

    /// Convenience admission query: anything but OPEN passes.
    pub fn allow(&self, identifier: &str) -> bool {
        self.state(identifier) != CircuitState::Open
    }

    // Applies the time-based OPEN -> HALF_OPEN transition. The reference
    // timestamp is the last failure, falling back to the last state change
    // for circuits that were forced open without one.
    fn attempt_recovery(
        rec: &mut EndpointMetrics,
        cfg: &BreakerConfig,
        now: u64,
    ) -> Option<Alert> {
        if rec.state != CircuitState::Open {
            return None;
        }
        let reference = rec.last_failure_at_ms.or(rec.last_state_change_at_ms)?;
        if now.saturating_sub(reference) < cfg.open_timeout_ms {
            return None;
        }
        rec.state = CircuitState::HalfOpen;
        rec.consecutive_failures = 0;
        rec.consecutive_successes = 0;
        rec.last_state_change_at_ms = Some(now);
        tracing::debug!(identifier = %rec.identifier, "circuit half-open, probing recovery");
        Some(Alert::new(
            AlertLevel::Warning,
            rec.identifier.clone(),
            AlertAction::HalfOpen,
            format!(
                "circuit '{}' half-open after {}ms cooldown",
                rec.identifier, cfg.open_timeout_ms
            ),
            rec.to_json(),
            now,
        ))
    }

    /// Record a failed downstream outcome.
    ///
    /// Opens the circuit when the consecutive-failure threshold is reached,
    /// when the error rate exceeds its threshold (with at least
    /// `min_samples` recorded requests), or unconditionally on a HALF_OPEN
    /// probe failure.
    pub fn record_failure(&self, identifier: &str) -> Option<Alert> {
        let cfg = self.config_for(identifier);
        let now = self.clock.now_ms();
        let alert = {
            let mut rec = self
                .records
                .entry(identifier.to_string())
                .or_insert_with(|| EndpointMetrics::new(identifier));
            rec.total_requests += 1;
            rec.total_failures += 1;
            rec.consecutive_failures = rec.consecutive_failures.saturating_add(1);
            rec.consecutive_successes = 0;
            rec.last_failure_at_ms = Some(now);
            rec.recompute_error_rate();

            let should_open = match rec.state {
                CircuitState::Open => false,
                // A half-open probe failure always re-opens.
                CircuitState::HalfOpen => true,
                CircuitState::Closed => {
                    rec.consecutive_failures >= cfg.failure_threshold
                        || (rec.total_requests >= cfg.min_samples
                            && rec.error_rate > cfg.error_rate_threshold)
                }
            };
            if should_open {
                rec.state = CircuitState::Open;
                rec.last_state_change_at_ms = Some(now);
                tracing::warn!(
                    identifier = %rec.identifier,
                    consecutive_failures = rec.consecutive_failures,
                    error_rate = rec.error_rate,
                    "circuit opened"
                );
                Some(Alert::new(
                    AlertLevel::Critical,
                    rec.identifier.clone(),
                    AlertAction::Opened,
                    format!(
                        "circuit '{}' opened ({} consecutive failures, {:.1}% error rate)",
                        rec.identifier, rec.consecutive_failures, rec.error_rate
                    ),
                    rec.to_json(),
                    now,
                ))
            } else {
                None
            }
        };
        if let Some(alert) = &alert {
            self.sink.emit(alert);
        }
        alert
    }

    /// Record a successful downstream outcome.
    ///
    /// Closes a HALF_OPEN circuit once the consecutive-success threshold is
    /// reached; in any other state only the counters change.
    pub fn record_success(&self, identifier: &str) -> Option<Alert> {
        let cfg = self.config_for(identifier);
        let now = self.clock.now_ms();
        let alert = {
            let mut rec = self
                .records
                .entry(identifier.to_string())
                .or_insert_with(|| EndpointMetrics::new(identifier));
            rec.total_requests += 1;
            rec.consecutive_successes = rec.consecutive_successes.saturating_add(1);
            rec.consecutive_failures = 0;
            rec.last_success_at_ms = Some(now);
            rec.recompute_error_rate();

            if rec.state == CircuitState::HalfOpen
                && rec.consecutive_successes >= cfg.success_threshold
            {
                rec.state = CircuitState::Closed;
                rec.last_state_change_at_ms = Some(now);
                tracing::debug!(identifier = %rec.identifier, "circuit closed after recovery");
                Some(Alert::new(
                    AlertLevel::Info,
                    rec.identifier.clone(),
                    AlertAction::Closed,
                    format!(
                        "circuit '{}' closed after {} consecutive successes",
                        rec.identifier, rec.consecutive_successes
                    ),
                    rec.to_json(),
                    now,
                ))
            } else {
                None
            }
        };
        if let Some(alert) = &alert {
            self.sink.emit(alert);
        }
        alert
    }

    /// Administrative override: open the circuit regardless of counters.
    pub fn force_open(&self, identifier: &str) -> Alert {
        let now = self.clock.now_ms();
        let alert = {
            let mut rec = self
                .records
                .entry(identifier.to_string())
                .or_insert_with(|| EndpointMetrics::new(identifier));
            rec.state = CircuitState::Open;
            rec.last_state_change_at_ms = Some(now);
            tracing::warn!(identifier = %rec.identifier, "circuit forced open");
            Alert::new(
                AlertLevel::Warning,
                rec.identifier.clone(),
                AlertAction::Opened,
                format!("circuit '{}' forced open", rec.identifier),
                rec.to_json(),
                now,
            )
        };
        self.sink.emit(&alert);
        alert
    }

    /// Administrative override: close the circuit and clear the streak
    /// counters (lifetime totals are kept).
    pub fn force_close(&self, identifier: &str) -> Alert {
        let now = self.clock.now_ms();
        let alert = {
            let mut rec = self
                .records
                .entry(identifier.to_string())
                .or_insert_with(|| EndpointMetrics::new(identifier));
            rec.state = CircuitState::Closed;
            rec.consecutive_failures = 0;
            rec.consecutive_successes = 0;
            rec.last_state_change_at_ms = Some(now);
            tracing::info!(identifier = %rec.identifier, "circuit forced closed");
            Alert::new(
                AlertLevel::Info,
                rec.identifier.clone(),
                AlertAction::Closed,
                format!("circuit '{}' forced closed", rec.identifier),
                rec.to_json(),
                now,
            )
        };
        self.sink.emit(&alert);
        alert
    }

    /// Administrative override: replace the record with a fresh CLOSED one.
    pub fn reset(&self, identifier: &str) -> Alert {
        let now = self.clock.now_ms();
        let alert = {
            let mut rec = self
                .records
                .entry(identifier.to_string())
                .or_insert_with(|| EndpointMetrics::new(identifier));
            *rec = EndpointMetrics::new(identifier);
            rec.last_state_change_at_ms = Some(now);
            tracing::info!(identifier = %rec.identifier, "circuit reset");
            Alert::new(
                AlertLevel::Info,
                rec.identifier.clone(),
                AlertAction::Recovery,
                format!("circuit '{}' reset", rec.identifier),
                rec.to_json(),
                now,
            )
        };
        self.sink.emit(&alert);
        alert
    }

    /// Snapshot of one identifier, if tracked.
    pub fn snapshot(&self, identifier: &str) -> Option<EndpointMetrics> {
        self.records.get(identifier).map(|r| r.clone())
    }

    /// Snapshot of every tracked identifier, with the lazy recovery check
    /// applied (reading state counts as a check).
    pub fn snapshot_all(&self) -> Vec<EndpointMetrics> {
        let now = self.clock.now_ms();
        let mut alerts = Vec::new();
        let mut out = Vec::with_capacity(self.records.len());
        for mut entry in self.records.iter_mut() {
            let cfg = self.config_for(entry.key());
            if let Some(alert) = Self::attempt_recovery(entry.value_mut(), &cfg, now) {
                alerts.push(alert);
            }
            out.push(entry.value().clone());
        }
        for alert in &alerts {
            self.sink.emit(alert);
        }
        out
    }

    /// Apply the recovery check to every OPEN circuit; returns how many
    /// transitioned to HALF_OPEN. Used by the optional periodic sweep and
    /// observably equivalent to on-demand evaluation.
    pub fn sweep_recovery(&self) -> usize {
        let now = self.clock.now_ms();
        let mut alerts = Vec::new();
        for mut entry in self.records.iter_mut() {
            let cfg = self.config_for(entry.key());
            if let Some(alert) = Self::attempt_recovery(entry.value_mut(), &cfg, now) {
                alerts.push(alert);
            }
        }
        for alert in &alerts {
            self.sink.emit(alert);
        }
        alerts.len()
    }

    pub fn tracked_identifiers(&self) -> Vec<String> {
        self.records.iter().map(|e| e.key().clone()).collect()
    }
}

pub(crate) fn validate_identifier(identifier: &str) -> crate::Result<()> {
    if identifier.is_empty() {
        return Err(crate::Error::validation_with_context(
            "identifier must not be empty",
            crate::ErrorContext::new()
                .with_field_path("identifier")
                .with_source("admission"),
        ));
    }
    Ok(())
}
