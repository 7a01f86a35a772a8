//! Configuration records for the circuit breaker and the three admission
//! strategies.
//!
//! Every config carries production defaults, a `with_*` builder surface, and
//! a `validate()` that rejects malformed values at the `configure` boundary
//! before anything is applied.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

/// Circuit breaker thresholds for one identifier (or the global default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open a CLOSED circuit.
    pub failure_threshold: u32,
    /// Consecutive successes that close a HALF_OPEN circuit.
    pub success_threshold: u32,
    /// Time an OPEN circuit waits before allowing a HALF_OPEN probe.
    pub open_timeout_ms: u64,
    /// Error-rate percentage (strictly above opens the circuit).
    pub error_rate_threshold: f64,
    /// Minimum recorded requests before the error-rate trigger applies.
    /// Below this floor only the consecutive-failure trigger can open.
    pub min_samples: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout_ms: 60_000,
            error_rate_threshold: 50.0,
            min_samples: 10,
        }
    }
}

impl BreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_open_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.open_timeout_ms = timeout_ms;
        self
    }

    pub fn with_error_rate_threshold(mut self, percent: f64) -> Self {
        self.error_rate_threshold = percent;
        self
    }

    pub fn with_min_samples(mut self, min_samples: u64) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(invalid("failure_threshold", "must be at least 1"));
        }
        if self.success_threshold == 0 {
            return Err(invalid("success_threshold", "must be at least 1"));
        }
        if !self.error_rate_threshold.is_finite() || self.error_rate_threshold < 0.0 {
            return Err(invalid(
                "error_rate_threshold",
                "must be a finite non-negative percentage",
            ));
        }
        Ok(())
    }
}

/// Token bucket parameters. Tolerates bursts up to `capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000.0,
            refill_per_sec: 100.0,
        }
    }
}

impl TokenBucketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_refill_per_sec(mut self, rate: f64) -> Self {
        self.refill_per_sec = rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(invalid("capacity", "must be finite and positive"));
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(invalid("refill_per_sec", "must be finite and positive"));
        }
        Ok(())
    }
}

/// Fixed-window parameters. Hard ceiling per window, no bursting beyond it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub window_ms: u64,
    pub max_requests: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 500,
        }
    }
}

impl WindowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn with_max_requests(mut self, max: u64) -> Self {
        self.max_requests = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(invalid("window_ms", "must be positive"));
        }
        if self.max_requests == 0 {
            return Err(invalid("max_requests", "must be at least 1"));
        }
        Ok(())
    }
}

/// Long-period budget cap. Same mechanics as [`WindowConfig`], defaults
/// sized for daily fairness enforcement rather than burst smoothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub period_ms: u64,
    pub max_per_period: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            period_ms: 86_400_000, // 24h
            max_per_period: 10_000,
        }
    }
}

impl QuotaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period_ms(mut self, period_ms: u64) -> Self {
        self.period_ms = period_ms;
        self
    }

    pub fn with_max_per_period(mut self, max: u64) -> Self {
        self.max_per_period = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_ms == 0 {
            return Err(invalid("period_ms", "must be positive"));
        }
        if self.max_per_period == 0 {
            return Err(invalid("max_per_period", "must be at least 1"));
        }
        Ok(())
    }
}

/// Per-identifier strategy override installed via `configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum LimiterConfig {
    TokenBucket(TokenBucketConfig),
    SlidingWindow(WindowConfig),
    Quota(QuotaConfig),
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            LimiterConfig::TokenBucket(c) => c.validate(),
            LimiterConfig::SlidingWindow(c) => c.validate(),
            LimiterConfig::Quota(c) => c.validate(),
        }
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::validation_with_context(
        format!("invalid {}", field),
        ErrorContext::new()
            .with_field_path(format!("config.{}", field))
            .with_details(details)
            .with_source("config"),
    )
}
