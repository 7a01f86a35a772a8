//! Token bucket record and refill math.

use crate::config::TokenBucketConfig;
use serde::{Deserialize, Serialize};

/// Per-identifier token bucket. Refilled lazily on every check; `tokens`
/// stays within `[0, capacity]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucket {
    pub tokens: f64,
    pub last_refill_at_ms: u64,
}

impl TokenBucket {
    /// A bucket starts full.
    pub fn full(config: &TokenBucketConfig, now_ms: u64) -> Self {
        Self {
            tokens: config.capacity,
            last_refill_at_ms: now_ms,
        }
    }

    /// Credit tokens for the elapsed time, clamped to capacity.
    ///
    /// The clamp applies even with zero elapsed time: a reconfiguration may
    /// have shrunk `capacity` below the tokens the record still holds.
    pub fn refill(&mut self, config: &TokenBucketConfig, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.last_refill_at_ms);
        if elapsed_ms > 0 {
            let credit = elapsed_ms as f64 / 1000.0 * config.refill_per_sec;
            self.tokens += credit;
            self.last_refill_at_ms = now_ms;
        }
        self.tokens = self.tokens.min(config.capacity);
    }

    /// Consume `cost` tokens if available. Assumes `refill` ran first.
    pub fn try_take(&mut self, cost: f64) -> bool {
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Milliseconds until `cost` tokens would be available, rounded up.
    pub fn wait_for_ms(&self, config: &TokenBucketConfig, cost: f64) -> u64 {
        let deficit = (cost - self.tokens).max(0.0);
        (deficit / config.refill_per_sec * 1000.0).ceil() as u64
    }

    /// Milliseconds until the bucket would be full again, rounded up.
    pub fn time_to_full_ms(&self, config: &TokenBucketConfig) -> u64 {
        let deficit = (config.capacity - self.tokens).max(0.0);
        (deficit / config.refill_per_sec * 1000.0).ceil() as u64
    }
}
