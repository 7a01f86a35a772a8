//! Rate limiter engine.
//!
//! Three interchangeable admission strategies behind one contract:
//!
//! | Strategy | Shape | Defaults |
//! |----------|-------|----------|
//! | [`Strategy::TokenBucket`] | bursts up to capacity, continuous refill | 1000 capacity, 100/s |
//! | [`Strategy::SlidingWindow`] | hard ceiling per window | 500 per 60s |
//! | [`Strategy::Quota`] | long-period budget | 10000 per 24h |
//!
//! A `check` never fails for a rejected request: rejection is an ordinary
//! outcome carried in the [`Decision`], with a `retry_after_ms` hint when
//! waiting could ever help.

pub mod token_bucket;
pub mod window;

use crate::alert::{Alert, AlertAction, AlertLevel, AlertSink};
use crate::breaker::validate_identifier;
use crate::clock::Clock;
use crate::config::{LimiterConfig, QuotaConfig, TokenBucketConfig, WindowConfig};
use crate::{Error, ErrorContext, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use token_bucket::TokenBucket;
use window::FixedWindow;

/// Admission strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    TokenBucket,
    SlidingWindow,
    Quota,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TokenBucket => "token-bucket",
            Strategy::SlidingWindow => "sliding-window",
            Strategy::Quota => "quota",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "token-bucket" => Ok(Strategy::TokenBucket),
            "sliding-window" => Ok(Strategy::SlidingWindow),
            "quota" => Ok(Strategy::Quota),
            other => Err(Error::validation_with_context(
                format!("unknown strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("strategy")
                    .with_details("expected token-bucket, sliding-window, or quota")
                    .with_source("rate_limiter"),
            )),
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Whole units left in the current bucket/window.
    pub remaining: u64,
    /// When the bucket refills completely / the window rolls over.
    pub reset_at_ms: u64,
    /// Bounded wait hint. `None` on admission, and also on a rejection that
    /// waiting can never resolve (cost larger than the configured maximum).
    pub retry_after_ms: Option<u64>,
}

/// Lifetime admission counters for one `(identifier, strategy)` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionStats {
    pub total: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Read-only view of one record, for the analytics aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub identifier: String,
    pub strategy: Strategy,
    pub remaining: u64,
    pub reset_at_ms: u64,
    pub stats: AdmissionStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    identifier: String,
    strategy: Strategy,
}

impl RateKey {
    fn new(identifier: &str, strategy: Strategy) -> Self {
        Self {
            identifier: identifier.to_string(),
            strategy,
        }
    }
}

#[derive(Debug, Clone)]
enum Counter {
    Bucket(TokenBucket),
    Window(FixedWindow),
}

#[derive(Debug, Clone)]
struct RateRecord {
    counter: Counter,
    stats: AdmissionStats,
    /// Set on the first rejection of a streak, cleared on admission.
    /// Gates `threshold_exceeded` alerts to the admitted -> rejected edge.
    rejecting: bool,
}

/// Normalized strategy parameters after override resolution.
enum Effective {
    Bucket(TokenBucketConfig),
    Window { window_ms: u64, max: u64 },
}

/// Shared rate limiter over all identifiers and strategies.
pub struct RateLimiter {
    bucket_defaults: TokenBucketConfig,
    window_defaults: WindowConfig,
    quota_defaults: QuotaConfig,
    overrides: DashMap<RateKey, LimiterConfig>,
    records: DashMap<RateKey, RateRecord>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AlertSink>,
}

impl RateLimiter {
    pub fn new(
        bucket_defaults: TokenBucketConfig,
        window_defaults: WindowConfig,
        quota_defaults: QuotaConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            bucket_defaults,
            window_defaults,
            quota_defaults,
            overrides: DashMap::new(),
            records: DashMap::new(),
            clock,
            sink,
        }
    }

    fn effective(&self, key: &RateKey) -> Effective {
        match self.overrides.get(key).map(|c| c.clone()) {
            Some(LimiterConfig::TokenBucket(c)) => Effective::Bucket(c),
            Some(LimiterConfig::SlidingWindow(c)) => Effective::Window {
                window_ms: c.window_ms,
                max: c.max_requests,
            },
            Some(LimiterConfig::Quota(c)) => Effective::Window {
                window_ms: c.period_ms,
                max: c.max_per_period,
            },
            None => match key.strategy {
                Strategy::TokenBucket => Effective::Bucket(self.bucket_defaults.clone()),
                Strategy::SlidingWindow => Effective::Window {
                    window_ms: self.window_defaults.window_ms,
                    max: self.window_defaults.max_requests,
                },
                Strategy::Quota => Effective::Window {
                    window_ms: self.quota_defaults.period_ms,
                    max: self.quota_defaults.max_per_period,
                },
            },
        }
    }

    fn fresh_counter(&self, effective: &Effective, now_ms: u64) -> Counter {
        match effective {
            Effective::Bucket(cfg) => Counter::Bucket(TokenBucket::full(cfg, now_ms)),
            Effective::Window { .. } => Counter::Window(FixedWindow::starting_at(now_ms)),
        }
    }

    /// Run one admission check, consuming `cost` units on success.
    ///
    /// Returns `Err` only for invalid input (empty identifier, zero cost);
    /// rejection comes back as `Decision { allowed: false, .. }`.
    pub fn check(&self, identifier: &str, strategy: Strategy, cost: u32) -> Result<Decision> {
        validate_identifier(identifier)?;
        if cost == 0 {
            return Err(Error::validation_with_context(
                "cost must be a positive integer",
                ErrorContext::new()
                    .with_field_path("check.cost")
                    .with_source("rate_limiter"),
            ));
        }

        let key = RateKey::new(identifier, strategy);
        let effective = self.effective(&key);
        let now = self.clock.now_ms();

        let (decision, alert) = {
            let mut rec = self.records.entry(key).or_insert_with(|| RateRecord {
                counter: self.fresh_counter(&effective, now),
                stats: AdmissionStats::default(),
                rejecting: false,
            });
            // A reconfigured record whose counter shape no longer matches
            // starts over from a fresh counter.
            let mismatch = matches!(
                (&rec.counter, &effective),
                (Counter::Bucket(_), Effective::Window { .. })
                    | (Counter::Window(_), Effective::Bucket(_))
            );
            if mismatch {
                rec.counter = self.fresh_counter(&effective, now);
            }
            let decision = match (&mut rec.counter, &effective) {
                (Counter::Bucket(bucket), Effective::Bucket(cfg)) => {
                    Self::check_bucket(bucket, cfg, cost as f64, now)
                }
                (Counter::Window(win), Effective::Window { window_ms, max }) => {
                    Self::check_window(win, *window_ms, *max, cost as u64, now)
                }
                _ => unreachable!("counter shape normalized above"),
            };

            rec.stats.total += 1;
            let alert = if decision.allowed {
                rec.stats.accepted += 1;
                rec.rejecting = false;
                None
            } else {
                rec.stats.rejected += 1;
                if rec.rejecting {
                    None
                } else {
                    rec.rejecting = true;
                    tracing::warn!(
                        identifier,
                        strategy = %strategy,
                        retry_after_ms = ?decision.retry_after_ms,
                        "rate limit exceeded"
                    );
                    Some(Alert::new(
                        AlertLevel::Warning,
                        identifier,
                        AlertAction::ThresholdExceeded,
                        format!("rate limit exceeded for '{}' ({})", identifier, strategy),
                        serde_json::json!({
                            "strategy": strategy,
                            "remaining": decision.remaining,
                            "retry_after_ms": decision.retry_after_ms,
                            "stats": rec.stats,
                        }),
                        now,
                    ))
                }
            };
            (decision, alert)
        };

        if let Some(alert) = &alert {
            self.sink.emit(alert);
        }
        Ok(decision)
    }

    fn check_bucket(
        bucket: &mut TokenBucket,
        cfg: &TokenBucketConfig,
        cost: f64,
        now: u64,
    ) -> Decision {
        bucket.refill(cfg, now);
        if cost > cfg.capacity {
            // Waiting can never make this fit.
            return Decision {
                allowed: false,
                remaining: bucket.tokens.floor() as u64,
                reset_at_ms: now + bucket.time_to_full_ms(cfg),
                retry_after_ms: None,
            };
        }
        if bucket.try_take(cost) {
            Decision {
                allowed: true,
                remaining: bucket.tokens.floor() as u64,
                reset_at_ms: now + bucket.time_to_full_ms(cfg),
                retry_after_ms: None,
            }
        } else {
            Decision {
                allowed: false,
                remaining: bucket.tokens.floor() as u64,
                reset_at_ms: now + bucket.time_to_full_ms(cfg),
                retry_after_ms: Some(bucket.wait_for_ms(cfg, cost)),
            }
        }
    }

    fn check_window(
        win: &mut FixedWindow,
        window_ms: u64,
        max: u64,
        cost: u64,
        now: u64,
    ) -> Decision {
        win.roll(window_ms, now);
        if cost > max {
            return Decision {
                allowed: false,
                remaining: win.remaining(max),
                reset_at_ms: win.reset_at_ms(window_ms),
                retry_after_ms: None,
            };
        }
        if win.try_admit(cost, max) {
            Decision {
                allowed: true,
                remaining: win.remaining(max),
                reset_at_ms: win.reset_at_ms(window_ms),
                retry_after_ms: None,
            }
        } else {
            Decision {
                allowed: false,
                remaining: win.remaining(max),
                reset_at_ms: win.reset_at_ms(window_ms),
                retry_after_ms: Some(win.retry_after_ms(window_ms, now)),
            }
        }
    }

    /// Install a per-identifier override; subsequent checks use it.
    /// Never partially applied: validation happens before anything changes.
    pub fn configure(&self, identifier: &str, config: LimiterConfig) -> Result<()> {
        validate_identifier(identifier)?;
        config.validate()?;
        let strategy = match &config {
            LimiterConfig::TokenBucket(_) => Strategy::TokenBucket,
            LimiterConfig::SlidingWindow(_) => Strategy::SlidingWindow,
            LimiterConfig::Quota(_) => Strategy::Quota,
        };
        self.overrides
            .insert(RateKey::new(identifier, strategy), config);
        tracing::debug!(identifier, strategy = %strategy, "rate limit override installed");
        Ok(())
    }

    /// Administrative reset to full capacity / zero usage, without waiting
    /// for natural replenishment. Lifetime stats are kept.
    pub fn refill(&self, identifier: &str, strategy: Strategy) -> Result<()> {
        validate_identifier(identifier)?;
        let key = RateKey::new(identifier, strategy);
        let effective = self.effective(&key);
        let now = self.clock.now_ms();
        let alert = {
            let mut rec = self.records.entry(key).or_insert_with(|| RateRecord {
                counter: self.fresh_counter(&effective, now),
                stats: AdmissionStats::default(),
                rejecting: false,
            });
            rec.counter = self.fresh_counter(&effective, now);
            rec.rejecting = false;
            Alert::new(
                AlertLevel::Info,
                identifier,
                AlertAction::Recovery,
                format!("rate limit refilled for '{}' ({})", identifier, strategy),
                serde_json::json!({ "strategy": strategy, "stats": rec.stats }),
                now,
            )
        };
        self.sink.emit(&alert);
        Ok(())
    }

    /// Forget one record entirely.
    pub fn clear(&self, identifier: &str, strategy: Strategy) -> bool {
        self.records
            .remove(&RateKey::new(identifier, strategy))
            .is_some()
    }

    /// Snapshot every record, refreshing counters so `remaining` reflects
    /// the current instant.
    pub fn snapshot_all(&self) -> Vec<RateLimitSnapshot> {
        let now = self.clock.now_ms();
        let mut out = Vec::with_capacity(self.records.len());
        for mut entry in self.records.iter_mut() {
            let key = entry.key().clone();
            let effective = self.effective(&key);
            let rec = entry.value_mut();
            let (remaining, reset_at_ms) = match (&mut rec.counter, &effective) {
                (Counter::Bucket(bucket), Effective::Bucket(cfg)) => {
                    bucket.refill(cfg, now);
                    (
                        bucket.tokens.floor() as u64,
                        now + bucket.time_to_full_ms(cfg),
                    )
                }
                (Counter::Window(win), Effective::Window { window_ms, max }) => {
                    win.roll(*window_ms, now);
                    (win.remaining(*max), win.reset_at_ms(*window_ms))
                }
                _ => (0, now),
            };
            out.push(RateLimitSnapshot {
                identifier: key.identifier,
                strategy: key.strategy,
                remaining,
                reset_at_ms,
                stats: rec.stats.clone(),
            });
        }
        out
    }
}
