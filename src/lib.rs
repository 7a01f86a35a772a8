//! # breakwater
//!
//! In-process resilience and admission control: per-identifier circuit
//! breaking, rate limiting, and health analytics for callers that wrap
//! their own downstream I/O.
//!
//! ## Overview
//!
//! The crate tracks one record per logical identifier (an endpoint name, a
//! caller key, an IP) in a shared in-memory store. Callers run an admission
//! check and/or report success/failure around their own call; everything
//! here is a short synchronous computation over counters, with no I/O and
//! no background scheduling required.
//!
//! ## Core Philosophy
//!
//! - **Caller-driven**: outcomes are reported explicitly; there is no probe
//!   traffic and no synthetic telemetry
//! - **Lazy time**: OPEN -> HALF_OPEN and window rollovers are pure
//!   functions of "now", evaluated on read rather than fired by timers
//! - **Rejection is not an error**: a denied check is an ordinary
//!   [`Decision`] with a bounded wait hint, never an `Err`
//! - **No hidden globals**: one [`GuardRegistry`] is built at startup and
//!   passed by reference, which makes the whole layer swappable in tests
//!
//! ## Quick Start
//!
//! ```rust
//! use breakwater::{GuardRegistry, Strategy};
//!
//! fn main() -> breakwater::Result<()> {
//!     let registry = GuardRegistry::new();
//!
//!     // Admission check before doing work
//!     let decision = registry.check("ip:203.0.113.9", Strategy::TokenBucket, 1)?;
//!     if !decision.allowed {
//!         // back off for decision.retry_after_ms, if present
//!         return Ok(());
//!     }
//!
//!     // Circuit breaker around the downstream call
//!     if registry.allow("billing-api") {
//!         let ok = true; // perform the real call here
//!         if ok {
//!             registry.record_success("billing-api");
//!         } else {
//!             registry.record_failure("billing-api");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | [`GuardRegistry`]: the shared entry point and builder |
//! | [`breaker`] | Circuit breaker state machine (CLOSED/OPEN/HALF_OPEN) |
//! | [`limiter`] | Token bucket, sliding window, and quota strategies |
//! | [`analytics`] | On-demand aggregate health report |
//! | [`alert`] | Alert records and fire-and-forget sinks |
//! | [`config`] | Threshold/limit configuration with validation |
//! | [`clock`] | Injectable time source (system and manual clocks) |
//! | [`sweep`] | Optional proactive recovery sweep task |

pub mod alert;
pub mod analytics;
pub mod breaker;
pub mod clock;
pub mod config;
pub mod limiter;
pub mod registry;
pub mod sweep;

// Re-export main types for convenience
pub use alert::{
    Alert, AlertAction, AlertLevel, AlertSink, CompositeAlertSink, InMemoryAlertSink,
    NoopAlertSink, TracingAlertSink,
};
pub use analytics::{AnalyticsReport, Offender, SystemHealth};
pub use breaker::{CircuitBreaker, CircuitState, EndpointMetrics};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerConfig, LimiterConfig, QuotaConfig, TokenBucketConfig, WindowConfig};
pub use limiter::{AdmissionStats, Decision, RateLimitSnapshot, RateLimiter, Strategy};
pub use registry::{GuardRegistry, GuardRegistryBuilder};
pub use sweep::spawn_recovery_sweep;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
