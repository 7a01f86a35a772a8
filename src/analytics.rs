//! On-demand aggregation across both subsystems.
//!
//! The report is a pure function of the current snapshots: state counts,
//! mean error rate (identifiers that have seen no requests are excluded
//! from the mean, not counted as zero), a derived health grade, offender
//! ranking, and deterministic recommendation strings.

use crate::breaker::{CircuitState, EndpointMetrics};
use crate::limiter::RateLimitSnapshot;
use serde::Serialize;
use std::collections::HashMap;

/// Derived system-wide health grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Critical,
}

/// One entry in the offender ranking: failed circuit events plus rejected
/// admission checks, summed per identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Offender {
    pub identifier: String,
    pub failed_or_rejected: u64,
}

/// Full aggregate report over the metric store.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub generated_at_ms: u64,
    pub circuits: Vec<EndpointMetrics>,
    pub rate_limits: Vec<RateLimitSnapshot>,
    pub open_circuits: usize,
    pub half_open_circuits: usize,
    pub closed_circuits: usize,
    pub average_error_rate: f64,
    pub system_health: SystemHealth,
    pub top_offenders: Vec<Offender>,
    pub recommendations: Vec<String>,
}

const MAX_OFFENDERS: usize = 10;

pub(crate) fn build_report(
    circuits: Vec<EndpointMetrics>,
    rate_limits: Vec<RateLimitSnapshot>,
    generated_at_ms: u64,
) -> AnalyticsReport {
    let open_circuits = circuits
        .iter()
        .filter(|c| c.state == CircuitState::Open)
        .count();
    let half_open_circuits = circuits
        .iter()
        .filter(|c| c.state == CircuitState::HalfOpen)
        .count();
    let closed_circuits = circuits
        .iter()
        .filter(|c| c.state == CircuitState::Closed)
        .count();

    let active: Vec<&EndpointMetrics> = circuits
        .iter()
        .filter(|c| c.total_requests > 0)
        .collect();
    let average_error_rate = if active.is_empty() {
        0.0
    } else {
        active.iter().map(|c| c.error_rate).sum::<f64>() / active.len() as f64
    };

    let tracked = circuits.len();
    let system_health = if (tracked > 0 && open_circuits as f64 > tracked as f64 * 0.5)
        || average_error_rate > 50.0
    {
        SystemHealth::Critical
    } else if open_circuits > 0 || average_error_rate > 25.0 {
        SystemHealth::Degraded
    } else {
        SystemHealth::Healthy
    };

    let mut tallies: HashMap<&str, u64> = HashMap::new();
    for c in &circuits {
        *tallies.entry(c.identifier.as_str()).or_default() += c.total_failures;
    }
    for r in &rate_limits {
        *tallies.entry(r.identifier.as_str()).or_default() += r.stats.rejected;
    }
    let mut top_offenders: Vec<Offender> = tallies
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(identifier, failed_or_rejected)| Offender {
            identifier: identifier.to_string(),
            failed_or_rejected,
        })
        .collect();
    top_offenders.sort_by(|a, b| {
        b.failed_or_rejected
            .cmp(&a.failed_or_rejected)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    top_offenders.truncate(MAX_OFFENDERS);

    let rejecting = rate_limits.iter().filter(|r| r.stats.rejected > 0).count();
    let recommendations = recommend(
        open_circuits,
        average_error_rate,
        rejecting,
        top_offenders.first(),
    );

    AnalyticsReport {
        generated_at_ms,
        circuits,
        rate_limits,
        open_circuits,
        half_open_circuits,
        closed_circuits,
        average_error_rate,
        system_health,
        top_offenders,
        recommendations,
    }
}

fn recommend(
    open_circuits: usize,
    average_error_rate: f64,
    rejecting_records: usize,
    worst: Option<&Offender>,
) -> Vec<String> {
    let mut out = Vec::new();
    if open_circuits > 0 {
        out.push(format!(
            "{} circuit(s) open; investigate downstream dependency health",
            open_circuits
        ));
    }
    if average_error_rate > 50.0 {
        out.push(format!(
            "average error rate {:.1}% exceeds 50%; shed load or review failing endpoints",
            average_error_rate
        ));
    } else if average_error_rate > 25.0 {
        out.push(format!(
            "average error rate {:.1}% is elevated; monitor closely",
            average_error_rate
        ));
    }
    if rejecting_records > 0 {
        out.push(format!(
            "rate limits rejecting traffic on {} record(s); review capacity or client behavior",
            rejecting_records
        ));
    }
    if let Some(worst) = worst {
        out.push(format!(
            "'{}' leads failed/rejected events ({}); consider isolating it",
            worst.identifier, worst.failed_or_rejected
        ));
    }
    if out.is_empty() {
        out.push("all circuits closed and error rates nominal; no action needed".to_string());
    }
    out
}
