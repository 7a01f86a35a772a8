//! Alert records and sinks.
//!
//! Both subsystems emit an [`Alert`] at the moment of a notable event (state
//! transition, threshold breach, administrative override). Delivery is
//! fire-and-forget: a sink that fails must never propagate into the caller's
//! admission path, so [`AlertSink::emit`] is infallible from the caller's
//! point of view and sinks swallow their own errors.
//!
//! | Sink | Purpose |
//! |------|---------|
//! | [`NoopAlertSink`] | Default; discards everything |
//! | [`InMemoryAlertSink`] | Bounded buffer for tests and introspection |
//! | [`TracingAlertSink`] | Forwards to `tracing` events |
//! | [`CompositeAlertSink`] | Fans out to multiple sinks |

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// What happened to the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Opened,
    Closed,
    HalfOpen,
    ThresholdExceeded,
    Recovery,
}

/// Immutable alert record handed to the configured sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub identifier: String,
    pub action: AlertAction,
    pub message: String,
    /// Snapshot of the metrics that triggered the alert.
    pub metrics: serde_json::Value,
    /// Epoch milliseconds at emission.
    pub timestamp_ms: u64,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        identifier: impl Into<String>,
        action: AlertAction,
        message: impl Into<String>,
        metrics: serde_json::Value,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            level,
            identifier: identifier.into(),
            action,
            message: message.into(),
            metrics,
            timestamp_ms,
        }
    }
}

/// Destination for alert records.
///
/// Implementations must be cheap and non-blocking; the admission path calls
/// `emit` synchronously while holding no locks of its own.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &Alert);
}

/// Discards all alerts (the default).
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn emit(&self, _: &Alert) {}
}

/// Returns a no-op alert sink.
pub fn noop_sink() -> Arc<dyn AlertSink> {
    Arc::new(NoopAlertSink)
}

/// Bounded in-memory sink for tests. Oldest alerts are evicted first.
pub struct InMemoryAlertSink {
    alerts: RwLock<VecDeque<Alert>>,
    max_alerts: usize,
}

impl InMemoryAlertSink {
    pub fn new(max: usize) -> Self {
        Self {
            alerts: RwLock::new(VecDeque::new()),
            max_alerts: max,
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alerts_for(&self, identifier: &str) -> Vec<Alert> {
        self.alerts()
            .into_iter()
            .filter(|a| a.identifier == identifier)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut alerts) = self.alerts.write() {
            alerts.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAlertSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl AlertSink for InMemoryAlertSink {
    fn emit(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.write() {
            alerts.push_back(alert.clone());
            if alerts.len() > self.max_alerts {
                alerts.pop_front();
            }
        }
    }
}

/// Forwards alerts to `tracing` at a level matching the alert severity.
#[derive(Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Info => tracing::info!(
                identifier = %alert.identifier,
                action = ?alert.action,
                "{}",
                alert.message
            ),
            AlertLevel::Warning => tracing::warn!(
                identifier = %alert.identifier,
                action = ?alert.action,
                "{}",
                alert.message
            ),
            AlertLevel::Critical => tracing::error!(
                identifier = %alert.identifier,
                action = ?alert.action,
                "{}",
                alert.message
            ),
        }
    }
}

/// Fans out to multiple sinks.
pub struct CompositeAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl CompositeAlertSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Default for CompositeAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink for CompositeAlertSink {
    fn emit(&self, alert: &Alert) {
        for sink in &self.sinks {
            sink.emit(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(identifier: &str) -> Alert {
        Alert::new(
            AlertLevel::Warning,
            identifier,
            AlertAction::ThresholdExceeded,
            "limit hit",
            serde_json::json!({"remaining": 0}),
            1_000,
        )
    }

    #[test]
    fn test_in_memory_sink_records() {
        let sink = InMemoryAlertSink::new(10);
        sink.emit(&sample("a"));
        sink.emit(&sample("b"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.alerts_for("a").len(), 1);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_in_memory_sink_bounded() {
        let sink = InMemoryAlertSink::new(3);
        for i in 0..5 {
            sink.emit(&sample(&format!("id-{}", i)));
        }
        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 3);
        // Oldest evicted first
        assert_eq!(alerts[0].identifier, "id-2");
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(InMemoryAlertSink::default());
        let b = Arc::new(InMemoryAlertSink::default());
        let composite = CompositeAlertSink::new()
            .add_sink(a.clone())
            .add_sink(b.clone());
        composite.emit(&sample("x"));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_alert_serialization() {
        let alert = sample("svc");
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["action"], "threshold_exceeded");
        assert_eq!(json["identifier"], "svc");
    }

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Info < AlertLevel::Warning);
        assert!(AlertLevel::Warning < AlertLevel::Critical);
    }
}
