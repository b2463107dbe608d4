//! Metrics
//!
//! Access layer metrics interfaces and implementations.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Access layer metrics interface.
pub trait AccessMetrics: Send + Sync {
    /// Record an authorization-code exchange.
    fn record_token_exchange(&self, success: bool);

    /// Record a refresh round trip.
    fn record_token_refresh(&self, success: bool);

    /// Record a caller that reused a refresh performed by another caller.
    fn record_refresh_coalesced(&self);

    /// Record an attempt made by the executor.
    fn record_attempt(&self, target: &str);

    /// Record a scheduled retry.
    fn record_retry(&self, target: &str, delay: Duration);

    /// Record a call rejected by an open breaker.
    fn record_circuit_rejection(&self, target: &str);

    /// Record a breaker state change.
    fn record_circuit_state(&self, target: &str, state: &str);

    /// Record a terminal error.
    fn record_error(&self, kind: &str, target: &str);
}

/// No-op metrics implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl AccessMetrics for NoOpMetrics {
    fn record_token_exchange(&self, _success: bool) {}
    fn record_token_refresh(&self, _success: bool) {}
    fn record_refresh_coalesced(&self) {}
    fn record_attempt(&self, _target: &str) {}
    fn record_retry(&self, _target: &str, _delay: Duration) {}
    fn record_circuit_rejection(&self, _target: &str) {}
    fn record_circuit_state(&self, _target: &str, _state: &str) {}
    fn record_error(&self, _kind: &str, _target: &str) {}
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Count entries by name.
    pub fn count(&self, name: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.name == name).count()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.entries.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

impl AccessMetrics for InMemoryMetrics {
    fn record_token_exchange(&self, success: bool) {
        self.record("token_exchange", 1.0, &[("outcome", outcome(success))]);
    }

    fn record_token_refresh(&self, success: bool) {
        self.record("token_refresh", 1.0, &[("outcome", outcome(success))]);
    }

    fn record_refresh_coalesced(&self) {
        self.record("token_refresh_coalesced", 1.0, &[]);
    }

    fn record_attempt(&self, target: &str) {
        self.record("executor_attempt", 1.0, &[("target", target)]);
    }

    fn record_retry(&self, target: &str, delay: Duration) {
        self.record(
            "executor_retry_delay_ms",
            delay.as_millis() as f64,
            &[("target", target)],
        );
    }

    fn record_circuit_rejection(&self, target: &str) {
        self.record("circuit_rejection", 1.0, &[("target", target)]);
    }

    fn record_circuit_state(&self, target: &str, state: &str) {
        self.record("circuit_state", 1.0, &[("target", target), ("state", state)]);
    }

    fn record_error(&self, kind: &str, target: &str) {
        self.record("error", 1.0, &[("kind", kind), ("target", target)]);
    }
}
