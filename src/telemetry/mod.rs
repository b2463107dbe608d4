//! Telemetry
//!
//! Metrics for credential and call-protection events. Logging goes through
//! the `tracing` macros at the call sites.

pub mod metrics;

pub use metrics::{AccessMetrics, InMemoryMetrics, MetricEntry, MetricLabels, NoOpMetrics};
