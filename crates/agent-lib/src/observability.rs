//! Observability infrastructure for the sync agent
//!
//! Provides:
//! - Prometheus metrics (cycles, delivery outcomes and latency, failure streak)
//! - Structured event logging with tracing

use crate::models::{DeliveryOutcome, Observation};
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Buckets for delivery round trips (in seconds)
const DELIVERY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

static GLOBAL_METRICS: OnceLock<SyncMetricsInner> = OnceLock::new();

struct SyncMetricsInner {
    cycles: IntCounterVec,
    delivery_outcomes: IntCounterVec,
    delivery_latency_seconds: Histogram,
    source_errors: IntCounterVec,
    consecutive_failures: IntGauge,
    tracked_devices: IntGauge,
}

impl SyncMetricsInner {
    fn new() -> Self {
        Self {
            cycles: register_int_counter_vec!(
                "locsync_cycles_total",
                "Poll cycles by result",
                &["status"]
            )
            .expect("Failed to register cycles_total"),

            delivery_outcomes: register_int_counter_vec!(
                "locsync_delivery_outcomes_total",
                "Observations delivered, by server outcome",
                &["outcome"]
            )
            .expect("Failed to register delivery_outcomes_total"),

            delivery_latency_seconds: register_histogram!(
                "locsync_delivery_latency_seconds",
                "Round trip time of location update requests",
                DELIVERY_BUCKETS.to_vec()
            )
            .expect("Failed to register delivery_latency_seconds"),

            source_errors: register_int_counter_vec!(
                "locsync_source_errors_total",
                "Failures reading the observation source, by kind",
                &["kind"]
            )
            .expect("Failed to register source_errors_total"),

            consecutive_failures: register_int_gauge!(
                "locsync_consecutive_failures",
                "Current streak of failed poll cycles"
            )
            .expect("Failed to register consecutive_failures"),

            tracked_devices: register_int_gauge!(
                "locsync_tracked_devices",
                "Devices with a delivery cursor"
            )
            .expect("Failed to register tracked_devices"),
        }
    }
}

/// Handle to the process-wide sync metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct SyncMetrics {
    _private: (),
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SyncMetricsInner {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new)
    }

    pub fn inc_cycle(&self, status: &str) {
        self.inner().cycles.with_label_values(&[status]).inc();
    }

    pub fn inc_outcome(&self, outcome: DeliveryOutcome) {
        self.inner()
            .delivery_outcomes
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn observe_delivery_latency(&self, duration_secs: f64) {
        self.inner().delivery_latency_seconds.observe(duration_secs);
    }

    pub fn inc_source_error(&self, kind: &str) {
        self.inner().source_errors.with_label_values(&[kind]).inc();
    }

    pub fn set_consecutive_failures(&self, count: u32) {
        self.inner().consecutive_failures.set(i64::from(count));
    }

    pub fn set_tracked_devices(&self, count: usize) {
        self.inner().tracked_devices.set(count as i64);
    }
}

/// Structured logger for agent events
#[derive(Clone)]
pub struct StructuredLogger {
    server: String,
}

impl StructuredLogger {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    pub fn log_startup(&self, version: &str, source: &str, poll_interval_secs: u64) {
        info!(
            event = "agent_started",
            server = %self.server,
            agent_version = %version,
            source = %source,
            poll_interval_secs = poll_interval_secs,
            "Location sync agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            server = %self.server,
            reason = %reason,
            "Location sync agent stopped"
        );
    }

    pub fn log_connected(&self, health: &serde_json::Value) {
        info!(
            event = "server_connected",
            server = %self.server,
            health = %health,
            "Connected to tracking server"
        );
    }

    /// Every delivery outcome is reported, none are dropped
    pub fn log_outcome(&self, observation: &Observation, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Stored => info!(
                event = "delivery_outcome",
                device_id = %observation.device_id,
                observed_at = %observation.observed_at,
                outcome = %outcome,
                "New location stored"
            ),
            DeliveryOutcome::Duplicate => info!(
                event = "delivery_outcome",
                device_id = %observation.device_id,
                observed_at = %observation.observed_at,
                outcome = %outcome,
                "Location already known to server"
            ),
            DeliveryOutcome::Failed => error!(
                event = "delivery_outcome",
                device_id = %observation.device_id,
                observed_at = %observation.observed_at,
                outcome = %outcome,
                "Failed to deliver location"
            ),
        }
    }

    pub fn log_cycle_failed(&self, error: &dyn std::error::Error, consecutive: u32, limit: u32) {
        warn!(
            event = "cycle_failed",
            server = %self.server,
            error = %error,
            consecutive_failures = consecutive,
            max_consecutive_failures = limit,
            "Poll cycle failed"
        );
    }

    pub fn log_aborted(&self, consecutive: u32) {
        error!(
            event = "loop_aborted",
            server = %self.server,
            consecutive_failures = consecutive,
            "Too many consecutive failures, stopping"
        );
    }

    pub fn log_paired(&self, credential_path: &str) {
        info!(
            event = "paired",
            server = %self.server,
            credential_path = %credential_path,
            "Paired with tracking server"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_metrics_handles_share_collectors() {
        let metrics = SyncMetrics::new();
        let other = metrics.clone();

        metrics.inc_cycle("completed");
        other.inc_outcome(DeliveryOutcome::Stored);
        metrics.observe_delivery_latency(0.05);
        metrics.inc_source_error("denied");
        metrics.set_consecutive_failures(2);
        metrics.set_tracked_devices(3);

        assert!(
            metrics
                .inner()
                .cycles
                .with_label_values(&["completed"])
                .get()
                >= 1
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("https://tracker.example");
        assert_eq!(logger.server, "https://tracker.example");
    }
}
