//! Prometheus metric definitions for the Live Poll service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `poll_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: accepted, rejected, already_voted
//! - `trigger`: all_voted, timer, departure
//! - `message_type`: one per `SessionMessage` variant (7 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Actor message handling is in-memory; expect sub-millisecond
        .set_buckets_for_metric(
            Matcher::Prefix("poll_message".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Gauges
// ============================================================================

/// Set the number of registered participants.
///
/// Metric: `poll_participants_active`
pub fn set_participants_active(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("poll_participants_active").set(count as f64);
}

/// Set the session actor's mailbox depth.
///
/// Metric: `poll_actor_mailbox_depth`
///
/// High values indicate the actor is falling behind.
pub fn set_actor_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("poll_actor_mailbox_depth").set(depth as f64);
}

// ============================================================================
// Round & Vote Counters
// ============================================================================

/// Metric: `poll_rounds_started_total`
pub fn record_round_started() {
    counter!("poll_rounds_started_total").increment(1);
}

/// Record a vote outcome.
///
/// Metric: `poll_votes_total`
/// Labels: `outcome` (accepted, rejected, already_voted)
pub fn record_vote(outcome: &'static str) {
    counter!("poll_votes_total", "outcome" => outcome).increment(1);
}

/// Record a round reaching its final state.
///
/// Metric: `poll_rounds_finalized_total`
/// Labels: `trigger` (all_voted, timer, departure)
pub fn record_round_finalized(trigger: &'static str) {
    counter!("poll_rounds_finalized_total", "trigger" => trigger).increment(1);
}

// ============================================================================
// Latency
// ============================================================================

/// Record how long the session actor spent on one message.
///
/// Metric: `poll_message_latency_seconds`
/// Labels: `message_type`
pub fn record_message_latency(message_type: &'static str, duration: Duration) {
    histogram!("poll_message_latency_seconds", "message_type" => message_type)
        .record(duration.as_secs_f64());
}
