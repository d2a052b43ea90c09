//! Metrics definitions for the Room Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Room Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `event`: bounded by signaling event names (~10 values)
//! - `outcome`: `success` or `error`
//! - `operation`: bounded by engine operations (~7 values)
//! - `actor_type`: 1 value (room)
//!
//! Room ids and connection ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Signaling events include engine round-trips (transport/consumer creation)
        .set_buckets_for_metric(
            Matcher::Prefix("rc_signaling_event".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set signaling event buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Room & Peer Metrics (Gauges)
// ============================================================================

/// Set the number of rooms in the registry.
///
/// Metric: `rc_rooms_active`
pub fn set_rooms_active(count: usize) {
    // usize to f64 conversion is safe for realistic room counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_rooms_active").set(count as f64);
}

/// Set the number of peer sessions across all rooms.
///
/// Metric: `rc_peers_active`
pub fn set_peers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_peers_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `rc_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}

// ============================================================================
// Signaling Metrics
// ============================================================================

/// Record one processed signaling event.
///
/// Metrics: `rc_signaling_events_total`, `rc_signaling_event_duration_seconds`
/// Labels: `event`, `outcome`
pub fn record_signaling_event(event: &'static str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "error" };
    counter!("rc_signaling_events_total", "event" => event, "outcome" => outcome).increment(1);
    histogram!("rc_signaling_event_duration_seconds", "event" => event)
        .record(duration.as_secs_f64());
}

/// Record a notification dropped because a peer's queue was full.
///
/// Metric: `rc_notifications_dropped_total`
/// Labels: `event`
pub fn record_notification_dropped(event: &'static str) {
    counter!("rc_notifications_dropped_total", "event" => event).increment(1);
}

// ============================================================================
// Engine & Actor Health Metrics (Counters)
// ============================================================================

/// Record a media engine failure.
///
/// Metric: `rc_engine_errors_total`
/// Labels: `operation`
pub fn record_engine_error(operation: &'static str) {
    counter!("rc_engine_errors_total", "operation" => operation).increment(1);
}

/// Record an actor task panic.
///
/// Metric: `rc_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("rc_actor_panics_total", "actor_type" => actor_type).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder the metrics macros are no-ops; these
    // tests only guard against panics in label handling.
    #[test]
    fn test_recording_without_recorder_is_noop() {
        set_rooms_active(3);
        set_peers_active(7);
        set_actor_mailbox_depth("room", 12);
        record_signaling_event("joinRoom", true, Duration::from_millis(4));
        record_signaling_event("consume", false, Duration::from_millis(9));
        record_notification_dropped("newProducer");
        record_engine_error("create_router");
        record_actor_panic("room");
    }
}
