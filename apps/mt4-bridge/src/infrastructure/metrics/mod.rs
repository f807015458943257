//! Prometheus Metrics Module
//!
//! Exposes bridge metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Requests**: Outcomes and round-trip latency of correlated requests
//! - **Frames**: Frames received per channel and decode anomalies
//! - **Link**: Logical link state and pending request count
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::link::ChannelKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "mt4_bridge_requests_total",
        "Total correlated requests by outcome"
    );
    describe_histogram!(
        "mt4_bridge_request_duration_seconds",
        "Time from sending a request frame to receiving its reply"
    );

    describe_counter!(
        "mt4_bridge_frames_received_total",
        "Total frames received by channel"
    );
    describe_counter!(
        "mt4_bridge_frame_anomalies_total",
        "Total malformed or ambiguous frames"
    );

    describe_gauge!(
        "mt4_bridge_pending_requests",
        "Requests sent and awaiting a reply"
    );
    describe_gauge!(
        "mt4_bridge_link_up",
        "1 when both channels are connected, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the outcome of a request (`ok` or an error label).
pub fn record_request(outcome: &'static str) {
    counter!("mt4_bridge_requests_total", "outcome" => outcome).increment(1);
}

/// Record the round-trip time of a completed request.
pub fn record_request_duration(duration: Duration) {
    histogram!("mt4_bridge_request_duration_seconds").record(duration.as_secs_f64());
}

/// Record a frame received on a channel.
pub fn record_frame_received(channel: ChannelKind) {
    counter!(
        "mt4_bridge_frames_received_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a decode or encode anomaly.
pub fn record_frame_anomaly() {
    counter!("mt4_bridge_frame_anomalies_total").increment(1);
}

/// Update the pending request gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_requests(count: usize) {
    gauge!("mt4_bridge_pending_requests").set(count as f64);
}

/// Update the link state gauge.
pub fn set_link_up(up: bool) {
    gauge!("mt4_bridge_link_up").set(if up { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_request("ok");
        record_frame_received(ChannelKind::Push);
        record_frame_anomaly();
        set_pending_requests(2);
        set_link_up(true);
        record_request_duration(Duration::from_millis(3));
    }

    #[test]
    fn handle_absent_until_initialized() {
        if PROMETHEUS_HANDLE.get().is_none() {
            assert!(get_metrics_handle().is_none());
        }
    }
}
