//! Prometheus metrics for corekit services.
//!
//! A single Prometheus recorder is installed per process and shared by every
//! service instance; `/metrics` renders it.
//!
//! # Example
//!
//! ```rust
//! use corekit_telemetry::metrics::{install_recorder, record_request, render};
//! use std::time::Duration;
//!
//! install_recorder().unwrap();
//! record_request("GET", "/users/:id", 200, Duration::from_millis(45));
//! assert!(render().unwrap().contains("corekit_requests_total"));
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Counter of completed requests.
pub const REQUESTS_TOTAL: &str = "corekit_requests_total";

/// Histogram of request durations in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "corekit_request_duration_seconds";

/// Gauge of requests currently being processed.
pub const IN_FLIGHT_REQUESTS: &str = "corekit_in_flight_requests";

/// Content type of the Prometheus text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

// 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics handle for rendering, or the reason installation failed.
static METRICS_HANDLE: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Installs the process-wide Prometheus recorder.
///
/// Idempotent: later calls return the handle installed by the first one.
/// Concurrent callers block until the first installation finished.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the recorder cannot be built or
/// another global recorder was installed by someone else.
pub fn install_recorder() -> TelemetryResult<&'static PrometheusHandle> {
    METRICS_HANDLE
        .get_or_init(build_and_install)
        .as_ref()
        .map_err(|e| TelemetryError::MetricsInit(e.clone()))
}

fn build_and_install() -> Result<PrometheusHandle, String> {
    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| e.to_string())?
        .build_recorder();
    let handle = recorder.handle();

    metrics::set_global_recorder(recorder)
        .map_err(|_| "a global metrics recorder is already installed".to_string())?;
    register_metric_descriptions();

    Ok(handle)
}

/// Returns the global metrics handle if installed.
pub fn handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get().and_then(|result| result.as_ref().ok())
}

/// Renders metrics in the Prometheus text format.
///
/// Returns `None` if no recorder was installed.
#[must_use]
pub fn render() -> Option<String> {
    handle().map(|handle| {
        handle.run_upkeep();
        handle.render()
    })
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        IN_FLIGHT_REQUESTS,
        "Number of HTTP requests currently being processed"
    );
}

/// Records a completed request.
///
/// `route` is the registered pattern, not the concrete path, so that label
/// cardinality stays bounded.
pub fn record_request(method: &str, route: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Guard that decrements in-flight requests on drop.
///
/// The gauge is decremented even if the handler panics.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        let first = install_recorder().expect("first install");
        let second = install_recorder().expect("second install");
        assert!(std::ptr::eq(first, second));
        assert!(handle().is_some());
    }

    #[test]
    fn test_record_request_is_rendered() {
        install_recorder().expect("install");
        record_request("GET", "/telemetry-test/:id", 200, Duration::from_millis(12));

        let output = render().expect("recorder installed");
        assert!(output.contains(REQUESTS_TOTAL));
        assert!(output.contains(r#"route="/telemetry-test/:id""#));
        assert!(output.contains(REQUEST_DURATION_SECONDS));
    }

    #[test]
    fn test_in_flight_guard() {
        install_recorder().expect("install");
        let guard = InFlightGuard::new();
        assert!(render().expect("rendered").contains(IN_FLIGHT_REQUESTS));
        drop(guard);
    }
}
