//! Logging and metrics for corekit services.
//!
//! - **Logging**: `tracing-subscriber` registry with an `EnvFilter` and JSON
//!   or pretty output
//! - **Metrics**: a process-wide Prometheus recorder plus the standard
//!   request metrics
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `corekit_requests_total` | Counter | `method`, `route`, `status` | Total request count |
//! | `corekit_request_duration_seconds` | Histogram | `method`, `route` | Request latency |
//! | `corekit_in_flight_requests` | Gauge | - | Currently processing requests |
//!
//! # Example
//!
//! ```rust,no_run
//! use corekit_telemetry::{init_logging, metrics, LogConfig};
//!
//! init_logging(&LogConfig::production()).expect("logging");
//! metrics::install_recorder().expect("metrics");
//!
//! let _in_flight = metrics::InFlightGuard::new();
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
