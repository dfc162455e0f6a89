//! Service configuration.
//!
//! A service is configured by applying [`ServiceOption`] mutators, in order,
//! to [`ServiceOptions::default`]. The result is validated once and is
//! read-only afterwards.
//!
//! # Example
//!
//! ```rust
//! use corekit_server::config::{opts, ServiceOptions};
//!
//! let options = ServiceOptions::from_options([
//!     opts::name("billing"),
//!     opts::version("1.4.2"),
//!     opts::port(9000),
//!     opts::param("region", "eu-west-1"),
//! ])
//! .unwrap();
//!
//! assert_eq!(options.addr(), "0.0.0.0:9000");
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use corekit_core::{Logger, TracingLogger};
use serde::Serialize;
use thiserror::Error;

use crate::router::ServeMux;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default time in-flight requests get to finish after shutdown starts.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default number of chunks a stream handler may buffer ahead of the client.
pub const DEFAULT_STREAM_BUFFER: usize = 32;

/// Default cap on a request body, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// A dependency probe, invoked on every `/info` request.
pub type Probe = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

/// A configuration mutator.
pub type ServiceOption = Box<dyn FnOnce(&mut ServiceOptions) + Send>;

/// Errors from invalid option combinations or unreadable settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Only one of the certificate and key files was configured.
    #[error("TLS requires both a certificate file and a key file")]
    IncompleteTls,

    /// A TLS file path was configured but empty.
    #[error("TLS {which} file path is empty")]
    EmptyTlsPath {
        /// `"certificate"` or `"key"`.
        which: &'static str,
    },

    /// The shutdown grace period is zero.
    #[error("shutdown grace period must be greater than zero")]
    ZeroShutdownGrace,

    /// The stream buffer size is zero.
    #[error("stream buffer must hold at least one chunk")]
    ZeroStreamBuffer,

    /// The request body cap is zero.
    #[error("max body size must be greater than zero")]
    ZeroMaxBodySize,

    /// A settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A settings file could not be parsed.
    #[error("invalid settings file {path}: {message}")]
    Parse {
        /// The file that was parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The settings file extension is neither `toml` nor `json`.
    #[error("unsupported settings format: {0}")]
    UnsupportedFormat(String),

    /// An environment override holds a value that does not parse.
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv {
        /// The environment variable.
        key: String,
        /// Its value.
        value: String,
    },
}

/// The assembled configuration of a service.
///
/// Fields are public so custom [`ServiceOption`] closures can set them.
pub struct ServiceOptions {
    /// Service name reported by `/info`.
    pub name: String,
    /// Version string reported by `/info`.
    pub version: String,
    /// Dependency probes reported by `/info`, keyed by name.
    pub dependencies: BTreeMap<String, Probe>,
    /// Static parameters reported by `/info`.
    pub params: BTreeMap<String, String>,
    /// Listening port. `0` picks a free port.
    pub port: u16,
    /// Bind host.
    pub host: String,
    /// TLS certificate chain (PEM).
    pub tls_cert_file: Option<PathBuf>,
    /// TLS private key (PEM).
    pub tls_key_file: Option<PathBuf>,
    /// Router to register routes on; a `PatternRouter` when unset.
    pub serve_mux: Option<Box<dyn ServeMux>>,
    /// Logger for lifecycle and request-failure messages.
    pub logger: Arc<dyn Logger>,
    /// How long in-flight requests may run after shutdown starts.
    pub shutdown_grace: Duration,
    /// Per-stream channel capacity, in chunks.
    pub stream_buffer: usize,
    /// Largest request body accepted, in bytes. Larger bodies get a 413.
    pub max_body_size: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            dependencies: BTreeMap::new(),
            params: BTreeMap::new(),
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            tls_cert_file: None,
            tls_key_file: None,
            serve_mux: None,
            logger: Arc::new(TracingLogger),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .field("params", &self.params)
            .field("port", &self.port)
            .field("host", &self.host)
            .field("tls_cert_file", &self.tls_cert_file)
            .field("tls_key_file", &self.tls_key_file)
            .field("custom_serve_mux", &self.serve_mux.is_some())
            .field("shutdown_grace", &self.shutdown_grace)
            .field("stream_buffer", &self.stream_buffer)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl ServiceOptions {
    /// Applies `options` in order over the defaults and validates the result.
    pub fn from_options<I>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ServiceOption>,
    {
        let mut assembled = Self::default();
        for option in options {
            option(&mut assembled);
        }
        assembled.validate()?;
        Ok(assembled)
    }

    /// Checks option combinations that cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => {
                if cert.as_os_str().is_empty() {
                    return Err(ConfigError::EmptyTlsPath {
                        which: "certificate",
                    });
                }
                if key.as_os_str().is_empty() {
                    return Err(ConfigError::EmptyTlsPath { which: "key" });
                }
            }
            (None, None) => {}
            _ => return Err(ConfigError::IncompleteTls),
        }

        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::ZeroShutdownGrace);
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::ZeroStreamBuffer);
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::ZeroMaxBodySize);
        }
        Ok(())
    }

    /// Returns `true` when both TLS files are configured.
    #[must_use]
    pub fn https_enabled(&self) -> bool {
        self.tls_cert_file.is_some() && self.tls_key_file.is_some()
    }

    /// The `host:port` address to bind, with IPv6 hosts bracketed.
    #[must_use]
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Option mutators, one per configurable field.
pub mod opts {
    use super::{Probe, ServiceOption};
    use crate::router::ServeMux;
    use corekit_core::Logger;
    use serde::Serialize;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    /// Sets the service name.
    pub fn name(name: impl Into<String>) -> ServiceOption {
        let name = name.into();
        Box::new(move |o| o.name = name)
    }

    /// Sets the version string.
    pub fn version(version: impl Into<String>) -> ServiceOption {
        let version = version.into();
        Box::new(move |o| o.version = version)
    }

    /// Adds a dependency probe reported under `name` by `/info`.
    ///
    /// The probe runs on every `/info` request, possibly concurrently.
    pub fn dependency<F, T>(name: impl Into<String>, probe: F) -> ServiceOption
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Serialize,
    {
        let name = name.into();
        let probe: Probe = Arc::new(move || super::probe_value(&probe()));
        Box::new(move |o| {
            o.dependencies.insert(name, probe);
        })
    }

    /// Adds a static parameter reported by `/info`.
    pub fn param(name: impl Into<String>, value: impl Into<String>) -> ServiceOption {
        let (name, value) = (name.into(), value.into());
        Box::new(move |o| {
            o.params.insert(name, value);
        })
    }

    /// Sets the listening port.
    pub fn port(port: u16) -> ServiceOption {
        Box::new(move |o| o.port = port)
    }

    /// Sets the bind host.
    pub fn host(host: impl Into<String>) -> ServiceOption {
        let host = host.into();
        Box::new(move |o| o.host = host)
    }

    /// Serves HTTPS with the given PEM certificate chain and private key.
    pub fn https(cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> ServiceOption {
        let (cert, key) = (cert_file.into(), key_file.into());
        Box::new(move |o| {
            o.tls_cert_file = Some(cert);
            o.tls_key_file = Some(key);
        })
    }

    /// Replaces the default router.
    pub fn serve_mux(mux: impl ServeMux) -> ServiceOption {
        Box::new(move |o| o.serve_mux = Some(Box::new(mux)))
    }

    /// Replaces the default `tracing` logger.
    pub fn logger(logger: Arc<dyn Logger>) -> ServiceOption {
        Box::new(move |o| o.logger = logger)
    }

    /// Sets the shutdown grace period.
    pub fn shutdown_grace(grace: Duration) -> ServiceOption {
        Box::new(move |o| o.shutdown_grace = grace)
    }

    /// Sets the per-stream channel capacity.
    pub fn stream_buffer(chunks: usize) -> ServiceOption {
        Box::new(move |o| o.stream_buffer = chunks)
    }

    /// Sets the largest accepted request body, in bytes.
    pub fn max_body_size(bytes: usize) -> ServiceOption {
        Box::new(move |o| o.max_body_size = bytes)
    }
}

fn probe_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| serde_json::Value::String(format!("probe result is not serializable: {e}")))
}
