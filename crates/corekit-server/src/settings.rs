//! File and environment settings.
//!
//! [`ServiceSettings`] is the serializable subset of [`ServiceOptions`]:
//! everything except probes, the router and the logger. It loads from TOML or
//! JSON, takes `COREKIT_*` environment overrides and converts into option
//! mutators, so file settings and code options compose.
//!
//! ```toml
//! name = "billing"
//! version = "1.4.2"
//! port = 9000
//! shutdown_grace_secs = 10
//!
//! [params]
//! region = "eu-west-1"
//! ```
//!
//! [`ServiceOptions`]: crate::config::ServiceOptions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    opts, ConfigError, ServiceOption, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SHUTDOWN_GRACE,
    DEFAULT_MAX_BODY_SIZE, DEFAULT_STREAM_BUFFER,
};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "COREKIT_";

/// Serializable service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Bind host.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// TLS certificate chain (PEM).
    pub tls_cert_file: Option<PathBuf>,
    /// TLS private key (PEM).
    pub tls_key_file: Option<PathBuf>,
    /// Shutdown grace period in seconds.
    pub shutdown_grace_secs: u64,
    /// Per-stream channel capacity.
    pub stream_buffer: usize,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
    /// Static parameters reported by `/info`.
    pub params: BTreeMap<String, String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls_cert_file: None,
            tls_key_file: None,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            params: BTreeMap::new(),
        }
    }
}

impl ServiceSettings {
    /// Loads settings from a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or has
    /// another extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            "json" => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            _ => Err(ConfigError::UnsupportedFormat(extension.to_string())),
        }
    }

    /// Applies `COREKIT_*` environment overrides.
    ///
    /// Recognized variables: `COREKIT_NAME`, `COREKIT_VERSION`,
    /// `COREKIT_HOST`, `COREKIT_PORT`, `COREKIT_TLS_CERT_FILE`,
    /// `COREKIT_TLS_KEY_FILE`, `COREKIT_SHUTDOWN_GRACE_SECS` and
    /// `COREKIT_MAX_BODY_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a numeric variable does not
    /// parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`, keyed by the full
    /// environment variable name.
    ///
    /// # Errors
    ///
    /// Same as [`with_env_overrides`](Self::with_env_overrides).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(name) = var("NAME") {
            self.name = name;
        }
        if let Some(version) = var("VERSION") {
            self.version = version;
        }
        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = parse_env("PORT", port)?;
        }
        if let Some(cert) = var("TLS_CERT_FILE") {
            self.tls_cert_file = Some(PathBuf::from(cert));
        }
        if let Some(key) = var("TLS_KEY_FILE") {
            self.tls_key_file = Some(PathBuf::from(key));
        }
        if let Some(grace) = var("SHUTDOWN_GRACE_SECS") {
            self.shutdown_grace_secs = parse_env("SHUTDOWN_GRACE_SECS", grace)?;
        }
        if let Some(size) = var("MAX_BODY_SIZE") {
            self.max_body_size = parse_env("MAX_BODY_SIZE", size)?;
        }

        Ok(self)
    }

    /// Converts the settings into option mutators.
    ///
    /// Options passed after these override them.
    #[must_use]
    pub fn to_options(&self) -> Vec<ServiceOption> {
        let mut options = vec![
            opts::name(self.name.clone()),
            opts::version(self.version.clone()),
            opts::host(self.host.clone()),
            opts::port(self.port),
            opts::shutdown_grace(Duration::from_secs(self.shutdown_grace_secs)),
            opts::stream_buffer(self.stream_buffer),
            opts::max_body_size(self.max_body_size),
        ];

        let cert = self.tls_cert_file.clone();
        let key = self.tls_key_file.clone();
        options.push(Box::new(move |o| {
            o.tls_cert_file = cert;
            o.tls_key_file = key;
        }));

        options.extend(
            self.params
                .iter()
                .map(|(name, value)| opts::param(name.clone(), value.clone())),
        );
        options
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: format!("{ENV_PREFIX}{name}"),
        value,
    })
}
