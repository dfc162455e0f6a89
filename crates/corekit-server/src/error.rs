//! Server error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by [`Service::run`](crate::Service::run) and
/// [`Service::serve`](crate::Service::serve).
///
/// All of them are startup errors; once the listener is up, failures of
/// individual connections are logged and never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured address.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TLS certificate or key could not be loaded.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// I/O error while setting up the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid service configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServerError {
    pub(crate) fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }
}
