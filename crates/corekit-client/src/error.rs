//! Client error types.

use corekit_core::ErrorBody;
use http::{Method, StatusCode};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by [`HttpClient`](crate::HttpClient).
///
/// Every variant names the method and path of the failed call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The service answered `404 Not Found`.
    #[error("{method} {path}: not found")]
    NotFound {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },

    /// The service answered with another non-2xx status.
    #[error("{method} {path}: {status}: {body}")]
    Api {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Response status.
        status: StatusCode,
        /// Decoded error body.
        body: ErrorBody,
    },

    /// The payload could not be serialized.
    #[error("{method} {path}: failed to encode request: {source}")]
    Encode {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A 2xx response body did not decode into the expected type.
    #[error("{method} {path}: failed to decode {status} response: {source}")]
    Decode {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Response status.
        status: StatusCode,
        /// Deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The request could not be sent or the response not read.
    #[error("{method} {path}: transport error: {source}")]
    Transport {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// Underlying error.
        #[source]
        source: TransportError,
    },

    /// The request could not be built, typically because of a bad URL.
    #[error("{method} {path}: invalid request: {message}")]
    InvalidRequest {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
        /// What was wrong.
        message: String,
    },
}

impl ClientError {
    /// Method of the failed call.
    #[must_use]
    pub fn method(&self) -> &Method {
        match self {
            Self::NotFound { method, .. }
            | Self::Api { method, .. }
            | Self::Encode { method, .. }
            | Self::Decode { method, .. }
            | Self::Transport { method, .. }
            | Self::InvalidRequest { method, .. } => method,
        }
    }

    /// Path of the failed call.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path, .. }
            | Self::Api { path, .. }
            | Self::Encode { path, .. }
            | Self::Decode { path, .. }
            | Self::Transport { path, .. }
            | Self::InvalidRequest { path, .. } => path,
        }
    }

    /// Response status, if the service answered.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::Api { status, .. } | Self::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error body of an [`Api`](Self::Api) error.
    #[must_use]
    pub fn error_body(&self) -> Option<&ErrorBody> {
        match self {
            Self::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Returns `true` for [`NotFound`](Self::NotFound).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
