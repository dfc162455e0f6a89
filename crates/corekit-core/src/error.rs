//! Error types for corekit handlers.
//!
//! Domain handlers return [`ApiError`]. The server turns it into a status code
//! and an [`ErrorBody`]; the client decodes the same [`ErrorBody`] back out of
//! non-2xx responses.
//!
//! | Variant | Status | Code |
//! |---|---|---|
//! | `Decode` | 400 | `decode_error` |
//! | `BadRequest` | 400 | `bad_request` |
//! | `Unauthorized` | 401 | `unauthorized` |
//! | `Forbidden` | 403 | `forbidden` |
//! | `NotFound` | 404 | `not_found` |
//! | `Conflict` | 409 | `conflict` |
//! | `Validation` | 422 | `validation_error` |
//! | `Internal` | 500 | `internal_error` |
//! | `Unavailable` | 503 | `unavailable` |
//! | `Status` | explicit | explicit |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;

/// Message used for internal errors whose details must stay server-side.
const INTERNAL_MESSAGE: &str = "internal server error";

/// Error returned by domain handlers.
///
/// # Example
///
/// ```
/// use corekit_core::ApiError;
///
/// fn find_user(id: &str) -> Result<String, ApiError> {
///     if id.is_empty() {
///         return Err(ApiError::bad_request("id must not be empty"));
///     }
///     Err(ApiError::not_found(format!("user {id} not found")))
/// }
///
/// let err = find_user("42").unwrap_err();
/// assert_eq!(err.status_code().as_u16(), 404);
/// assert_eq!(err.code(), "not_found");
/// ```
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request payload could not be decoded into the handler input.
    #[error("decode error: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },

    /// The request is malformed.
    #[error("bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
    },

    /// The request is well-formed but semantically invalid.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// The requested entity does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Missing or invalid credentials.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
    },

    /// The caller may not perform this operation.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// The request conflicts with the current state of the resource.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// A dependency of the service is unavailable.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {message}")]
    Internal {
        /// Message sent to the client.
        message: String,
        /// The underlying error (logged, never sent to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// An error with an explicit status and code.
    #[error("{code}: {message}")]
    Status {
        /// HTTP status to respond with.
        status: StatusCode,
        /// Machine-readable error code.
        code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl ApiError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    ///
    /// The source is kept for logging; the client only sees `message`.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a 413 error for a request body larger than `limit` bytes.
    #[must_use]
    pub fn payload_too_large(limit: usize) -> Self {
        Self::status(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("request body exceeds {limit} bytes"),
        )
    }

    /// Creates an error with an explicit status code and error code.
    #[must_use]
    pub fn status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode { .. } | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Status { status, .. } => *status,
        }
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Decode { .. } => "decode_error",
            Self::BadRequest { .. } => "bad_request",
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::Unavailable { .. } => "unavailable",
            Self::Internal { .. } => "internal_error",
            Self::Status { code, .. } => code,
        }
    }

    /// Returns the client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Decode { message }
            | Self::BadRequest { message }
            | Self::Validation { message }
            | Self::NotFound { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::Conflict { message }
            | Self::Unavailable { message }
            | Self::Internal { message, .. }
            | Self::Status { message, .. } => message,
        }
    }

    /// Returns `true` if this error maps to a 5xx status.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Converts this error to its wire body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.message())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: INTERNAL_MESSAGE.to_string(),
            source: Some(err),
        }
    }
}

/// JSON body of every error response.
///
/// Missing fields decode as empty strings so that bodies produced by other
/// services (for example `{"message": "x"}`) still decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorBody {
    /// Creates a new error body.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The body sent when a handler panics or fails without a classification.
    #[must_use]
    pub fn internal() -> Self {
        Self::new("internal_error", INTERNAL_MESSAGE)
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::decode("x"), 400, "decode_error"),
            (ApiError::bad_request("x"), 400, "bad_request"),
            (ApiError::validation("x"), 422, "validation_error"),
            (ApiError::not_found("x"), 404, "not_found"),
            (ApiError::unauthorized("x"), 401, "unauthorized"),
            (ApiError::forbidden("x"), 403, "forbidden"),
            (ApiError::conflict("x"), 409, "conflict"),
            (ApiError::unavailable("x"), 503, "unavailable"),
            (ApiError::internal("x"), 500, "internal_error"),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_code().as_u16(), status, "{error}");
            assert_eq!(error.code(), code);
            assert_eq!(error.message(), "x");
        }
    }

    #[test]
    fn test_explicit_status() {
        let error = ApiError::status(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "slow down");
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.code(), "rate_limited");
        assert!(!error.is_server_error());
    }

    #[test]
    fn test_payload_too_large() {
        let error = ApiError::payload_too_large(1024);
        assert_eq!(error.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error.code(), "payload_too_large");
        assert_eq!(error.message(), "request body exceeds 1024 bytes");
    }

    #[test]
    fn test_anyhow_maps_to_internal_without_leaking() {
        let error: ApiError = anyhow::anyhow!("db password rejected").into();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.is_server_error());

        let body = error.to_body();
        assert_eq!(body, ErrorBody::internal());
        assert!(std::error::Error::source(&error)
            .map(|s| s.to_string().contains("db password"))
            .unwrap_or(false));
    }

    #[test]
    fn test_internal_with_source_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let error = ApiError::internal_with_source("could not persist", io);
        assert_eq!(error.to_body().message, "could not persist");
    }

    #[test]
    fn test_error_body_serialization() {
        let body = ApiError::not_found("user 7").to_body();
        let json = serde_json::to_string(&body).expect("serialization should work");
        assert_eq!(json, r#"{"code":"not_found","message":"user 7"}"#);
    }

    #[test]
    fn test_error_body_partial_decode() {
        let body: ErrorBody = serde_json::from_str(r#"{"message":"x"}"#).expect("decode");
        assert_eq!(body.code, "");
        assert_eq!(body.message, "x");
        assert_eq!(body.to_string(), "x");
    }
}
