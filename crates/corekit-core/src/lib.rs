//! # corekit core
//!
//! Core types shared by every corekit crate:
//!
//! - [`RequestContext`] - Per-request context carrying the request id, route
//!   parameters, headers and a cancellation token
//! - [`RequestId`] - UUID v7 request identifier
//! - [`ApiError`] - Error taxonomy mapped onto HTTP status codes
//! - [`ErrorBody`] - The `{"code", "message"}` wire shape of every error
//! - [`Logger`] - Injectable logging capability

#![doc(html_root_url = "https://docs.rs/corekit-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod logger;

pub use context::{RequestContext, RequestId, REQUEST_ID_HEADER};
pub use error::{ApiError, ApiResult, ErrorBody};
pub use logger::{Logger, MemoryLogger, TracingLogger};
pub use tracing::Level;
