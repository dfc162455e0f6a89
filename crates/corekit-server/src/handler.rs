//! Typed API handler wrapper.
//!
//! [`api_handler`] turns an async domain function
//! `(RequestContext, I) -> Result<O, ApiError>` into a [`RouteHandler`]:
//!
//! - the input is decoded from the JSON body, or from the query string when
//!   the body is empty, or from JSON `null` when both are empty
//! - `Ok(output)` becomes `200 OK` with a JSON body
//! - `Err(error)` becomes the error's status with a `{"code", "message"}`
//!   body, and is logged (5xx at error level, 4xx at warn level)
//! - a panic becomes a generic 500 and the connection keeps serving
//!
//! Every wrapped request is recorded in the request metrics.
//!
//! # Example
//!
//! ```rust
//! use corekit_core::{ApiError, RequestContext, TracingLogger};
//! use corekit_server::handler::api_handler;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Greeting {
//!     message: String,
//! }
//!
//! async fn greet(_ctx: RequestContext, input: Greet) -> Result<Greeting, ApiError> {
//!     Ok(Greeting {
//!         message: format!("Hello, {}!", input.name),
//!     })
//! }
//!
//! let handler = api_handler(greet, Arc::new(TracingLogger));
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use corekit_core::{ApiError, Logger, RequestContext};
use corekit_telemetry::metrics::{record_request, InFlightGuard};
use futures_util::FutureExt;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::response::{error_response, internal_error_response, try_json_response, HttpRequest};
use crate::router::{RouteFuture, RouteHandler};

/// Wraps a typed async handler into a [`RouteHandler`].
pub fn api_handler<I, O, F, Fut>(handler: F, logger: Arc<dyn Logger>) -> RouteHandler
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |ctx: RequestContext, request: HttpRequest| -> RouteFuture {
        let handler = Arc::clone(&handler);
        let logger = Arc::clone(&logger);

        Box::pin(async move {
            let _in_flight = InFlightGuard::new();
            let route = ctx.route().unwrap_or(ctx.path()).to_string();

            let response = match decode_input::<I>(ctx.query(), request.body()) {
                Err(error) => {
                    log_failure(logger.as_ref(), &ctx, &error);
                    error_response(&error)
                }
                Ok(input) => {
                    let call_ctx = ctx.clone();
                    let outcome = AssertUnwindSafe(async move { handler(call_ctx, input).await })
                        .catch_unwind()
                        .await;

                    match outcome {
                        Ok(Ok(output)) => match try_json_response(StatusCode::OK, &output) {
                            Ok(response) => response,
                            Err(e) => {
                                let error =
                                    ApiError::internal_with_source("failed to encode response", e);
                                log_failure(logger.as_ref(), &ctx, &error);
                                error_response(&error)
                            }
                        },
                        Ok(Err(error)) => {
                            log_failure(logger.as_ref(), &ctx, &error);
                            error_response(&error)
                        }
                        Err(panic) => {
                            log_panic(logger.as_ref(), &ctx, panic.as_ref());
                            internal_error_response()
                        }
                    }
                }
            };

            record_request(
                ctx.method().as_str(),
                &route,
                response.status().as_u16(),
                ctx.elapsed(),
            );
            response
        })
    })
}

/// Decodes the handler input.
///
/// Order: JSON body, then query string, then JSON `null`, then an empty query.
/// The last two let `()`, `Option<T>` and all-optional structs accept bodiless
/// requests.
pub(crate) fn decode_input<I: DeserializeOwned>(
    query: Option<&str>,
    body: &Bytes,
) -> Result<I, ApiError> {
    if !body.is_empty() {
        return serde_json::from_slice(body)
            .map_err(|e| ApiError::decode(format!("invalid JSON body: {e}")));
    }

    let query_error = match query.filter(|q| !q.is_empty()) {
        Some(query) => match serde_urlencoded::from_str(query) {
            Ok(input) => return Ok(input),
            Err(e) => Some(e),
        },
        None => None,
    };

    if let Ok(input) = serde_json::from_value(serde_json::Value::Null) {
        return Ok(input);
    }

    match query_error {
        Some(e) => Err(ApiError::decode(format!("invalid query string: {e}"))),
        None => serde_urlencoded::from_str("")
            .map_err(|e| ApiError::decode(format!("missing request input: {e}"))),
    }
}

/// Logs a failed request, including the error's source chain.
pub(crate) fn log_failure(logger: &dyn Logger, ctx: &RequestContext, error: &ApiError) {
    let mut message = format!(
        "{} {} failed with {} (request_id={}): {error}",
        ctx.method(),
        ctx.path(),
        error.status_code().as_u16(),
        ctx.request_id(),
    );

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    if error.is_server_error() {
        logger.error(&message);
    } else {
        logger.warn(&message);
    }
}

pub(crate) fn log_panic(logger: &dyn Logger, ctx: &RequestContext, panic: &(dyn Any + Send)) {
    logger.error(&format!(
        "{} {} panicked (request_id={}): {}",
        ctx.method(),
        ctx.path(),
        ctx.request_id(),
        panic_message(panic),
    ));
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
