//! Request and response types shared by the router, the wrappers and the
//! built-in endpoints.

use std::convert::Infallible;

use bytes::Bytes;
use corekit_core::{ApiError, ErrorBody};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use serde::Serialize;

/// An incoming request with its body fully read.
pub type HttpRequest = Request<Bytes>;

/// Body of every response produced by corekit.
///
/// Either a full buffer or a stream of chunks.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// A response produced by corekit.
pub type HttpResponse = Response<ResponseBody>;

/// Content type of JSON responses.
pub const APPLICATION_JSON: &str = "application/json";

/// Creates a body from a buffer.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).boxed_unsync()
}

/// Creates an empty body.
pub fn empty() -> ResponseBody {
    Empty::new().boxed_unsync()
}

/// Creates a response with the given status and no body.
pub fn empty_response(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(empty());
    *response.status_mut() = status;
    response
}

/// Creates a response with a plain body and content type.
pub fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> HttpResponse {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Serializes `value` as a JSON response.
///
/// # Errors
///
/// Returns the serializer error, for example for a map with non-string
/// keys.
pub fn try_json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<HttpResponse, serde_json::Error> {
    serde_json::to_vec(value).map(|body| text_response(status, APPLICATION_JSON, body))
}

/// Serializes `value` as a JSON response.
///
/// Falls back to the generic internal error body if serialization fails.
/// Use [`try_json_response`] where that failure has to be reported.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HttpResponse {
    try_json_response(status, value).unwrap_or_else(|_| internal_error_response())
}

/// Creates a JSON error response from an error body.
pub fn error_body_response(status: StatusCode, body: &ErrorBody) -> HttpResponse {
    json_response(status, body)
}

/// Maps an [`ApiError`] to its status and JSON body.
pub fn error_response(error: &ApiError) -> HttpResponse {
    error_body_response(error.status_code(), &error.to_body())
}

/// The generic 500 response used for panics and unserializable output.
pub fn internal_error_response() -> HttpResponse {
    // Serializing two strings cannot fail, so this does not recurse.
    let body = serde_json::to_vec(&ErrorBody::internal()).unwrap_or_default();
    text_response(StatusCode::INTERNAL_SERVER_ERROR, APPLICATION_JSON, body)
}
