//! Request context types.
//!
//! The [`RequestContext`] is created by the server for every request and
//! handed to the route handler together with the request payload.

use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Header carrying the request id, both inbound and outbound.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use corekit_core::RequestId;
///
/// let id = RequestId::new();
/// let parsed: RequestId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Uses the id from the request headers when it holds a valid UUID,
    /// otherwise generates a fresh one.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-request context passed to every handler.
///
/// Carries the request id, the matched path parameters, the raw query string,
/// the request headers and a cancellation token. The token is cancelled when
/// the client goes away during a streamed response or when the server shuts
/// down.
///
/// # Example
///
/// ```
/// use corekit_core::RequestContext;
///
/// let ctx = RequestContext::new().with_param("id", "42");
/// assert_eq!(ctx.param("id"), Some("42"));
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    params: HashMap<String, String>,
    route: Option<String>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a context for `GET /` with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            method: Method::GET,
            path: "/".to_string(),
            query: None,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            route: None,
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Builds the context for an incoming request.
    ///
    /// `cancel` is normally a child of the server's shutdown token.
    #[must_use]
    pub fn from_request<B>(request: &http::Request<B>, cancel: CancellationToken) -> Self {
        Self {
            request_id: RequestId::from_headers(request.headers()),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(ToString::to_string),
            headers: request.headers().clone(),
            params: HashMap::new(),
            route: None,
            cancel,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string, without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a path parameter extracted by the router.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns all path parameters.
    #[must_use]
    pub const fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Replaces the path parameters.
    pub fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Returns a new context with an additional path parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Returns the pattern of the matched route, if routing has happened.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Records the pattern of the matched route.
    pub fn set_route(&mut self, pattern: impl Into<String>) {
        self.route = Some(pattern.into());
    }

    /// Returns the cancellation token of this request.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_new_generates_unique_ids() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2, "Each RequestId should be unique");
    }

    #[test]
    fn test_request_id_display() {
        let display = RequestId::new().to_string();
        assert_eq!(display.len(), 36, "UUID string should be 36 characters");
    }

    #[test]
    fn test_request_id_propagated_from_header() {
        let id = RequestId::new();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, id.to_string().parse().unwrap());
        assert_eq!(RequestId::from_headers(&headers), id);
    }

    #[test]
    fn test_request_id_regenerated_for_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "not-a-uuid".parse().unwrap());
        let id = RequestId::from_headers(&headers);
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_context_from_request() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/users/7?verbose=true")
            .header("x-tenant", "acme")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_request(&request, CancellationToken::new());

        assert_eq!(ctx.method(), &Method::POST);
        assert_eq!(ctx.path(), "/users/7");
        assert_eq!(ctx.query(), Some("verbose=true"));
        assert_eq!(ctx.header("x-tenant"), Some("acme"));
        assert!(ctx.params().is_empty());
        assert!(ctx.route().is_none());
    }

    #[test]
    fn test_context_params() {
        let mut ctx = RequestContext::new().with_param("id", "1");
        assert_eq!(ctx.param("id"), Some("1"));
        assert_eq!(ctx.param("missing"), None);

        ctx.set_params(HashMap::from([("name".to_string(), "bob".to_string())]));
        assert_eq!(ctx.param("id"), None);
        assert_eq!(ctx.param("name"), Some("bob"));
    }

    #[tokio::test]
    async fn test_context_cancellation_follows_parent() {
        let parent = CancellationToken::new();
        let request = http::Request::new(());
        let ctx = RequestContext::from_request(&request, parent.child_token());

        assert!(!ctx.is_cancelled());
        parent.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_request_context_elapsed() {
        let ctx = RequestContext::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(ctx.elapsed() >= std::time::Duration::from_millis(10));
    }
}
