//! Request routing and path matching.
//!
//! [`ServeMux`] is the capability the service builder registers routes on.
//! [`PatternRouter`] is the default implementation: path patterns with named
//! parameters and a trailing wildcard.
//!
//! # Pattern syntax
//!
//! | Segment | Matches |
//! |---|---|
//! | `users` | the literal segment |
//! | `:id` or `{id}` | any single segment, stored as parameter `id` |
//! | `*` (last segment only) | the rest of the path, stored as parameter `*` |
//!
//! # Example
//!
//! ```rust
//! use corekit_server::router::{PatternRouter, RouteFuture, ServeMux};
//! use corekit_server::response::{empty_response, HttpRequest};
//! use corekit_core::RequestContext;
//! use http::{Method, StatusCode};
//! use std::sync::Arc;
//!
//! let mut router = PatternRouter::new();
//! router.add(
//!     Method::GET,
//!     "/users/:id",
//!     Arc::new(|_ctx: RequestContext, _req: HttpRequest| -> RouteFuture {
//!         Box::pin(async { empty_response(StatusCode::NO_CONTENT) })
//!     }),
//! );
//!
//! let m = router.match_route(&Method::GET, "/users/42").unwrap();
//! assert_eq!(m.pattern(), "/users/:id");
//! assert_eq!(m.param("id"), Some("42"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use corekit_core::{ErrorBody, RequestContext};
use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};

use crate::response::{error_body_response, HttpRequest, HttpResponse};

/// Future returned by a [`RouteHandler`].
pub type RouteFuture = Pin<Box<dyn Future<Output = HttpResponse> + Send>>;

/// A raw route handler: request context plus buffered request in, response
/// out.
///
/// The API and stream wrappers produce these; the built-in endpoints are
/// written directly against it.
pub type RouteHandler = Arc<dyn Fn(RequestContext, HttpRequest) -> RouteFuture + Send + Sync>;

/// Registers handlers by method and path pattern and dispatches requests to
/// them.
///
/// Routes are only added before the service starts serving; afterwards the
/// mux is shared read-only.
pub trait ServeMux: Send + Sync + 'static {
    /// Registers `handler` for `method` and `pattern`.
    ///
    /// Returns the handler it replaced when the same method and pattern
    /// were already registered.
    fn add(&mut self, method: Method, pattern: &str, handler: RouteHandler)
        -> Option<RouteHandler>;

    /// Dispatches a request to the matching handler.
    ///
    /// Responds with a JSON 404 when nothing matches.
    fn dispatch(&self, ctx: RequestContext, request: HttpRequest) -> RouteFuture;

    /// Returns every registered (method, pattern) pair in registration order.
    fn routes(&self) -> Vec<(Method, String)>;
}

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pattern: String,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the pattern of the matched route.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A segment of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// Name under which the wildcard remainder is stored.
pub const WILDCARD_PARAM: &str = "*";

struct Route {
    method: Method,
    pattern: String,
    segments: Vec<PathSegment>,
    handler: RouteHandler,
}

impl Route {
    fn parse_segments(pattern: &str) -> Vec<PathSegment> {
        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let last = parts.len().saturating_sub(1);

        parts
            .iter()
            .enumerate()
            .map(|(i, s)| {
                if *s == "*" && i == last {
                    PathSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    PathSegment::Param(name.to_string())
                } else if s.starts_with('{') && s.ends_with('}') && s.len() > 2 {
                    PathSegment::Param(s[1..s.len() - 1].to_string())
                } else {
                    PathSegment::Literal((*s).to_string())
                }
            })
            .collect()
    }

    /// Attempts to match this route against a path.
    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = HashMap::new();

        for (i, pattern) in self.segments.iter().enumerate() {
            match pattern {
                PathSegment::Wildcard => {
                    let rest = path_segments.get(i..).unwrap_or_default().join("/");
                    params.insert(WILDCARD_PARAM.to_string(), rest);
                    return Some(params);
                }
                PathSegment::Literal(expected) => {
                    if path_segments.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    let actual = path_segments.get(i)?;
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }

        (path_segments.len() == self.segments.len()).then_some(params)
    }
}

/// Default [`ServeMux`]: first matching pattern in registration order wins.
///
/// - Registering the same method and pattern twice replaces the earlier
///   handler in place.
/// - `HEAD` requests fall back to the `GET` handler.
/// - A path that matches only under other methods gets
///   `405 Method Not Allowed` with an `Allow` header.
#[derive(Default)]
pub struct PatternRouter {
    routes: Vec<Route>,
}

impl PatternRouter {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Matches a method and path without invoking the handler.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.find(method, path).map(|(route, params)| RouteMatch {
            pattern: route.pattern.clone(),
            params,
        })
    }

    fn find(&self, method: &Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        let exact = self.routes.iter().find_map(|route| {
            if route.method == *method {
                route.match_path(path).map(|params| (route, params))
            } else {
                None
            }
        });

        if exact.is_none() && *method == Method::HEAD {
            return self.find(&Method::GET, path);
        }
        exact
    }

    /// Methods registered for patterns that match `path`, in registration
    /// order and without duplicates.
    fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for route in &self.routes {
            if !methods.contains(&route.method) && route.match_path(path).is_some() {
                methods.push(route.method.clone());
            }
        }
        methods
    }
}

impl ServeMux for PatternRouter {
    fn add(
        &mut self,
        method: Method,
        pattern: &str,
        handler: RouteHandler,
    ) -> Option<RouteHandler> {
        if let Some(existing) = self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            return Some(std::mem::replace(&mut existing.handler, handler));
        }

        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments: Route::parse_segments(pattern),
            handler,
        });
        None
    }

    fn dispatch(&self, mut ctx: RequestContext, request: HttpRequest) -> RouteFuture {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        if let Some((route, params)) = self.find(&method, &path) {
            ctx.set_params(params);
            ctx.set_route(route.pattern.clone());
            return (route.handler)(ctx, request);
        }

        let allowed = self.allowed_methods(&path);
        Box::pin(async move {
            if allowed.is_empty() {
                return error_body_response(
                    StatusCode::NOT_FOUND,
                    &ErrorBody::new("not_found", format!("no route for {method} {path}")),
                );
            }

            let mut response = error_body_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorBody::new(
                    "method_not_allowed",
                    format!("method {method} is not allowed for {path}"),
                ),
            );
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
            response
        })
    }

    fn routes(&self) -> Vec<(Method, String)> {
        self.routes
            .iter()
            .map(|r| (r.method.clone(), r.pattern.clone()))
            .collect()
    }
}
