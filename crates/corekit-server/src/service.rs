//! The service: options, router, built-in endpoints and route registration.
//!
//! # Example
//!
//! ```rust,no_run
//! use corekit_core::{ApiError, RequestContext};
//! use corekit_server::{config::opts, Service};
//!
//! async fn hello(_ctx: RequestContext, (): ()) -> Result<&'static str, ApiError> {
//!     Ok("hello")
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut service = Service::new([opts::name("greeter"), opts::port(8080)])?;
//!     service.get("/hello", hello);
//!     service.run().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use corekit_core::{ApiError, Logger, RequestContext, REQUEST_ID_HEADER};
use http::header::HeaderValue;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{opts, ConfigError, ServiceOption, ServiceOptions};
use crate::handler::api_handler;
use crate::health;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::response::{error_response, HttpRequest, HttpResponse};
use crate::router::{PatternRouter, RouteHandler, ServeMux};
use crate::settings::ServiceSettings;
use crate::stream::{tracked_stream_handler, StreamWriter};
use crate::tasks::RequestTasks;

/// An HTTP service.
///
/// Routes are registered through `&mut self`; [`run`](Self::run) and
/// [`serve`](Self::serve) consume the service, so the route table is fixed
/// once serving starts.
pub struct Service {
    pub(crate) options: ServiceOptions,
    pub(crate) mux: Box<dyn ServeMux>,
    pub(crate) logger: Arc<dyn Logger>,
    /// Parent of every request context token.
    pub(crate) requests: CancellationToken,
    /// Stream handlers still running, drained on shutdown.
    pub(crate) tasks: RequestTasks,
    pub(crate) lifecycle: Lifecycle,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("options", &self.options)
            .field("routes", &self.mux.routes())
            .field("state", &self.lifecycle.current())
            .finish_non_exhaustive()
    }
}

impl Service {
    /// Creates a service from option mutators applied in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting options do not validate.
    pub fn new<I>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ServiceOption>,
    {
        ServiceOptions::from_options(options).map(Self::from_validated)
    }

    /// Creates a service from assembled options.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` do not validate.
    pub fn with_options(options: ServiceOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self::from_validated(options))
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    fn from_validated(mut options: ServiceOptions) -> Self {
        let logger = Arc::clone(&options.logger);
        let mut mux: Box<dyn ServeMux> = match options.serve_mux.take() {
            Some(mux) => mux,
            None => Box::new(PatternRouter::new()),
        };

        if let Err(e) = corekit_telemetry::metrics::install_recorder() {
            logger.warn(&format!("metrics disabled: {e}"));
        }
        health::mount(mux.as_mut(), &options);

        Self {
            options,
            mux,
            logger,
            requests: CancellationToken::new(),
            tasks: RequestTasks::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Returns the options the service was built with.
    ///
    /// The router has been moved out, so `serve_mux` is always `None`.
    #[must_use]
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Returns the injected logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Returns every registered (method, pattern) pair, built-ins included.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.mux.routes()
    }

    /// Subscribes to lifecycle transitions.
    #[must_use]
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Registers a raw handler.
    ///
    /// A second registration for the same method and pattern replaces the
    /// first and logs a warning.
    pub fn route(&mut self, method: Method, pattern: &str, handler: RouteHandler) -> &mut Self {
        if self.mux.add(method.clone(), pattern, handler).is_some() {
            self.logger.warn(&format!(
                "route {method} {pattern} registered twice; the last registration wins"
            ));
        }
        self
    }

    /// Registers a typed `GET` handler.
    pub fn get<I, O, F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        self.api_route(Method::GET, pattern, handler)
    }

    /// Registers a typed `POST` handler.
    pub fn post<I, O, F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        self.api_route(Method::POST, pattern, handler)
    }

    /// Registers a typed `PUT` handler.
    pub fn put<I, O, F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        self.api_route(Method::PUT, pattern, handler)
    }

    /// Registers a typed `DELETE` handler.
    pub fn delete<I, O, F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        self.api_route(Method::DELETE, pattern, handler)
    }

    /// Registers a streaming `GET` handler.
    pub fn stream<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext, StreamWriter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let handler = tracked_stream_handler(
            handler,
            Arc::clone(&self.logger),
            self.options.stream_buffer,
            self.tasks.clone(),
        );
        self.route(Method::GET, pattern, handler)
    }

    fn api_route<I, O, F, Fut>(&mut self, method: Method, pattern: &str, handler: F) -> &mut Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        let handler = api_handler(handler, Arc::clone(&self.logger));
        self.route(method, pattern, handler)
    }

    /// Handles one request without a socket.
    ///
    /// The response carries the request ID in `x-request-id`. A body larger
    /// than the configured cap is rejected with 413 before routing.
    pub async fn call(&self, request: HttpRequest) -> HttpResponse {
        let ctx = RequestContext::from_request(&request, self.requests.child_token());
        let request_id = ctx.request_id();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        let limit = self.options.max_body_size;
        let mut response = if request.body().len() > limit {
            error_response(&ApiError::payload_too_large(limit))
        } else {
            self.mux.dispatch(ctx, request).instrument(span).await
        };
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

/// Fluent construction of a [`Service`].
///
/// # Example
///
/// ```rust
/// use corekit_server::Service;
/// use std::time::Duration;
///
/// let service = Service::builder()
///     .name("billing")
///     .version("1.4.2")
///     .port(0)
///     .shutdown_grace(Duration::from_secs(2))
///     .build()
///     .unwrap();
///
/// assert_eq!(service.options().name, "billing");
/// ```
#[derive(Default)]
pub struct ServiceBuilder {
    options: Vec<ServiceOption>,
}

impl std::fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBuilder")
            .field("options", &self.options.len())
            .finish()
    }
}

impl ServiceBuilder {
    /// Creates a builder with no options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an option mutator.
    #[must_use]
    pub fn option(mut self, option: ServiceOption) -> Self {
        self.options.push(option);
        self
    }

    /// Appends the mutators of file or environment settings.
    #[must_use]
    pub fn settings(mut self, settings: &ServiceSettings) -> Self {
        self.options.extend(settings.to_options());
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.option(opts::name(name))
    }

    /// Sets the version string.
    #[must_use]
    pub fn version(self, version: impl Into<String>) -> Self {
        self.option(opts::version(version))
    }

    /// Adds a dependency probe.
    #[must_use]
    pub fn dependency<F, T>(self, name: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Serialize,
    {
        self.option(opts::dependency(name, probe))
    }

    /// Adds a static parameter.
    #[must_use]
    pub fn param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.option(opts::param(name, value))
    }

    /// Sets the listening port.
    #[must_use]
    pub fn port(self, port: u16) -> Self {
        self.option(opts::port(port))
    }

    /// Sets the bind host.
    #[must_use]
    pub fn host(self, host: impl Into<String>) -> Self {
        self.option(opts::host(host))
    }

    /// Serves HTTPS.
    #[must_use]
    pub fn https(self, cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        self.option(opts::https(cert_file, key_file))
    }

    /// Replaces the default router.
    #[must_use]
    pub fn serve_mux(self, mux: impl ServeMux) -> Self {
        self.option(opts::serve_mux(mux))
    }

    /// Replaces the default logger.
    #[must_use]
    pub fn logger(self, logger: Arc<dyn Logger>) -> Self {
        self.option(opts::logger(logger))
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(self, grace: Duration) -> Self {
        self.option(opts::shutdown_grace(grace))
    }

    /// Sets the per-stream channel capacity.
    #[must_use]
    pub fn stream_buffer(self, chunks: usize) -> Self {
        self.option(opts::stream_buffer(chunks))
    }

    /// Sets the largest accepted request body, in bytes.
    #[must_use]
    pub fn max_body_size(self, bytes: usize) -> Self {
        self.option(opts::max_body_size(bytes))
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the options do not validate.
    pub fn build(self) -> Result<Service, ConfigError> {
        Service::new(self.options)
    }
}
