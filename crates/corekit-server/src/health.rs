//! Built-in endpoints.
//!
//! Every service serves these next to its own routes:
//!
//! - `GET /health` - liveness: `200 OK` with an empty body, no checks
//! - `GET /info` - name, version, static parameters and the current result
//!   of every dependency probe
//! - `GET /metrics` - Prometheus text exposition of the process-wide recorder

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use corekit_core::RequestContext;
use corekit_telemetry::metrics;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{Probe, ServiceOptions};
use crate::response::{empty_response, json_response, text_response, HttpRequest};
use crate::router::{RouteFuture, RouteHandler, ServeMux};

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Path of the service information endpoint.
pub const INFO_PATH: &str = "/info";

/// Path of the metrics endpoint.
pub const METRICS_PATH: &str = "/metrics";

/// Body of `GET /info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Static parameters.
    pub params: BTreeMap<String, String>,
    /// Probe results keyed by dependency name.
    pub dependencies: BTreeMap<String, serde_json::Value>,
}

/// What `/info` reports, captured from the options at construction.
pub(crate) struct InfoSource {
    name: String,
    version: String,
    params: BTreeMap<String, String>,
    dependencies: BTreeMap<String, Probe>,
}

impl InfoSource {
    pub(crate) fn from_options(options: &ServiceOptions) -> Self {
        Self {
            name: options.name.clone(),
            version: options.version.clone(),
            params: options.params.clone(),
            dependencies: options.dependencies.clone(),
        }
    }

    /// Runs every probe and assembles the report.
    ///
    /// A panicking probe is reported as a string instead of failing the
    /// request.
    pub(crate) fn snapshot(&self) -> ServiceInfo {
        let dependencies = self
            .dependencies
            .iter()
            .map(|(name, probe)| {
                let value = catch_unwind(AssertUnwindSafe(|| probe()))
                    .unwrap_or_else(|_| serde_json::Value::String("probe panicked".to_string()));
                (name.clone(), value)
            })
            .collect();

        ServiceInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            params: self.params.clone(),
            dependencies,
        }
    }
}

pub(crate) fn health_handler() -> RouteHandler {
    Arc::new(|_ctx: RequestContext, _req: HttpRequest| -> RouteFuture {
        Box::pin(async { empty_response(StatusCode::OK) })
    })
}

pub(crate) fn info_handler(source: Arc<InfoSource>) -> RouteHandler {
    Arc::new(move |_ctx: RequestContext, _req: HttpRequest| -> RouteFuture {
        let source = Arc::clone(&source);
        Box::pin(async move { json_response(StatusCode::OK, &source.snapshot()) })
    })
}

pub(crate) fn metrics_handler() -> RouteHandler {
    Arc::new(|_ctx: RequestContext, _req: HttpRequest| -> RouteFuture {
        Box::pin(async {
            let body = metrics::render().unwrap_or_default();
            text_response(StatusCode::OK, metrics::CONTENT_TYPE, body)
        })
    })
}

/// Registers the built-in endpoints on `mux`.
pub(crate) fn mount(mux: &mut dyn ServeMux, options: &ServiceOptions) {
    let source = Arc::new(InfoSource::from_options(options));
    mux.add(Method::GET, HEALTH_PATH, health_handler());
    mux.add(Method::GET, INFO_PATH, info_handler(source));
    mux.add(Method::GET, METRICS_PATH, metrics_handler());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::opts;
    use crate::response::HttpResponse;
    use crate::router::PatternRouter;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicU64, Ordering};

    async fn get(mux: &PatternRouter, path: &str) -> HttpResponse {
        let request = http::Request::builder()
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        mux.dispatch(RequestContext::new(), request).await
    }

    async fn body_bytes(response: HttpResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn mounted(options: &ServiceOptions) -> PatternRouter {
        let mut mux = PatternRouter::new();
        mount(&mut mux, options);
        mux
    }

    #[tokio::test]
    async fn test_health_is_empty_200() {
        let mux = mounted(&ServiceOptions::default());
        let response = get(&mux, HEALTH_PATH).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_info_reports_options() {
        let options = ServiceOptions::from_options([
            opts::name("inventory"),
            opts::version("2.0.1"),
            opts::param("region", "us-east-2"),
            opts::dependency("postgres", || "up"),
        ])
        .unwrap();
        let mux = mounted(&options);

        let response = get(&mux, INFO_PATH).await;
        assert_eq!(response.status(), StatusCode::OK);
        let info: ServiceInfo = serde_json::from_slice(&body_bytes(response).await).unwrap();

        assert_eq!(info.name, "inventory");
        assert_eq!(info.version, "2.0.1");
        assert_eq!(info.params["region"], "us-east-2");
        assert_eq!(info.dependencies.len(), 1);
        assert_eq!(info.dependencies["postgres"], "up");
    }

    #[tokio::test]
    async fn test_info_invokes_probes_per_request() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let options = ServiceOptions::from_options([opts::dependency("counter", move || {
            counter.fetch_add(1, Ordering::SeqCst) + 1
        })])
        .unwrap();
        let mux = mounted(&options);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        for expected in 1..=3_u64 {
            let info: ServiceInfo =
                serde_json::from_slice(&body_bytes(get(&mux, INFO_PATH).await).await).unwrap();
            assert_eq!(info.dependencies["counter"], expected);
        }
    }

    #[test]
    fn test_panicking_probe_is_reported() {
        let options = ServiceOptions::from_options([
            opts::dependency("flaky", || -> bool { panic!("probe exploded") }),
            opts::dependency("steady", || true),
        ])
        .unwrap();

        let info = InfoSource::from_options(&options).snapshot();
        assert_eq!(info.dependencies["flaky"], "probe panicked");
        assert_eq!(info.dependencies["steady"], true);
    }

    #[tokio::test]
    async fn test_metrics_content_type() {
        corekit_telemetry::metrics::install_recorder().unwrap();
        let mux = mounted(&ServiceOptions::default());

        let response = get(&mux, METRICS_PATH).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            metrics::CONTENT_TYPE
        );
    }
}
