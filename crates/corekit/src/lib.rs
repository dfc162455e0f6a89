//! # corekit
//!
//! **A minimal HTTP microservice scaffold**
//!
//! corekit wires a router, built-in endpoints, graceful shutdown and a small
//! JSON client around hyper:
//!
//! - **Typed handlers**: `async fn(RequestContext, Input) -> Result<Output, ApiError>`,
//!   JSON in and out, errors mapped onto status codes
//! - **Streaming handlers**: chunked, NDJSON and server-sent-event responses
//! - **Built-in endpoints**: `/health`, `/info` with dependency probes, and
//!   Prometheus `/metrics`
//! - **Graceful shutdown**: SIGINT/SIGTERM stop the listener and in-flight
//!   requests get a bounded grace period
//! - **Client helper**: JSON calls with typed error mapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corekit::prelude::*;
//! use serde::{Deserialize, Serialize};
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
//!         message: format!("hello, {}", input.name),
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging(&LogConfig::from_env())?;
//!
//!     let mut service = Service::builder()
//!         .name("greeter")
//!         .version(env!("CARGO_PKG_VERSION"))
//!         .port(8080)
//!         .build()?;
//!
//!     service.get("/greet", greet);
//!     service.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`core`] | request context, error taxonomy, logger capability |
//! | [`server`] | service builder, router, handler wrappers, lifecycle |
//! | [`telemetry`] | log initialization and Prometheus metrics |
//! | [`client`] | JSON-over-HTTP client |

#![doc(html_root_url = "https://docs.rs/corekit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use corekit_client as client;
pub use corekit_core as core;
pub use corekit_server as server;
pub use corekit_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use corekit::prelude::*;
/// ```
pub mod prelude {
    pub use corekit_core::{ApiError, ApiResult, ErrorBody, Logger, RequestContext, RequestId};

    pub use corekit_server::{
        opts, Service, ServiceBuilder, ServiceSettings, ShutdownSignal, StreamEvent,
        StreamWriter,
    };

    pub use corekit_telemetry::{init_logging, LogConfig};

    pub use corekit_client::{ClientError, HttpClient};
}
