//! # corekit server
//!
//! HTTP service scaffold on hyper 1.x:
//!
//! - [`Service`] - options, route registration, built-in `/health`, `/info`
//!   and `/metrics`
//! - [`handler`] - typed JSON handler wrapper with error mapping
//! - [`stream`] - streaming handler wrapper (chunks, NDJSON, server-sent events)
//! - [`router`] - the [`ServeMux`] capability and the default [`PatternRouter`]
//! - Graceful shutdown on SIGINT/SIGTERM with a bounded grace period
//! - Optional TLS from PEM files
//!
//! ## Example
//!
//! ```rust,no_run
//! use corekit_core::{ApiError, RequestContext};
//! use corekit_server::Service;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! async fn create_user(_ctx: RequestContext, input: NewUser) -> Result<User, ApiError> {
//!     Ok(User { id: 1, name: input.name })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut service = Service::builder()
//!         .name("users")
//!         .version("0.1.0")
//!         .port(8080)
//!         .build()?;
//!
//!     service.post("/users", create_user);
//!     service.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/corekit-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod handler;
pub mod health;
mod lifecycle;
pub mod response;
pub mod router;
mod server;
mod service;
pub mod settings;
mod shutdown;
pub mod stream;
mod tasks;
pub mod tls;

pub use config::{opts, ConfigError, Probe, ServiceOption, ServiceOptions};
pub use error::ServerError;
pub use handler::api_handler;
pub use health::ServiceInfo;
pub use lifecycle::LifecycleState;
pub use response::{HttpRequest, HttpResponse, ResponseBody};
pub use router::{PatternRouter, RouteFuture, RouteHandler, RouteMatch, ServeMux};
pub use service::{Service, ServiceBuilder};
pub use settings::ServiceSettings;
pub use shutdown::ShutdownSignal;
pub use stream::{stream_handler, StreamError, StreamEvent, StreamWriter};
