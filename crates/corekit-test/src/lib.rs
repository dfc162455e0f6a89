//! # corekit test
//!
//! In-memory testing for corekit services. A [`TestClient`] hands requests
//! directly to [`Service::call`](corekit_server::Service::call): no port is
//! bound, yet routing, the handler wrappers, the built-in endpoints and the
//! `x-request-id` header behave exactly as over the network.
//!
//! ## Example
//!
//! ```
//! use corekit_core::{ApiError, RequestContext};
//! use corekit_server::Service;
//! use corekit_test::TestClient;
//! use http::StatusCode;
//! use serde_json::{json, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut service = Service::builder().name("users").build().unwrap();
//! service.post("/users", |_ctx: RequestContext, user: Value| async move {
//!     Ok::<_, ApiError>(user)
//! });
//!
//! let client = TestClient::new(service);
//! client
//!     .post("/users")
//!     .json(&json!({"name": "Alice"}))
//!     .send()
//!     .await
//!     .assert_status(StatusCode::OK)
//!     .assert_json_eq(&json!({"name": "Alice"}));
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/corekit-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
