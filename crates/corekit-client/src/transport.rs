//! The transport seam between [`HttpClient`](crate::HttpClient) and the
//! network.
//!
//! `reqwest::Client` is the production transport. Tests plug in their own.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

/// Error produced by a [`Transport`].
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Sends a fully built request and returns the fully read response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Executes one request.
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let request = reqwest::Request::try_from(request)?;
        let response = reqwest::Client::execute(self, request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
