//! JSON-over-HTTP client.

use std::sync::Arc;

use bytes::Bytes;
use corekit_core::ErrorBody;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ClientError;
use crate::transport::Transport;

const APPLICATION_JSON: &str = "application/json";

/// Calls JSON endpoints of a service at a base address.
///
/// Cloning is cheap; clones share the transport.
///
/// # Example
///
/// ```rust,no_run
/// use corekit_client::HttpClient;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// # async fn example() -> Result<(), corekit_client::ClientError> {
/// let client = HttpClient::new("http://localhost:8080");
/// let user: User = client.get("/users/42").await?;
/// println!("{}", user.name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client that sends requests with a default `reqwest::Client`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_transport(base_url, reqwest::Client::new())
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(base_url: impl Into<String>, transport: impl Transport) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport: Arc::new(transport),
            base_url,
        }
    }

    /// The base address requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a request and decodes the 2xx response body into `R`.
    ///
    /// The payload is sent as JSON; `None` sends an empty body. An empty
    /// response body decodes as JSON `null`, so `R = ()` accepts `204`.
    ///
    /// # Errors
    ///
    /// `404` gives [`ClientError::NotFound`], any other non-2xx status
    /// [`ClientError::Api`] with the decoded error body. Encoding, transport
    /// and decoding failures have their own variants.
    pub async fn send<P, R>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&P>,
    ) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (status, body) = self.round_trip(&method, path, payload).await?;
        let body = if body.is_empty() {
            Bytes::from_static(b"null")
        } else {
            body
        };

        serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
            method,
            path: path.to_string(),
            status,
            source,
        })
    }

    /// Sends a request and discards the 2xx response body.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), minus decoding.
    pub async fn execute<P>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&P>,
    ) -> Result<(), ClientError>
    where
        P: Serialize + ?Sized,
    {
        self.round_trip(&method, path, payload).await.map(|_| ())
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        self.send::<(), R>(Method::GET, path, None).await
    }

    /// `POST path` with a JSON payload.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn post<P, R>(&self, path: &str, payload: &P) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(Method::POST, path, Some(payload)).await
    }

    /// `PUT path` with a JSON payload.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn put<P, R>(&self, path: &str, payload: &P) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(Method::PUT, path, Some(payload)).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        self.send::<(), R>(Method::DELETE, path, None).await
    }

    /// Sends the request and checks the status; returns the 2xx status and
    /// body.
    async fn round_trip<P>(
        &self,
        method: &Method,
        path: &str,
        payload: Option<&P>,
    ) -> Result<(StatusCode, Bytes), ClientError>
    where
        P: Serialize + ?Sized,
    {
        let body = match payload {
            Some(payload) => serde_json::to_vec(payload)
                .map(Bytes::from)
                .map_err(|source| ClientError::Encode {
                    method: method.clone(),
                    path: path.to_string(),
                    source,
                })?,
            None => Bytes::new(),
        };

        let url = self.url(path);
        let request = Request::builder()
            .method(method.clone())
            .uri(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
            .header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON))
            .body(body)
            .map_err(|e| ClientError::InvalidRequest {
                method: method.clone(),
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|source| ClientError::Transport {
                method: method.clone(),
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        tracing::debug!(%method, %url, status = status.as_u16(), "corekit client call");

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                method: method.clone(),
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ClientError::Api {
                method: method.clone(),
                path: path.to_string(),
                status,
                body: error_body(status, response.body()),
            });
        }
        Ok((status, response.into_body()))
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

/// Decodes an error body, falling back to the raw text or the status reason
/// when the service did not answer with JSON.
fn error_body(status: StatusCode, body: &Bytes) -> ErrorBody {
    if let Ok(decoded) = serde_json::from_slice::<ErrorBody>(body) {
        return decoded;
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or_default().to_string()
    } else {
        text
    };
    ErrorBody::new("", message)
}
