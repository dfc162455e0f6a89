//! In-memory client over a built [`Service`].

use std::sync::Arc;

use bytes::Bytes;
use corekit_server::Service;
use http::Method;
use serde::Serialize;

use crate::error::TestError;
use crate::request::TestRequestBuilder;
use crate::response::TestResponse;

/// Sends requests straight into [`Service::call`], without a socket.
///
/// Requests run through the same router, wrappers and built-in endpoints as
/// over the network. Cloning is cheap; clones share the service.
///
/// # Example
///
/// ```
/// use corekit_server::Service;
/// use corekit_test::TestClient;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let service = Service::builder().name("users").build().unwrap();
/// let client = TestClient::new(service);
///
/// client.get("/health").send().await.assert_status(http::StatusCode::OK);
/// # }
/// ```
#[derive(Clone)]
#[must_use]
pub struct TestClient {
    service: Arc<Service>,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Creates a client for a fully registered service.
    pub fn new(service: Service) -> Self {
        Self::from_arc(Arc::new(service))
    }

    /// Creates a client sharing an existing service.
    pub fn from_arc(service: Arc<Service>) -> Self {
        Self {
            service,
            default_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The service under test.
    #[must_use]
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Starts a `GET` request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest {
        self.request(Method::GET, uri)
    }

    /// Starts a `POST` request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest {
        self.request(Method::POST, uri)
    }

    /// Starts a `PUT` request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest {
        self.request(Method::PUT, uri)
    }

    /// Starts a `DELETE` request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest {
        self.request(Method::DELETE, uri)
    }

    /// Starts a `HEAD` request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest {
        self.request(Method::HEAD, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest {
        let builder = self
            .default_headers
            .iter()
            .fold(TestRequestBuilder::new(method, uri), |builder, (name, value)| {
                builder.header(name, value)
            });

        TestClientRequest {
            service: Arc::clone(&self.service),
            builder,
        }
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("service", &self.service)
            .field("default_headers", &self.default_headers)
            .finish()
    }
}

/// A request being built by a [`TestClient`].
#[derive(Debug)]
#[must_use]
pub struct TestClientRequest {
    service: Arc<Service>,
    builder: TestRequestBuilder,
}

impl TestClientRequest {
    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the Content-Type header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Appends query parameters.
    pub fn query<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.query(value);
        self
    }

    /// Sends the request and reads the whole response.
    ///
    /// # Panics
    ///
    /// Panics if the request could not be built; use
    /// [`try_send`](Self::try_send) to get the error instead.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("failed to build test request: {e}"),
        }
    }

    /// Sends the request and reads the whole response.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?.into_http();
        let response = self.service.call(request).await;
        Ok(TestResponse::from_http(response).await)
    }
}
