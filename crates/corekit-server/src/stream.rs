//! Streaming handler wrapper.
//!
//! A stream handler receives a [`StreamWriter`] and writes an open-ended
//! response: raw chunks, newline-delimited JSON or server-sent events. The
//! handler runs on its own task; each write becomes one body frame that is
//! flushed to the client as it arrives.
//!
//! Headers are committed on the first write. Until then the handler may
//! change them, and a failure still produces a regular JSON error response.
//! After that, failures can only be logged.
//!
//! # Example
//!
//! ```rust
//! use corekit_core::{ApiError, RequestContext};
//! use corekit_server::stream::{StreamEvent, StreamWriter};
//!
//! async fn ticks(_ctx: RequestContext, mut writer: StreamWriter) -> Result<(), ApiError> {
//!     for i in 0..3 {
//!         writer
//!             .write_event(&StreamEvent::new(format!("tick {i}")).id(i.to_string()))
//!             .await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use corekit_core::{ApiError, Logger, RequestContext};
use corekit_telemetry::metrics::{record_request, InFlightGuard};
use http::header::{HeaderMap, HeaderValue, IntoHeaderName, CACHE_CONTROL, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::handler::{log_failure, log_panic};
use crate::response::{
    empty_response, error_response, internal_error_response, HttpRequest, ResponseBody,
};
use crate::router::{RouteFuture, RouteHandler};
use crate::tasks::RequestTasks;

/// Content type of server-sent events.
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

/// Errors from [`StreamWriter`] operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The client went away or the server is shutting down.
    #[error("stream closed")]
    Closed,

    /// Headers can no longer change after the first write.
    #[error("response headers were already sent")]
    HeadersCommitted,

    /// A value could not be serialized.
    #[error("failed to encode stream item: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Closed => ApiError::unavailable("stream closed"),
            StreamError::HeadersCommitted => {
                ApiError::internal("response headers were already sent")
            }
            StreamError::Encode(e) => ApiError::internal_with_source("failed to encode stream item", e),
        }
    }
}

/// A server-sent event.
///
/// # Example
///
/// ```
/// use corekit_server::stream::StreamEvent;
///
/// let event = StreamEvent::new("line one\nline two").event("update").id("7");
/// assert_eq!(
///     event.to_string(),
///     "id: 7\nevent: update\ndata: line one\ndata: line two\n\n"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamEvent {
    id: Option<String>,
    event: Option<String>,
    data: String,
    retry: Option<Duration>,
}

impl StreamEvent {
    /// Creates an event carrying `data`.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Creates an event whose data is `value` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Encode`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, StreamError> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    /// Sets the event ID.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the event type.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the client reconnection delay.
    #[must_use]
    pub fn retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    /// The event data.
    pub fn data(&self) -> &str {
        &self.data
    }
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(id) = &self.id {
            writeln!(f, "id: {id}")?;
        }
        if let Some(event) = &self.event {
            writeln!(f, "event: {event}")?;
        }
        if self.data.is_empty() {
            writeln!(f, "data: ")?;
        }
        // Every line of data needs its own prefix.
        for line in self.data.lines() {
            writeln!(f, "data: {line}")?;
        }
        if let Some(retry) = self.retry {
            writeln!(f, "retry: {}", retry.as_millis())?;
        }
        writeln!(f)
    }
}

struct PendingHead {
    headers: HeaderMap,
    commit: oneshot::Sender<HeaderMap>,
}

/// Writes chunks of a streamed response.
pub struct StreamWriter {
    tx: mpsc::Sender<Bytes>,
    head: Option<PendingHead>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("headers_committed", &self.headers_committed())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StreamWriter {
    fn new(
        tx: mpsc::Sender<Bytes>,
        commit: oneshot::Sender<HeaderMap>,
        cancel: CancellationToken,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_EVENT_STREAM));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

        Self {
            tx,
            head: Some(PendingHead { headers, commit }),
            cancel,
        }
    }

    /// Sets a response header.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::HeadersCommitted`] after the first write.
    pub fn set_header<K: IntoHeaderName>(
        &mut self,
        name: K,
        value: HeaderValue,
    ) -> Result<(), StreamError> {
        let head = self.head.as_mut().ok_or(StreamError::HeadersCommitted)?;
        head.headers.insert(name, value);
        Ok(())
    }

    /// Returns `true` once the response headers have been sent.
    pub fn headers_committed(&self) -> bool {
        self.head.is_none()
    }

    /// Returns `true` once the client went away or the server started
    /// shutting down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Sends the response headers without writing any data.
    ///
    /// Writes do this implicitly.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the request is gone.
    pub fn commit(&mut self) -> Result<(), StreamError> {
        if let Some(head) = self.head.take() {
            head.commit
                .send(head.headers)
                .map_err(|_| StreamError::Closed)?;
        }
        Ok(())
    }

    /// Writes one chunk.
    ///
    /// Waits while the client is `buffer` chunks behind.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] once the client disconnected or the
    /// server is shutting down.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Closed);
        }
        self.commit()?;

        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StreamError::Closed),
            sent = self.tx.send(chunk) => sent.map_err(|_| StreamError::Closed),
        }
    }

    /// Writes `value` as one line of JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Encode`] if `value` cannot be serialized, or
    /// the errors of [`write`](Self::write).
    pub async fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), StreamError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.write(line).await
    }

    /// Writes a server-sent event.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub async fn write_event(&mut self, event: &StreamEvent) -> Result<(), StreamError> {
        self.write(event.to_string()).await
    }
}

/// Wraps a stream handler into a [`RouteHandler`].
///
/// `buffer` is the number of chunks the handler may write ahead of the
/// client. Handlers wrapped here are not awaited by a server shutdown; use
/// [`Service::stream`](crate::Service::stream) for that.
pub fn stream_handler<F, Fut>(handler: F, logger: Arc<dyn Logger>, buffer: usize) -> RouteHandler
where
    F: Fn(RequestContext, StreamWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    tracked_stream_handler(handler, logger, buffer, RequestTasks::new())
}

/// Like [`stream_handler`], with the handler and its completion task
/// spawned on `tasks`.
pub(crate) fn tracked_stream_handler<F, Fut>(
    handler: F,
    logger: Arc<dyn Logger>,
    buffer: usize,
    tasks: RequestTasks,
) -> RouteHandler
where
    F: Fn(RequestContext, StreamWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    let buffer = buffer.max(1);

    Arc::new(move |ctx: RequestContext, _request: HttpRequest| -> RouteFuture {
        let handler = Arc::clone(&handler);
        let logger = Arc::clone(&logger);
        let tasks = tasks.clone();

        Box::pin(async move {
            let in_flight = InFlightGuard::new();
            let route = ctx.route().unwrap_or(ctx.path()).to_string();

            let (tx, rx) = mpsc::channel(buffer);
            let (head_tx, head_rx) = oneshot::channel();
            let writer = StreamWriter::new(tx, head_tx, ctx.cancellation_token().clone());
            let guard = ctx.cancellation_token().clone().drop_guard();

            let call_ctx = ctx.clone();
            let task = tasks.spawn(async move { handler(call_ctx, writer).await });

            let Ok(headers) = head_rx.await else {
                // The writer is gone without a single write: the handler is
                // finishing, so its outcome decides the response.
                drop(guard);
                let response = match task.await {
                    Ok(Some(Ok(()))) => empty_response(StatusCode::OK),
                    Ok(Some(Err(error))) => {
                        log_failure(logger.as_ref(), &ctx, &error);
                        error_response(&error)
                    }
                    Ok(None) => error_response(&ApiError::unavailable("service is shutting down")),
                    Err(join_error) => {
                        if join_error.is_panic() {
                            log_panic(logger.as_ref(), &ctx, join_error.into_panic().as_ref());
                        }
                        internal_error_response()
                    }
                };
                record_request(
                    ctx.method().as_str(),
                    &route,
                    response.status().as_u16(),
                    ctx.elapsed(),
                );
                return response;
            };

            tasks.spawn(async move {
                let _in_flight = in_flight;
                match task.await {
                    Ok(Some(Ok(())) | None) => {}
                    Ok(Some(Err(error))) => log_failure(logger.as_ref(), &ctx, &error),
                    Err(join_error) if join_error.is_panic() => {
                        log_panic(logger.as_ref(), &ctx, join_error.into_panic().as_ref());
                    }
                    Err(_) => {}
                }
                record_request(ctx.method().as_str(), &route, 200, ctx.elapsed());
            });

            let mut response = Response::new(stream_body(rx, guard));
            *response.headers_mut() = headers;
            response
        })
    })
}

/// Turns the chunk channel into a response body.
///
/// The guard cancels the request when the body is dropped, which is what
/// happens when the client disconnects.
fn stream_body(rx: mpsc::Receiver<Bytes>, guard: DropGuard) -> ResponseBody {
    let frames = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let chunk = rx.recv().await?;
        Some((Ok::<_, Infallible>(Frame::data(chunk)), (rx, guard)))
    });
    StreamBody::new(frames).boxed_unsync()
}
