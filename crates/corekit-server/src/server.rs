//! Serving: listener, connections and graceful shutdown.
//!
//! [`Service::run`] binds the configured address and stops on SIGINT or
//! SIGTERM. [`Service::serve`] takes a bound listener and a
//! caller-controlled [`ShutdownSignal`], which is what tests use.
//!
//! # Shutdown
//!
//! When the signal fires the accept loop stops and the listener closes.
//! Every connection is asked to finish its current request and close, and
//! every request context is cancelled so that streams end. Connections and
//! stream handlers that are still running after the grace period are
//! aborted before the service reports [`LifecycleState::Stopped`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use corekit_core::{ApiError, ErrorBody, Logger};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::error::ServerError;
use crate::lifecycle::LifecycleState;
use crate::response::{error_body_response, error_response, HttpResponse};
use crate::service::Service;
use crate::shutdown::ShutdownSignal;
use crate::tls;

/// Pause after a failed accept. Running out of file descriptors fails every
/// accept until some connection closes.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

impl Service {
    /// Binds the configured address and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the TLS files
    /// cannot be loaded.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.options.addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.logger
                    .error(&format!("Failed to bind to {addr}: {source}"));
                return Err(ServerError::Bind { addr, source });
            }
        };

        let shutdown = ShutdownSignal::with_os_signals_logged(Arc::clone(&self.logger));
        self.serve(listener, shutdown).await
    }

    /// Serves on `listener` until `shutdown` is triggered.
    ///
    /// Returns once every connection and stream handler is gone and the
    /// state is [`LifecycleState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS files cannot be loaded or the listener
    /// has no local address.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let acceptor = match (&self.options.tls_cert_file, &self.options.tls_key_file) {
            (Some(cert), Some(key)) => match tls::load_acceptor(cert, key) {
                Ok(acceptor) => Some(acceptor),
                Err(e) => {
                    self.logger.error(&format!("Failed to load TLS configuration: {e}"));
                    return Err(e);
                }
            },
            _ => None,
        };
        let local_addr = listener.local_addr()?;
        let grace = self.options.shutdown_grace;

        let service = Arc::new(self);
        service.lifecycle.advance(LifecycleState::Listening);
        service.logger.info(&format!(
            "Start listening address {local_addr}{}",
            if acceptor.is_some() { " (https)" } else { "" }
        ));

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        connections.spawn(serve_connection(
                            Arc::clone(&service),
                            stream,
                            remote_addr,
                            acceptor.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => accept_backoff(service.logger.as_ref(), &e, &shutdown).await,
                },
                // Reap finished connections so the set does not grow.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        drop(listener);

        service.lifecycle.advance(LifecycleState::ShuttingDown);
        service.logger.info(&format!(
            "Graceful shutdown, waiting up to {grace:?} for {} open connections and {} streams",
            connections.len(),
            service.tasks.len()
        ));
        service.requests.cancel();

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
            service.tasks.drain().await;
        })
        .await;
        if drained.is_err() {
            service.logger.warn(&format!(
                "Shutdown grace period elapsed, aborting {} connections and {} streams",
                connections.len(),
                service.tasks.len()
            ));
            connections.shutdown().await;
            service.tasks.abort().await;
        }

        service.lifecycle.advance(LifecycleState::Stopped);
        service.logger.info("Service stopped");
        Ok(())
    }
}

/// Logs a failed accept and waits before the next one, unless shutdown
/// starts first.
async fn accept_backoff(logger: &dyn Logger, error: &std::io::Error, shutdown: &ShutdownSignal) {
    logger.warn(&format!("Failed to accept connection: {error}"));
    tokio::select! {
        () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
        () = shutdown.recv() => {}
    }
}

async fn serve_connection(
    service: Arc<Service>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    shutdown: ShutdownSignal,
) {
    let Some(acceptor) = acceptor else {
        drive(service, TokioIo::new(stream), remote_addr, shutdown).await;
        return;
    };

    let handshake = tokio::select! {
        handshake = acceptor.accept(stream) => handshake,
        () = shutdown.recv() => return,
    };
    match handshake {
        Ok(stream) => drive(service, TokioIo::new(stream), remote_addr, shutdown).await,
        Err(e) => service
            .logger
            .debug(&format!("TLS handshake with {remote_addr} failed: {e}")),
    }
}

async fn drive<I>(service: Arc<Service>, io: I, remote_addr: SocketAddr, shutdown: ShutdownSignal)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let logger = Arc::clone(&service.logger);
    let handler = service_fn(move |request: Request<Incoming>| {
        let service = Arc::clone(&service);
        async move { Ok::<_, Infallible>(handle(&service, request).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, handler);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        logger.debug(&format!("Connection from {remote_addr} closed with error: {e}"));
    }
}

async fn handle(service: &Service, request: Request<Incoming>) -> HttpResponse {
    let (parts, body) = request.into_parts();
    let limit = service.options.max_body_size;
    match Limited::new(body, limit).collect().await {
        Ok(collected) => {
            service
                .call(Request::from_parts(parts, collected.to_bytes()))
                .await
        }
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            service.logger.debug(&format!(
                "Rejected {} {}: body exceeds {limit} bytes",
                parts.method,
                parts.uri.path()
            ));
            error_response(&ApiError::payload_too_large(limit))
        }
        Err(e) => {
            service
                .logger
                .debug(&format!("Failed to read request body: {e}"));
            error_body_response(
                StatusCode::BAD_REQUEST,
                &ErrorBody::new("bad_request", format!("failed to read request body: {e}")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::opts;
    use crate::stream::StreamWriter;
    use corekit_core::MemoryLogger;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::rustls::crypto::ring::default_provider;
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio_rustls::TlsConnector;
    use tracing::Level;

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        raw_request(
            addr,
            &format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n"),
        )
        .await
    }

    async fn start(service: Service) -> (SocketAddr, ShutdownSignal, tokio::task::JoinHandle<Result<(), ServerError>>) {
        let mut lifecycle = service.lifecycle();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let server = tokio::spawn(service.serve(listener, shutdown.clone()));
        lifecycle
            .wait_for(|state| *state == LifecycleState::Listening)
            .await
            .unwrap();
        (addr, shutdown, server)
    }

    fn pem_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let logger = Arc::new(MemoryLogger::new());
        let service = Service::new([opts::logger(logger.clone())]).unwrap();
        let mut lifecycle = service.lifecycle();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let server = tokio::spawn(service.serve(listener, shutdown.clone()));

        lifecycle
            .wait_for(|state| *state == LifecycleState::Listening)
            .await
            .unwrap();
        let response = raw_get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("x-request-id"));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("serve returns after shutdown")
            .unwrap()
            .unwrap();

        assert_eq!(*lifecycle.borrow(), LifecycleState::Stopped);
        assert!(logger.contains(Level::INFO, &format!("Start listening address {addr}")));
        assert!(logger.contains(Level::INFO, "Service stopped"));
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_drops_streams_past_grace() {
        let logger = Arc::new(MemoryLogger::new());
        let mut service = Service::builder()
            .logger(logger.clone())
            .shutdown_grace(Duration::from_millis(200))
            .build()
            .unwrap();
        let lifecycle = service.lifecycle();

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);
        service.stream("/stuck", move |_ctx, mut writer: StreamWriter| {
            let on_drop = SetOnDrop(Arc::clone(&flag));
            async move {
                let _on_drop = on_drop;
                writer.write("started\n").await?;
                // Ignores its context on purpose.
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), ApiError>(())
            }
        });

        let (addr, shutdown, server) = start(service).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /stuck HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut received = Vec::new();
        while !String::from_utf8_lossy(&received).contains("started") {
            let mut buf = [0_u8; 256];
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the first chunk");
            received.extend_from_slice(&buf[..n]);
        }

        let started = Instant::now();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("serve does not wait for the stuck handler")
            .unwrap()
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(*lifecycle.borrow(), LifecycleState::Stopped);
        assert!(dropped.load(Ordering::SeqCst), "handler outlived Stopped");
        assert!(logger.contains(Level::WARN, "Shutdown grace period elapsed"));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_streams_within_grace() {
        let mut service = Service::builder()
            .shutdown_grace(Duration::from_secs(5))
            .build()
            .unwrap();

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        service.stream("/tail", move |ctx, mut writer: StreamWriter| {
            let flag = Arc::clone(&flag);
            async move {
                writer.write("open\n").await?;
                ctx.cancellation_token().cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<(), ApiError>(())
            }
        });

        let (addr, shutdown, server) = start(service).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /tail HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0_u8; 256];
        assert!(client.read(&mut buf).await.unwrap() > 0);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_serve_https() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_file = pem_file(&certified.cert.pem());
        let key_file = pem_file(&certified.key_pair.serialize_pem());

        let logger = Arc::new(MemoryLogger::new());
        let service = Service::new([
            opts::https(cert_file.path(), key_file.path()),
            opts::logger(logger.clone()),
        ])
        .unwrap();
        let (addr, shutdown, server) = start(service).await;

        let mut roots = RootCertStore::empty();
        roots.add(certified.cert.der().clone()).unwrap();
        let config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect(addr).await.unwrap();
        let server_name = ServerName::try_from("localhost").unwrap();
        let mut tls = connector.connect(server_name, tcp).await.unwrap();
        tls.write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        if let Err(e) = tls.read_to_end(&mut response).await {
            // Tolerate a close without close_notify; the response is complete.
            assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof, "{e}");
        }
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("x-request-id"));
        assert!(logger.contains(Level::INFO, "(https)"));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let mut service = Service::builder().max_body_size(16).build().unwrap();
        service.post("/echo", |_ctx, input: serde_json::Value| async move {
            Ok::<_, ApiError>(input)
        });
        let (addr, shutdown, server) = start(service).await;

        let post = |body: &str| {
            format!(
                "POST /echo HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            )
        };

        let response = raw_request(addr, &post(r#"{"n":1}"#)).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");

        let large = format!(r#"{{"padding":"{}"}}"#, "x".repeat(64));
        let response = raw_request(addr, &post(&large)).await;
        assert!(response.starts_with("HTTP/1.1 413"), "{response}");
        assert!(response.contains("payload_too_large"));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_accept_backoff_pauses_unless_shutting_down() {
        let logger = MemoryLogger::new();
        let error = std::io::Error::other("too many open files");
        let shutdown = ShutdownSignal::new();

        let started = Instant::now();
        accept_backoff(&logger, &error, &shutdown).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
        assert!(logger.contains(
            Level::WARN,
            "Failed to accept connection: too many open files"
        ));

        shutdown.trigger();
        tokio::time::timeout(ACCEPT_BACKOFF / 2, accept_backoff(&logger, &error, &shutdown))
            .await
            .expect("shutdown cuts the pause short");
    }

    #[tokio::test]
    async fn test_run_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let logger = Arc::new(MemoryLogger::new());
        let service = Service::new([
            opts::host("127.0.0.1"),
            opts::port(port),
            opts::logger(logger.clone()),
        ])
        .unwrap();

        let err = service.run().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(logger.contains(Level::ERROR, "Failed to bind"));
    }

    #[tokio::test]
    async fn test_serve_reports_tls_failure() {
        let service = Service::new([opts::https("/missing/cert.pem", "/missing/key.pem")]).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let err = service
            .serve(listener, ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Tls { .. }));
    }
}
