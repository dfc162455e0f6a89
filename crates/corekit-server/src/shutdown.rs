//! Graceful shutdown signal handling.
//!
//! [`ShutdownSignal`] wraps a `CancellationToken`. The service derives every
//! request context token from it, so triggering shutdown also cancels the
//! in-flight requests that watch their context.
//!
//! # Example
//!
//! ```rust,ignore
//! use corekit_server::ShutdownSignal;
//! use std::time::Duration;
//!
//! let shutdown = ShutdownSignal::with_os_signals();
//! tokio::select! {
//!     _ = shutdown.recv() => println!("Shutdown signal received"),
//!     _ = tokio::time::sleep(Duration::from_secs(60)) => println!("Timeout"),
//! }
//! ```

use std::sync::Arc;

use corekit_core::{Logger, TracingLogger};
use tokio_util::sync::CancellationToken;

/// A signal that can be used to trigger and await graceful shutdown.
///
/// Clones share the same state: triggering one triggers all of them.
///
/// # Example
///
/// ```rust
/// use corekit_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let shutdown_clone = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(shutdown_clone.is_shutdown());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates a new shutdown signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Triggers the shutdown signal.
    ///
    /// Calling this multiple times is safe and idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` if shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when shutdown is triggered, immediately if it already was.
    pub async fn recv(&self) {
        self.token.cancelled().await;
    }

    /// Returns a token that is cancelled together with this signal.
    ///
    /// Cancelling the child does not trigger the signal.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Creates a shutdown signal that triggers on SIGTERM or SIGINT
    /// (Ctrl+C on non-Unix platforms), logging through `tracing`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        Self::with_os_signals_logged(Arc::new(TracingLogger))
    }

    /// Like [`with_os_signals`](Self::with_os_signals), reporting the
    /// received signal through `logger`.
    ///
    /// The handlers are registered before this returns, so a signal sent
    /// afterwards is not missed. If they cannot be registered the failure is
    /// logged and the signal only fires through [`trigger`](Self::trigger).
    #[must_use]
    pub fn with_os_signals_logged(logger: Arc<dyn Logger>) -> Self {
        let signal = Self::new();
        let signals = match OsSignals::register() {
            Ok(signals) => signals,
            Err(e) => {
                logger.error(&format!("Failed to register signal handlers: {e}"));
                return signal;
            }
        };

        let signal_clone = signal.clone();
        tokio::spawn(async move {
            tokio::select! {
                received = signals.recv() => match received {
                    Ok(name) => {
                        logger.info(&format!("Received {name}, initiating graceful shutdown"));
                        signal_clone.trigger();
                    }
                    Err(e) => logger.error(&format!("Failed to wait for shutdown signal: {e}")),
                },
                // Stop listening once someone else triggered shutdown.
                () = signal_clone.recv() => {}
            }
        });

        signal
    }
}

#[cfg(unix)]
struct OsSignals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Waits for the first signal and returns its name.
    async fn recv(mut self) -> std::io::Result<&'static str> {
        tokio::select! {
            _ = self.terminate.recv() => Ok("SIGTERM"),
            _ = self.interrupt.recv() => Ok("SIGINT"),
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    #[allow(clippy::unnecessary_wraps)]
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> std::io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}
