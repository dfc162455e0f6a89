//! Injectable logging capability.
//!
//! The service writes its lifecycle and request-failure messages through a
//! [`Logger`]. The default [`TracingLogger`] forwards to `tracing`, so the
//! messages end up in whatever subscriber the process installed.

use parking_lot::Mutex;
use tracing::Level;

/// A sink for service log messages.
///
/// Implemented for [`TracingLogger`], [`MemoryLogger`] and any
/// `Fn(Level, &str) + Send + Sync` closure.
pub trait Logger: Send + Sync + 'static {
    /// Writes one message at the given level.
    fn log(&self, level: Level, message: &str);

    /// Writes a debug message.
    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    /// Writes an info message.
    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    /// Writes a warning.
    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    /// Writes an error.
    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

impl<F> Logger for F
where
    F: Fn(Level, &str) + Send + Sync + 'static,
{
    fn log(&self, level: Level, message: &str) {
        self(level, message);
    }
}

/// Logger that emits `tracing` events under the `corekit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "corekit", "{message}"),
            Level::WARN => tracing::warn!(target: "corekit", "{message}"),
            Level::INFO => tracing::info!(target: "corekit", "{message}"),
            Level::DEBUG => tracing::debug!(target: "corekit", "{message}"),
            _ => tracing::trace!(target: "corekit", "{message}"),
        }
    }
}

/// Logger that keeps every message in memory.
///
/// Useful in tests that assert on what the service logged.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded entry.
    #[must_use]
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().clone()
    }

    /// Returns `true` if a message at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}
