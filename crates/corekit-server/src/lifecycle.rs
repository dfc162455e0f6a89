//! Service lifecycle states.
//!
//! A service moves through the states in order and never goes back:
//!
//! ```text
//! Created -> Listening -> ShuttingDown -> Stopped
//! ```
//!
//! Serving consumes the service, so a stopped service cannot be restarted.
//! Transitions are published on a `tokio::sync::watch` channel, see
//! [`Service::lifecycle`](crate::Service::lifecycle).

use std::fmt;

use tokio::sync::watch;

/// The state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    /// Built, routes may still be registered.
    Created,
    /// Accepting connections.
    Listening,
    /// No longer accepting; in-flight requests are finishing.
    ShuttingDown,
    /// All connections are closed.
    Stopped,
}

impl LifecycleState {
    /// Returns `true` once shutdown has started.
    #[must_use]
    pub fn is_shutting_down(self) -> bool {
        self >= Self::ShuttingDown
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Publishes state transitions, rejecting moves backwards.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Created);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    pub(crate) fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Moves to `next`. Returns `false` if that would go backwards.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered() {
        assert!(LifecycleState::Created < LifecycleState::Listening);
        assert!(LifecycleState::Listening < LifecycleState::ShuttingDown);
        assert!(LifecycleState::ShuttingDown < LifecycleState::Stopped);
        assert!(!LifecycleState::Listening.is_shutting_down());
        assert!(LifecycleState::Stopped.is_shutting_down());
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleState::ShuttingDown.to_string(), "shutting down");
        assert_eq!(LifecycleState::Created.to_string(), "created");
    }

    #[test]
    fn test_advance_only_forward() {
        let lifecycle = Lifecycle::new();
        let rx = lifecycle.subscribe();

        assert!(lifecycle.advance(LifecycleState::Listening));
        assert!(!lifecycle.advance(LifecycleState::Created));
        assert!(!lifecycle.advance(LifecycleState::Listening));
        assert!(lifecycle.advance(LifecycleState::Stopped));

        assert_eq!(lifecycle.current(), LifecycleState::Stopped);
        assert_eq!(*rx.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let lifecycle = Lifecycle::new();
        let mut rx = lifecycle.subscribe();

        lifecycle.advance(LifecycleState::Listening);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), LifecycleState::Listening);
    }
}
