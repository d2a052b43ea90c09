//! One-shot close notification for media engine objects.
//!
//! A `CloseTrigger` is held by whoever owns the engine object; every
//! `CloseSignal` obtained from it resolves once the trigger fires. Triggers
//! form a hierarchy: firing a parent fires every child created from it,
//! which is how a transport close cascades to its producers and consumers.

use tokio_util::sync::CancellationToken;

/// Fires the close signal of one engine object.
#[derive(Debug, Clone, Default)]
pub struct CloseTrigger {
    token: CancellationToken,
}

impl CloseTrigger {
    /// Create a root trigger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Create a trigger that also fires when `self` fires.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Obtain a signal observing this trigger.
    #[must_use]
    pub fn signal(&self) -> CloseSignal {
        CloseSignal {
            token: self.token.clone(),
        }
    }

    /// Fire the trigger. Idempotent.
    pub fn fire(&self) {
        self.token.cancel();
    }

    /// Whether the trigger has fired (directly or through a parent).
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Resolves once the owning engine object is closed.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    token: CancellationToken,
}

impl CloseSignal {
    /// Wait until the object is closed. Returns immediately if it already is.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }

    /// Whether the object is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_resolves_after_fire() {
        let trigger = CloseTrigger::new();
        let signal = trigger.signal();
        assert!(!signal.is_closed());

        let waiter = tokio::spawn(async move { signal.closed().await });
        trigger.fire();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("signal should resolve")
            .expect("waiter should not panic");
    }

    #[test]
    fn test_fire_is_idempotent() {
        let trigger = CloseTrigger::new();
        trigger.fire();
        trigger.fire();
        assert!(trigger.is_fired());
        assert!(trigger.signal().is_closed());
    }

    #[test]
    fn test_parent_fire_cascades_to_children() {
        let transport = CloseTrigger::new();
        let producer = transport.child();
        let consumer = transport.child();

        transport.fire();

        assert!(producer.is_fired());
        assert!(consumer.signal().is_closed());
    }

    #[test]
    fn test_child_fire_does_not_close_parent() {
        let transport = CloseTrigger::new();
        let producer = transport.child();

        producer.fire();

        assert!(producer.is_fired());
        assert!(!transport.is_fired());
    }
}
