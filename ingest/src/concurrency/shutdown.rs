//! Broadcast shutdown channel shared by all workers of one pipeline.
//!
//! Wraps a tokio watch channel into a pair of shutdown-specific types. A
//! single [`ShutdownTx::shutdown`] call reaches every subscribed receiver;
//! workers check [`ShutdownRx::is_shutdown`] at loop heads and await
//! [`ShutdownRx::wait_for_shutdown`] inside `select!` arms.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to all subscribed receivers.
    ///
    /// Uses an infallible send so the signal also sticks when it is raised
    /// before any worker subscribed, or after all of them finished.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Creates a new receiver subscribed to this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns true once shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes when shutdown is signalled.
    ///
    /// Resolves immediately if shutdown already happened, so it is safe to
    /// use in `select!` loops without missing an earlier signal.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.0.clone();
        // wait_for inspects the current value before suspending, so a signal
        // sent before this call is never lost.
        let _ = rx.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a new shutdown channel pair.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_reaches_existing_and_late_subscribers() {
        let (tx, rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        tx.shutdown();

        assert!(rx.is_shutdown());
        // A receiver subscribed after the signal still observes it.
        let late = tx.subscribe();
        assert!(late.is_shutdown());
        late.wait_for_shutdown().await;
    }
}
