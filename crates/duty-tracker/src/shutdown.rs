//! Shutdown signalling for the dispute manager.
//!
//! All state the manager needs is written to the database within each tick, so shutting down only
//! means not starting another tick and giving the running one time to finish.

use std::time::Duration;

use tokio::{sync::watch, time::timeout};
use tracing::{info, warn};

/// Owned by whoever decides when to stop.
#[derive(Debug)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

/// Handed to the tasks that have to stop.
#[derive(Debug, Clone)]
pub struct ShutdownGuard {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Creates a signal and its first guard.
    pub fn new() -> (Self, ShutdownGuard) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, ShutdownGuard { receiver })
    }

    /// Creates another guard for the same signal.
    pub fn guard(&self) -> ShutdownGuard {
        ShutdownGuard {
            receiver: self.sender.subscribe(),
        }
    }

    /// Asks every guard to stop.
    pub fn send(&self) {
        info!("shutdown requested");
        self.sender.send_replace(true);
    }
}

impl ShutdownGuard {
    /// Whether a shutdown was requested.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once a shutdown is requested.
    ///
    /// Also resolves if the [`ShutdownSignal`] is dropped.
    pub async fn wait(&mut self) {
        // an error means the sender is gone, which is as good as a request
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}

/// Waits up to `shutdown_timeout` for `task` to finish.
///
/// Returns whether it finished in time.
pub async fn drain<F: std::future::Future<Output = ()>>(task: F, shutdown_timeout: Duration) -> bool {
    match timeout(shutdown_timeout, task).await {
        Ok(()) => {
            info!("shutdown complete");
            true
        }
        Err(_) => {
            warn!(?shutdown_timeout, "timed out waiting for the running tick to finish");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guards_observe_the_signal() {
        let (signal, mut guard) = ShutdownSignal::new();
        let other = signal.guard();
        assert!(!guard.should_shutdown());

        signal.send();
        guard.wait().await;
        assert!(guard.should_shutdown());
        assert!(other.should_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_signal_releases_waiters() {
        let (signal, mut guard) = ShutdownSignal::new();
        drop(signal);
        guard.wait().await;
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        assert!(drain(async {}, Duration::from_millis(10)).await);
        assert!(
            !drain(
                tokio::time::sleep(Duration::from_secs(10)),
                Duration::from_millis(10)
            )
            .await
        );
    }
}
