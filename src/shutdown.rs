//! Cooperative shutdown signalling
//!
//! A `watch<bool>` channel flips to `true` once shutdown is requested. Every
//! long wait in the agent (sensor retry delay, publish interval, reconnect
//! backoff) goes through [`interruptible_sleep`] so SIGTERM is honoured promptly.

use std::time::Duration;
use tokio::sync::watch;

/// Sender half of the shutdown signal
pub type ShutdownTx = watch::Sender<bool>;
/// Receiver half of the shutdown signal
pub type ShutdownRx = watch::Receiver<bool>;

/// Create a shutdown channel in the "running" state
pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Check whether shutdown has already been requested
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    *shutdown_rx.borrow()
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
pub async fn interruptible_sleep(mut shutdown_rx: ShutdownRx, delay: Duration) -> bool {
    if is_shutdown_requested(&shutdown_rx) {
        return false;
    }

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can request shutdown any more
                    (&mut sleep).await;
                    return true;
                }
                if *shutdown_rx.borrow() {
                    return false;
                }
            }
        }
    }
}
