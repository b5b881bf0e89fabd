//! Stop signal shared by the node's tickers, pipeline workers and the HTTP
//! server.

use tokio::signal;
use tokio::sync::broadcast;

/// One-shot stop broadcast.
///
/// Each long-running task holds its own receiver from
/// [`subscribe`](Self::subscribe) and breaks out of its `select!` loop when
/// it fires. Only tasks subscribed before the trigger are notified.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every current subscriber. A trigger with no subscribers is a
    /// no-op.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Block until the process receives SIGINT or SIGTERM, then trigger.
    pub async fn wait_for_signal(&self) {
        let signal = termination_signal().await;
        tracing::info!(signal, "termination signal received");
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve with the name of the first termination signal delivered.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM, only SIGINT stops the node");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => "SIGINT",
        _ = sigterm => "SIGTERM",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_the_trigger() {
        let controller = ShutdownController::new();
        let mut ticker = controller.subscribe();
        let mut worker = controller.subscribe();
        controller.shutdown();
        assert!(ticker.recv().await.is_ok());
        assert!(worker.recv().await.is_ok());
    }

    #[test]
    fn trigger_without_subscribers_is_harmless() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.shutdown();
    }

    #[tokio::test]
    async fn late_subscriber_is_not_notified() {
        let controller = ShutdownController::new();
        controller.shutdown();
        let mut late = controller.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
