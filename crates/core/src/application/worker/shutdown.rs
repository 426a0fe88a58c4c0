// Worker Shutdown Token

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Token that is never triggered
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal.
    ///
    /// Pends forever once the sender is gone without having signalled.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to all workers
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        tokio::time::timeout(Duration::from_millis(100), token.wait())
            .await
            .expect("wait should return once shutdown is signalled");
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_never_token_does_not_fire() {
        let mut token = ShutdownToken::never();
        let waited = tokio::time::timeout(Duration::from_millis(50), token.wait()).await;
        assert!(waited.is_err());
        assert!(!token.is_shutdown());
    }

    #[test]
    fn test_cloned_token_is_woken_by_sender() {
        use tokio_test::{assert_pending, assert_ready, task};

        let (tx, token) = shutdown_channel();
        let mut clone = token.clone();
        let mut wait = task::spawn(async move { clone.wait().await });

        assert_pending!(wait.poll());
        tx.shutdown();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
        assert!(token.is_shutdown());
    }
}
