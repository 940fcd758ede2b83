use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide cancellation signal shared by every job.
///
/// Cloning is cheap; all clones observe the same flag. Once triggered the
/// signal stays triggered.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `trigger` has been called, immediately if it already was.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of `self`, so this cannot
        // observe a closed channel while we hold `&self`.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!signal.is_triggered());
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_cancelled_pending_until_triggered() {
        let signal = ShutdownSignal::new();
        let mut waiter = tokio_test::task::spawn(signal.cancelled());

        tokio_test::assert_pending!(waiter.poll());
        signal.trigger();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("already-triggered signal should resolve at once");
    }
}
