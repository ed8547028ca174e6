use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A one-shot signal raised when the audio for a given text has finished
/// playing (spec §3). Unlike a plain `tokio::sync::oneshot`, it can be
/// waited on from multiple holders and checked without consuming it,
/// mirroring `asyncio.Event` in the source this was distilled from.
#[derive(Clone)]
pub struct CompletionTracker(Arc<Inner>);

struct Inner {
    signaled: AtomicBool,
    notify: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            signaled: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    /// Raise the signal. Idempotent — signaling twice is a no-op.
    pub fn signal(&self) {
        self.0.signaled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_signaled(&self) -> bool {
        self.0.signaled.load(Ordering::SeqCst)
    }

    /// Wait for the signal. Returns immediately if already signaled.
    pub async fn wait(&self) {
        if self.is_signaled() {
            return;
        }
        let notified = self.0.notify.notified();
        // Double-check after subscribing, in case `signal` ran between the
        // first check and `notified()` registering.
        if self.is_signaled() {
            return;
        }
        notified.await;
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTracker")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_if_already_signaled() {
        let tracker = CompletionTracker::new();
        tracker.signal();
        tokio::time::timeout(std::time::Duration::from_millis(50), tracker.wait())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn wait_unblocks_on_signal() {
        let tracker = CompletionTracker::new();
        let waiter = tracker.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        tracker.signal();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("should resolve")
            .unwrap();
    }

    #[test]
    fn signal_is_idempotent() {
        let tracker = CompletionTracker::new();
        tracker.signal();
        tracker.signal();
        assert!(tracker.is_signaled());
    }
}
