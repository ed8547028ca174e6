//! Fixed-capacity, drop-oldest queue (spec §5 "Back-pressure": "a production
//! implementation SHOULD impose per-queue caps ... drop-oldest for audio
//! chunks is acceptable; drop-newest for transcriptions is not"). Additive
//! to the default unbounded queues — nothing requires a caller to use this.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

/// A bounded FIFO that evicts its oldest entry on overflow rather than
/// blocking the producer or rejecting the new entry. Suited to high-rate,
/// stale-tolerant traffic like raw audio chunks; never use this for
/// transcriptions, which the spec explicitly forbids dropping newest-first
/// (dropping oldest here would silently favor newer chunks, which is the
/// intended policy for audio — the opposite policy for transcriptions means
/// just don't bound that queue).
pub struct BoundedDropOldestQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> BoundedDropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a value, evicting the oldest entry first if already at capacity.
    pub fn push(&self, value: T) {
        {
            let mut queue = self.inner.lock().unwrap();
            if queue.len() >= self.capacity {
                queue.pop_front();
                tracing::debug!("bounded queue at capacity, dropped oldest entry");
            }
            queue.push_back(value);
        }
        self.notify.notify_one();
    }

    /// Mark the queue closed; any waiting or future `recv` drains remaining
    /// entries, then returns `None`, mirroring a closed `mpsc` channel.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait for the next entry, or `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut queue = self.inner.lock().unwrap();
                if let Some(value) = queue.pop_front() {
                    return Some(value);
                }
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
