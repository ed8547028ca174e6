use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One item dequeued, one call to `process`. Implemented per pipeline stage
/// (transcriber, agent, synthesizer, action dispatcher).
#[async_trait]
pub trait Process: Send + Sync + 'static {
    type Input: Send + 'static;

    /// Handle one input item. Errors are logged by the worker loop and do
    /// not stop it — one bad item must not kill the worker (spec §4.1).
    async fn process(&self, item: Self::Input);
}

/// Owns `(input_queue, output_queue)` and a single run-task, per spec §4.1
/// "Cooperative worker". Generic over the item type and the `Process` impl
/// that consumes it; the output queue is whatever `P` chooses to hold — this
/// type only drives the input side, the way `audio_listener.rs`'s listener
/// task drives `AudioBusReceiver` without itself knowing what gets emitted.
pub struct CooperativeWorker<P: Process> {
    process: Arc<P>,
    input_rx: Option<mpsc::UnboundedReceiver<P::Input>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<P: Process> CooperativeWorker<P> {
    pub fn new(process: P, input_rx: mpsc::UnboundedReceiver<P::Input>) -> Self {
        Self {
            process: Arc::new(process),
            input_rx: Some(input_rx),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Launch the run-task. Calling `start` twice is a no-op if already
    /// running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let Some(mut input_rx) = self.input_rx.take() else {
            return;
        };
        let process = Arc::clone(&self.process);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("cooperative worker terminated");
                        break;
                    }
                    item = input_rx.recv() => item,
                };
                let Some(item) = item else {
                    tracing::debug!("cooperative worker input queue closed");
                    break;
                };
                process.process(item).await;
            }
        });
        self.handle = Some(handle);
    }

    /// Cancel the run-task. Cancellation propagates into `process` via the
    /// shared token; idempotent.
    pub fn terminate(&mut self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<P: Process> Drop for CooperativeWorker<P> {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcess(Arc<AtomicUsize>);

    #[async_trait]
    impl Process for CountingProcess {
        type Input = u32;
        async fn process(&self, _item: u32) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn processes_every_item_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut worker = CooperativeWorker::new(CountingProcess(Arc::clone(&counter)), rx);
        worker.start();

        for i in 0..5 {
            tx.send(i).unwrap();
        }
        drop(tx);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn terminate_stops_the_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut worker = CooperativeWorker::new(CountingProcess(Arc::clone(&counter)), rx);
        worker.start();
        worker.terminate();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // Further sends are accepted by the channel but should no longer be
        // drained once the loop observed cancellation.
        let _ = tx.send(1);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
