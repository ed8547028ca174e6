use std::thread::JoinHandle as ThreadJoinHandle;

use crossbeam_channel as cb;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Blocking per-item body that runs on a dedicated OS thread, for SDKs that
/// don't expose a truly async API (spec §4.1 "Thread-bridged worker").
pub trait ThreadProcess: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Handle one input item synchronously. Called from the dedicated
    /// thread, never from the async runtime.
    fn process(&mut self, item: Self::Input) -> Option<Self::Output>;
}

/// Same public surface as `CooperativeWorker`, but `process` runs on a
/// dedicated OS thread. Two paired `crossbeam_channel` queues bridge the
/// async side and the thread side (the same channel the teacher's cpal
/// capture stream uses to leave its callback thread, `crates/audio/src/stream.rs`):
/// one async->thread forwarding task, one plain OS thread pumping the
/// blocking body's output back onto an async-visible queue.
pub struct ThreadBridgedWorker<Input: Send + 'static, Output: Send + 'static> {
    cancel: CancellationToken,
    forward_in: Option<JoinHandle<()>>,
    thread: Option<ThreadJoinHandle<()>>,
    pump_out: Option<ThreadJoinHandle<()>>,
    output_rx: Option<mpsc::UnboundedReceiver<Output>>,
}

impl<Input: Send + 'static, Output: Send + 'static> ThreadBridgedWorker<Input, Output> {
    /// Start the bridge: a dedicated thread running `process` in a loop over
    /// items pulled from `input_rx` (the async-side input queue), forwarding
    /// its outputs back onto an async-visible output queue.
    pub fn start<P>(mut process: P, mut input_rx: mpsc::UnboundedReceiver<Input>) -> Self
    where
        P: ThreadProcess<Input = Input, Output = Output>,
    {
        let cancel = CancellationToken::new();

        // async input queue -> crossbeam channel the blocking thread reads from.
        let (to_thread_tx, to_thread_rx) = cb::unbounded::<Input>();
        // crossbeam channel the blocking thread writes to -> async output queue.
        let (from_thread_tx, from_thread_rx) = cb::unbounded::<Output>();
        let (output_tx, output_rx) = mpsc::unbounded_channel::<Output>();

        let forward_cancel = cancel.clone();
        let forward_in = tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = forward_cancel.cancelled() => break,
                    item = input_rx.recv() => item,
                };
                let Some(item) = item else { break };
                if to_thread_tx.send(item).is_err() {
                    break;
                }
            }
            // Dropping to_thread_tx lets the blocking thread observe channel
            // closure as its termination sentinel.
        });

        let thread = std::thread::spawn(move || {
            while let Ok(item) = to_thread_rx.recv() {
                if let Some(output) = process.process(item) {
                    if from_thread_tx.send(output).is_err() {
                        break;
                    }
                }
            }
        });

        // Plain OS thread pumping blocking `recv()` results onto the async
        // output queue; `UnboundedSender::send` is non-blocking so this
        // thread never needs runtime context.
        let pump_out = std::thread::spawn(move || {
            while let Ok(output) = from_thread_rx.recv() {
                if output_tx.send(output).is_err() {
                    break;
                }
            }
        });

        Self {
            cancel,
            forward_in: Some(forward_in),
            thread: Some(thread),
            pump_out: Some(pump_out),
            output_rx: Some(output_rx),
        }
    }

    pub fn output_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<Output>> {
        self.output_rx.take()
    }

    /// Stop the async-side forwarding task. The dedicated thread is expected
    /// to observe termination via the `to_thread` channel closing
    /// (sentinel), per spec §4.1; the output pump thread exits once the
    /// blocking thread's sender is dropped in turn.
    pub fn terminate(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.forward_in.take() {
            handle.abort();
        }
    }
}

impl<Input: Send + 'static, Output: Send + 'static> Drop for ThreadBridgedWorker<Input, Output> {
    fn drop(&mut self) {
        self.terminate();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        if let Some(pump) = self.pump_out.take() {
            let _ = pump.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;
    impl ThreadProcess for Doubler {
        type Input = u32;
        type Output = u32;
        fn process(&mut self, item: u32) -> Option<u32> {
            Some(item * 2)
        }
    }

    #[tokio::test]
    async fn bridges_input_to_output_through_dedicated_thread() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut worker = ThreadBridgedWorker::start(Doubler, rx);
        let mut output_rx = worker.output_receiver().expect("output receiver");

        tx.send(21).unwrap();
        let doubled = tokio::time::timeout(std::time::Duration::from_millis(200), output_rx.recv())
            .await
            .expect("should not time out")
            .expect("channel open");
        assert_eq!(doubled, 42);

        worker.terminate();
    }
}
