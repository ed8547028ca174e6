use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use turnline_events::InterruptibleEvent;

use crate::bounded::BoundedDropOldestQueue;

/// Default `max_concurrency` ceiling, per spec §4.1. The original source
/// declared the field but never enforced it; here it is backed by a
/// `Semaphore` (DESIGN.md open-question decision: enforce, don't drop).
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Per-item processing for an `InterruptibleWorker`. Unlike `Process`, the
/// item arrives still wrapped in its `InterruptibleEvent` so implementations
/// can re-check the flag mid-processing if they await multiple suspension
/// points (spec §5 "Suspension points").
#[async_trait]
pub trait InterruptibleProcess: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    async fn process(&self, event: Arc<InterruptibleEvent<Self::Payload>>);
}

struct InFlight<Payload> {
    handle: JoinHandle<()>,
    event: Arc<InterruptibleEvent<Payload>>,
}

/// Either of the two input sources an `InterruptibleWorker` can drain: the
/// default unbounded `mpsc` queue, or a capped, drop-oldest queue for
/// producers where unbounded growth is a production risk (spec §5
/// back-pressure note).
enum InputSource<Payload> {
    Unbounded(mpsc::UnboundedReceiver<Arc<InterruptibleEvent<Payload>>>),
    BoundedDropOldest(Arc<BoundedDropOldestQueue<Arc<InterruptibleEvent<Payload>>>>),
}

impl<Payload> InputSource<Payload> {
    async fn recv(&mut self) -> Option<Arc<InterruptibleEvent<Payload>>> {
        match self {
            InputSource::Unbounded(rx) => rx.recv().await,
            InputSource::BoundedDropOldest(queue) => queue.recv().await,
        }
    }
}

/// Wraps the cooperative worker shape with the three additional contracts in
/// spec §4.1: pre-process flag check, a cancellable handle to the in-flight
/// task, and forcing `is_interruptable = false` after successful completion.
pub struct InterruptibleWorker<P: InterruptibleProcess> {
    process: Arc<P>,
    input: Option<InputSource<P::Payload>>,
    cancel: CancellationToken,
    max_concurrency: Arc<Semaphore>,
    in_flight: Arc<Mutex<Option<InFlight<P::Payload>>>>,
    handle: Option<JoinHandle<()>>,
}

impl<P: InterruptibleProcess> InterruptibleWorker<P> {
    pub fn new(
        process: P,
        input_rx: mpsc::UnboundedReceiver<Arc<InterruptibleEvent<P::Payload>>>,
    ) -> Self {
        Self::with_max_concurrency(process, input_rx, DEFAULT_MAX_CONCURRENCY)
    }

    pub fn with_max_concurrency(
        process: P,
        input_rx: mpsc::UnboundedReceiver<Arc<InterruptibleEvent<P::Payload>>>,
        max_concurrency: usize,
    ) -> Self {
        Self::from_source(process, InputSource::Unbounded(input_rx), max_concurrency)
    }

    /// Drain a capped, drop-oldest queue instead of an unbounded `mpsc`
    /// channel (spec §5 back-pressure note). Additive: the default
    /// constructors above remain unbounded.
    pub fn with_bounded_drop_oldest_queue(
        process: P,
        queue: Arc<BoundedDropOldestQueue<Arc<InterruptibleEvent<P::Payload>>>>,
        max_concurrency: usize,
    ) -> Self {
        Self::from_source(process, InputSource::BoundedDropOldest(queue), max_concurrency)
    }

    fn from_source(process: P, input: InputSource<P::Payload>, max_concurrency: usize) -> Self {
        Self {
            process: Arc::new(process),
            input: Some(input),
            cancel: CancellationToken::new(),
            max_concurrency: Arc::new(Semaphore::new(max_concurrency.max(1))),
            in_flight: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let Some(mut input) = self.input.take() else {
            return;
        };
        let process = Arc::clone(&self.process);
        let cancel = self.cancel.clone();
        let semaphore = Arc::clone(&self.max_concurrency);
        let in_flight = Arc::clone(&self.in_flight);

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("interruptible worker terminated");
                        break;
                    }
                    event = input.recv() => event,
                };
                let Some(event) = event else {
                    tracing::debug!("interruptible worker input queue closed");
                    break;
                };

                // Contract 1: drop silently if already interrupted.
                if event.is_interrupted() {
                    tracing::debug!("dropping pre-interrupted event");
                    continue;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let task_process = Arc::clone(&process);
                let task_event = Arc::clone(&event);
                let task_event_for_slot = Arc::clone(&event);
                let task_event_for_completion = Arc::clone(&event);
                let in_flight_for_task = Arc::clone(&in_flight);

                let task_handle = tokio::spawn(async move {
                    let _permit = permit;
                    task_process.process(task_event).await;

                    // Contract 3: force non-interruptable after a successful
                    // completion so a late interrupt() is a no-op. An
                    // aborted task never reaches this line.
                    task_event_for_completion.mark_not_interruptable();

                    let mut slot = in_flight_for_task.lock().await;
                    if let Some(current) = slot.as_ref() {
                        if Arc::ptr_eq(&current.event, &task_event_for_completion) {
                            *slot = None;
                        }
                    }
                });

                // Contract 2: retain a handle to the in-flight task + event
                // so `cancel_current_task` can reach it.
                {
                    let mut slot = in_flight.lock().await;
                    *slot = Some(InFlight {
                        handle: task_handle,
                        event: task_event_for_slot,
                    });
                }
            }
        });
        self.handle = Some(handle);
    }

    pub fn terminate(&mut self) {
        self.cancel.cancel();
    }

    /// Cancel the current in-flight task, but only if its event is still
    /// marked interruptable (spec §4.1 contract 2 / §5 interruption protocol
    /// step 2).
    pub async fn cancel_current_task(&self) {
        let slot = self.in_flight.lock().await;
        if let Some(in_flight) = slot.as_ref() {
            if in_flight.event.is_interruptable() {
                in_flight.handle.abort();
            }
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<P: InterruptibleProcess> Drop for InterruptibleWorker<P> {
    fn drop(&mut self) {
        self.terminate();
    }
}
