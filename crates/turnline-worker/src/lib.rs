//! Worker runtime: the cooperative worker, the thread-bridged worker, and
//! `InterruptibleWorker` built on top of both (spec §4.1).
//!
//! Cancellation is modeled with `tokio_util::sync::CancellationToken` rather
//! than exceptions, the same idiom `plugins/stt-worker`'s audio listener
//! uses for its restartable `AudioListenerHandle`.

pub mod bounded;
mod cooperative;
mod interruptible;
mod thread_bridged;

pub use bounded::BoundedDropOldestQueue;
pub use cooperative::{CooperativeWorker, Process};
pub use interruptible::{InterruptibleProcess, InterruptibleWorker};
pub use thread_bridged::{ThreadBridgedWorker, ThreadProcess};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

use std::sync::Arc;
use tokio::sync::mpsc;
use turnline_events::{AgentResponseEvent, CompletionTracker, InterruptibleEvent};

/// Wrap `payload` in a fresh `InterruptibleEvent` and enqueue it (spec §4.1
/// "Output helpers").
pub fn emit<P>(
    output_tx: &mpsc::UnboundedSender<Arc<InterruptibleEvent<P>>>,
    payload: P,
    is_interruptable: bool,
) {
    let event = Arc::new(InterruptibleEvent::new(payload, is_interruptable));
    if output_tx.send(event).is_err() {
        tracing::debug!("emit: output queue closed, dropping event");
    }
}

/// Wrap `payload` in an `AgentResponseEvent`, creating a tracker if one
/// wasn't supplied, and enqueue it. Returns the tracker used so the caller
/// can await it (spec §4.1 "Output helpers").
pub fn emit_agent_response<P>(
    output_tx: &mpsc::UnboundedSender<Arc<AgentResponseEvent<P>>>,
    payload: P,
    is_interruptable: bool,
    tracker: Option<CompletionTracker>,
) -> CompletionTracker {
    let tracker = tracker.unwrap_or_default();
    let event = Arc::new(AgentResponseEvent::new(
        payload,
        is_interruptable,
        tracker.clone(),
    ));
    if output_tx.send(event).is_err() {
        tracing::debug!("emit_agent_response: output queue closed, dropping event");
    }
    tracker
}
