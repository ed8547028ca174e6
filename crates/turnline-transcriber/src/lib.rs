//! Turns an incoming stream of audio byte-chunks into a stream of
//! `Transcription` events (spec §4.2).
//!
//! The concrete ASR engine is an external collaborator (spec §1); only its
//! narrow streaming contract (`AsrEngine`) is specified here. The optional
//! side modules (InterruptModel, BackTrackingModel, VAD gate, ContextTracker)
//! are the "union of two divergent transcriber bases" DESIGN.md resolves by
//! taking the union, all optional.

mod hooks;

pub use hooks::{BackTrackingModel, ContextTracker, InterruptModel, VoiceActivityGate};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use turnline_audio::{silent_chunk, AudioEncoding};
use turnline_events::Transcription;
use turnline_worker::{CooperativeWorker, Process};

#[derive(Debug, thiserror::Error)]
pub enum TranscriberError {
    #[error("asr engine error: {0}")]
    Asr(String),
}

pub type Result<T> = std::result::Result<T, TranscriberError>;

#[derive(Debug, Clone, Copy)]
pub struct TranscriberConfig {
    pub audio_encoding: AudioEncoding,
    pub sampling_rate_hz: u32,
    pub chunk_size_bytes: usize,
    /// If true, a transcription tagged `is_interrupt` by the `InterruptModel`
    /// also gets forwarded with priority; left to the caller to interpret —
    /// the transcriber only sets the flag (spec §4.2).
    pub interrupt_on_blockers: bool,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            audio_encoding: AudioEncoding::Linear16,
            sampling_rate_hz: 16_000,
            chunk_size_bytes: 3200,
            interrupt_on_blockers: false,
        }
    }
}

/// Narrow streaming contract for the concrete ASR engine (out of scope per
/// spec §1 — only this interface is specified).
#[async_trait]
pub trait AsrEngine: Send + Sync + 'static {
    async fn feed(&self, chunk: Vec<u8>) -> Result<Vec<Transcription>>;

    /// Asynchronous readiness signal; defaults to always-ready (spec §4.2
    /// `ready()`), since initializing sub-models must never block ingest.
    async fn ready(&self) -> bool {
        true
    }
}

struct TranscriberProcess<E: AsrEngine> {
    engine: Arc<E>,
    output_tx: mpsc::UnboundedSender<Transcription>,
    interrupt_model: Option<Arc<dyn InterruptModel>>,
    back_tracking_model: Option<Arc<dyn BackTrackingModel>>,
    vad_gate: Option<Arc<Mutex<dyn VoiceActivityGate>>>,
    context_tracker: Option<Arc<dyn ContextTracker>>,
}

#[async_trait]
impl<E: AsrEngine> Process for TranscriberProcess<E> {
    type Input = Vec<u8>;

    async fn process(&self, chunk: Vec<u8>) {
        if let Some(vad) = &self.vad_gate {
            let has_speech = vad.lock().await.has_speech(&chunk);
            if !has_speech {
                return;
            }
        }

        let transcriptions = match self.engine.feed(chunk).await {
            Ok(results) => results,
            Err(err) => {
                // ASR errors are logged and the worker continues; a
                // permanently failing engine surfaces as silence (spec §4.2
                // failure semantics).
                tracing::warn!(error = %err, "asr engine error, dropping chunk");
                return;
            }
        };

        for mut transcription in transcriptions {
            if let Some(interrupt_model) = &self.interrupt_model {
                if interrupt_model.is_interrupt(&transcription.text).await {
                    transcription.is_interrupt = true;
                }
            }

            if let Some(back_tracking_model) = &self.back_tracking_model {
                if back_tracking_model
                    .is_back_tracking(&transcription.text)
                    .await
                {
                    tracing::debug!(text = %transcription.text, "suppressing back-tracking utterance");
                    continue;
                }
            }

            if transcription.is_final {
                if let Some(tracker) = &self.context_tracker {
                    tracker.observe_final(&transcription);
                }
            }

            if self.output_tx.send(transcription).is_err() {
                tracing::debug!("transcriber output queue closed");
                return;
            }
        }
    }
}

/// Public transcriber worker: owns the audio input queue, mute state, and
/// the `Transcription` output queue.
pub struct Transcriber<E: AsrEngine> {
    config: TranscriberConfig,
    engine: Arc<E>,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    muted: Arc<AtomicBool>,
    worker: CooperativeWorker<TranscriberProcess<E>>,
}

#[derive(Default)]
pub struct TranscriberHooks {
    pub interrupt_model: Option<Arc<dyn InterruptModel>>,
    pub back_tracking_model: Option<Arc<dyn BackTrackingModel>>,
    pub vad_gate: Option<Arc<Mutex<dyn VoiceActivityGate>>>,
    pub context_tracker: Option<Arc<dyn ContextTracker>>,
}

impl<E: AsrEngine> Transcriber<E> {
    pub fn new(
        config: TranscriberConfig,
        engine: E,
        hooks: TranscriberHooks,
    ) -> (Self, mpsc::UnboundedReceiver<Transcription>) {
        let engine = Arc::new(engine);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let process = TranscriberProcess {
            engine: Arc::clone(&engine),
            output_tx,
            interrupt_model: hooks.interrupt_model,
            back_tracking_model: hooks.back_tracking_model,
            vad_gate: hooks.vad_gate,
            context_tracker: hooks.context_tracker,
        };

        let mut worker = CooperativeWorker::new(process, input_rx);
        worker.start();

        (
            Self {
                config,
                engine,
                input_tx,
                muted: Arc::new(AtomicBool::new(false)),
                worker,
            },
            output_rx,
        )
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Non-blocking ingest. When muted, the chunk is replaced by an
    /// encoding-correct silent chunk of equal byte length, preserving
    /// downstream timing (spec §4.2 `send_audio`).
    pub fn send_audio(&self, chunk: Vec<u8>) {
        let to_send = if self.is_muted() {
            silent_chunk(self.config.audio_encoding, chunk.len())
        } else {
            chunk
        };
        if self.input_tx.send(to_send).is_err() {
            tracing::debug!("send_audio: transcriber input queue closed");
        }
    }

    /// Asynchronous readiness signal; never gates `send_audio`.
    pub async fn ready(&self) -> bool {
        self.engine.ready().await
    }

    pub fn terminate(&mut self) {
        self.worker.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use turnline_events::Transcription as T;

    struct EchoEngine {
        canned: StdMutex<Vec<T>>,
    }

    #[async_trait]
    impl AsrEngine for EchoEngine {
        async fn feed(&self, _chunk: Vec<u8>) -> Result<Vec<T>> {
            Ok(self.canned.lock().unwrap().drain(..).collect())
        }
    }

    #[tokio::test]
    async fn muted_send_audio_preserves_chunk_length() {
        let engine = EchoEngine {
            canned: StdMutex::new(vec![]),
        };
        let (transcriber, _rx) = Transcriber::new(
            TranscriberConfig::default(),
            engine,
            TranscriberHooks::default(),
        );
        transcriber.set_muted(true);
        transcriber.send_audio(vec![7u8; 320]);
        // We can't directly observe the internal queue here, but the
        // silent_chunk substitution is covered in turnline-audio; this just
        // exercises the call path without panicking.
        transcriber.set_muted(false);
    }

    #[tokio::test]
    async fn final_transcription_reaches_output_queue() {
        let engine = EchoEngine {
            canned: StdMutex::new(vec![T::new("hello", 0.95, true)]),
        };
        let (transcriber, mut rx) = Transcriber::new(
            TranscriberConfig::default(),
            engine,
            TranscriberHooks::default(),
        );
        transcriber.send_audio(vec![0u8; 320]);

        let received = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv())
            .await
            .expect("should not time out")
            .expect("channel open");
        assert_eq!(received.text, "hello");
        assert!(received.is_final);
    }

    #[tokio::test]
    async fn back_tracking_utterance_is_suppressed() {
        struct AlwaysBackTracking;
        #[async_trait]
        impl BackTrackingModel for AlwaysBackTracking {
            async fn is_back_tracking(&self, _text: &str) -> bool {
                true
            }
        }

        let engine = EchoEngine {
            canned: StdMutex::new(vec![T::new("uh-huh", 0.8, true)]),
        };
        let hooks = TranscriberHooks {
            back_tracking_model: Some(Arc::new(AlwaysBackTracking)),
            ..Default::default()
        };
        let (transcriber, mut rx) = Transcriber::new(TranscriberConfig::default(), engine, hooks);
        transcriber.send_audio(vec![0u8; 320]);

        let result = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err(), "back-tracking utterance should be suppressed");
    }

    #[tokio::test]
    async fn interrupt_model_tags_transcription() {
        struct AlwaysInterrupt;
        #[async_trait]
        impl InterruptModel for AlwaysInterrupt {
            async fn is_interrupt(&self, _text: &str) -> bool {
                true
            }
        }

        let engine = EchoEngine {
            canned: StdMutex::new(vec![T::new("stop", 0.9, true)]),
        };
        let hooks = TranscriberHooks {
            interrupt_model: Some(Arc::new(AlwaysInterrupt)),
            ..Default::default()
        };
        let (transcriber, mut rx) = Transcriber::new(TranscriberConfig::default(), engine, hooks);
        transcriber.send_audio(vec![0u8; 320]);

        let received = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv())
            .await
            .expect("should not time out")
            .expect("channel open");
        assert!(received.is_interrupt);
    }
}
