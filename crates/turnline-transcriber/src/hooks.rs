use async_trait::async_trait;
use turnline_events::Transcription;

/// Classifies transcription text; when matched, the transcriber sets
/// `is_interrupt=true` on the emitted transcription (spec §4.2
/// "InterruptModel" — e.g. an affirmative barge-in phrase).
#[async_trait]
pub trait InterruptModel: Send + Sync {
    async fn is_interrupt(&self, text: &str) -> bool;
}

/// Classifies whether an utterance is just a continuation-acknowledgement
/// ("uh-huh", "right") that should be skipped rather than trigger a full
/// agent turn (spec §4.2 "BackTrackingModel").
#[async_trait]
pub trait BackTrackingModel: Send + Sync {
    async fn is_back_tracking(&self, text: &str) -> bool;
}

/// Gates whether chunks are forwarded to the ASR engine at all (spec §4.2
/// "VoiceActivityDetector"). Mutable because VAD implementations typically
/// carry rolling state across chunks.
pub trait VoiceActivityGate: Send + Sync {
    fn has_speech(&mut self, chunk: &[u8]) -> bool;
}

/// Side-channel that observes final transcriptions to update dialog-state
/// features (spec §4.2 "ContextTracker").
pub trait ContextTracker: Send + Sync {
    fn observe_final(&self, transcription: &Transcription);
}
