//! Core event types shared across the pipeline: the `Event`/`InterruptibleEvent`
//! /`AgentResponseEvent` wrappers, the tagged `AgentInput`/`AgentResponse`
//! variants, and the small data types (`Transcription`, `FunctionCall`,
//! `ActionInput`/`ActionOutput`) they carry.
//!
//! Kept free of any worker/runtime behavior so every other pipeline crate can
//! depend on it without pulling in tokio-task machinery.

mod tracker;

pub use tracker::CompletionTracker;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Plain event wrapper for non-interruptible queue traffic (e.g. raw audio
/// chunks on the transcriber's input queue).
#[derive(Debug, Clone)]
pub struct Event<T>(pub T);

/// A shared, one-way cancellation flag. Setting it is idempotent; once set
/// it never clears. Cloning shares the same underlying flag across every
/// holder (the conversation supervisor, the owning worker, etc).
#[derive(Debug, Clone)]
pub struct InterruptionFlag(Arc<AtomicBool>);

impl InterruptionFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag directly. Exposed so an interrupter holding only a
    /// cloned flag (not the event itself) can still signal it; the owning
    /// event's `is_interrupted` still gates on `is_interruptable`, so this
    /// can never revive a completed event (invariant 2, spec §8).
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Default for InterruptionFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A queued unit of work that carries a one-way cancellation flag observable
/// by all holders, per spec §3 ("Event wrappers").
///
/// `is_interruptable` is itself mutable (not just the flag): a successfully
/// completed event is forced to `is_interruptable = false` so a late
/// interrupt attempt becomes a no-op, per invariant 2 in spec §8.
#[derive(Debug)]
pub struct InterruptibleEvent<P> {
    pub payload: P,
    is_interruptable: AtomicBool,
    flag: InterruptionFlag,
}

impl<P> InterruptibleEvent<P> {
    pub fn new(payload: P, is_interruptable: bool) -> Self {
        Self {
            payload,
            is_interruptable: AtomicBool::new(is_interruptable),
            flag: InterruptionFlag::new(),
        }
    }

    pub fn is_interruptable(&self) -> bool {
        self.is_interruptable.load(Ordering::SeqCst)
    }

    /// An event is "interrupted" only if it is still interruptable and its
    /// flag has been set; a non-interruptable event can never be interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.is_interruptable() && self.flag.is_set()
    }

    /// Attempt to interrupt this event. Returns `false` without side effects
    /// if the event is not (or no longer) interruptable — spec invariant 1.
    pub fn interrupt(&self) -> bool {
        if !self.is_interruptable() {
            return false;
        }
        self.flag.set();
        true
    }

    /// Force this event to stop being interruptable. Called by the owning
    /// worker once `process` completes successfully.
    pub fn mark_not_interruptable(&self) {
        self.is_interruptable.store(false, Ordering::SeqCst);
    }

    /// A clone of the shared flag, so an interrupter that only holds a
    /// reference to the flag (not the event) can still set it.
    pub fn flag(&self) -> InterruptionFlag {
        self.flag.clone()
    }
}

/// An `InterruptibleEvent` that additionally carries a `CompletionTracker`,
/// raised by the downstream synthesizer once the corresponding audio has
/// finished playing (spec §3).
#[derive(Debug)]
pub struct AgentResponseEvent<P> {
    pub inner: InterruptibleEvent<P>,
    pub completion_tracker: CompletionTracker,
}

impl<P> AgentResponseEvent<P> {
    pub fn new(payload: P, is_interruptable: bool, completion_tracker: CompletionTracker) -> Self {
        Self {
            inner: InterruptibleEvent::new(payload, is_interruptable),
            completion_tracker,
        }
    }

    pub fn payload(&self) -> &P {
        &self.inner.payload
    }
}

/// A transcriber output record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
    #[serde(default)]
    pub is_interrupt: bool,
}

impl Transcription {
    pub fn new(text: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final,
            is_interrupt: false,
        }
    }
}

/// A tool/function invocation requested by the agent's lazy output stream,
/// interleaved with text fragments (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Opaque JSON-encoded arguments; parsed by the `ActionDispatcher`.
    pub arguments: String,
}

/// Input to an action invocation (spec §4.4 / §3 `ActionResultInput`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInput {
    pub conversation_id: String,
    pub action_name: String,
    pub params: serde_json::Value,
    /// The caller's Vonage UUID or Twilio SID, when the action requires one.
    #[serde(default)]
    pub caller_id: Option<String>,
    /// Tracker for a pre-action acknowledgement message, so the action
    /// executor can wait for it to finish playing before acting.
    #[serde(skip)]
    pub user_message_tracker: Option<CompletionTracker>,
}

/// Result of an executed action (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub response: serde_json::Value,
}

/// Tagged input to the agent (spec §3 `AgentInput`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentInput {
    #[serde(rename = "agent_input_transcription")]
    TranscriptionInput {
        conversation_id: String,
        transcription: Transcription,
        #[serde(default)]
        vonage_uuid: Option<String>,
        #[serde(default)]
        twilio_sid: Option<String>,
        #[serde(skip)]
        agent_response_tracker: Option<CompletionTracker>,
    },
    #[serde(rename = "agent_input_action_result")]
    ActionResultInput {
        conversation_id: String,
        action_input: ActionInput,
        action_output: ActionOutput,
        #[serde(default)]
        is_quiet: bool,
    },
}

impl AgentInput {
    pub fn conversation_id(&self) -> &str {
        match self {
            AgentInput::TranscriptionInput { conversation_id, .. } => conversation_id,
            AgentInput::ActionResultInput { conversation_id, .. } => conversation_id,
        }
    }
}

/// Tagged agent output (spec §3 `AgentResponse`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentResponse {
    #[serde(rename = "agent_response_message")]
    Message { text: String, is_interruptable: bool },
    #[serde(rename = "agent_response_stop")]
    Stop,
    #[serde(rename = "agent_response_filler_audio")]
    FillerAudio,
    #[serde(rename = "agent_response_back_tracking_audio")]
    BackTrackingAudio,
    #[serde(rename = "agent_response_follow_up_audio")]
    FollowUpAudio { seconds_spoken: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interruptable_event_ignores_interrupt() {
        let event = InterruptibleEvent::new("payload", false);
        assert!(!event.interrupt());
        assert!(!event.is_interrupted());
    }

    #[test]
    fn interruptable_event_can_be_interrupted_once() {
        let event = InterruptibleEvent::new("payload", true);
        assert!(event.interrupt());
        assert!(event.is_interrupted());
    }

    #[test]
    fn completed_event_forced_non_interruptable() {
        let event = InterruptibleEvent::new("payload", true);
        event.mark_not_interruptable();
        assert!(!event.interrupt());
        assert!(!event.is_interrupted());
    }

    #[test]
    fn shared_flag_observed_by_clone() {
        // Simulates an interrupter (conversation supervisor) that only holds
        // a clone of the flag, not the event itself.
        let event = InterruptibleEvent::new("payload", true);
        let flag = event.flag();
        assert!(!flag.is_set());
        event.interrupt();
        assert!(flag.is_set());
    }

    #[test]
    fn agent_input_wire_tag_roundtrips() {
        let input = AgentInput::TranscriptionInput {
            conversation_id: "c1".into(),
            transcription: Transcription::new("hello", 0.95, true),
            vonage_uuid: None,
            twilio_sid: None,
            agent_response_tracker: None,
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"type\":\"agent_input_transcription\""));
        let round_tripped: AgentInput = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped.conversation_id(), "c1");
    }

    #[test]
    fn agent_response_wire_tags_match_spec() {
        let stop = AgentResponse::Stop;
        assert_eq!(
            serde_json::to_value(&stop).unwrap()["type"],
            "agent_response_stop"
        );
        let message = AgentResponse::Message {
            text: "hi".into(),
            is_interruptable: true,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap()["type"],
            "agent_response_message"
        );
    }
}
