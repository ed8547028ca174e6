//! Thin supervisor wiring the four workers together (spec §2 "pipeline").
//!
//! Owns the shared `Transcript`, the `ActionDispatcher`/`AgentWorker` pair,
//! and the playback loop that turns each `Message` agent-response event into
//! synthesized audio via a `Synthesizer`. Tracks the one in-flight
//! agent-response event it can reach so `interrupt()` can fan out the
//! interruption protocol (spec §5) without the caller needing to know the
//! pipeline's internal wiring.
//!
//! Telephony/session management, the concrete audio sink, and filler-audio
//! category selection are external collaborators (spec §1) — kept out of
//! this crate by design, not dropped for lack of time.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use turnline_actions::{ActionConfig, ActionDispatcher, ActionFactory};
use turnline_agent::{Agent, AgentConfig, AgentWorker, GoodbyeDetector};
use turnline_events::{
    ActionInput, AgentInput, AgentResponse, AgentResponseEvent, InterruptibleEvent, Transcription,
};
use turnline_synthesizer::{Synthesizer, SynthesizerConfig};
use turnline_transcript::Transcript;

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

/// Sink the playback loop hands finished chunks to; the concrete transport
/// (telephony leg, local speaker, websocket) is external (spec §1).
pub trait AudioSink: Send + Sync + 'static {
    fn play(&self, chunk: turnline_synthesizer::ChunkResult);
}

impl<F: Fn(turnline_synthesizer::ChunkResult) + Send + Sync + 'static> AudioSink for F {
    fn play(&self, chunk: turnline_synthesizer::ChunkResult) {
        (self)(chunk)
    }
}

/// Owns one conversation's shared state and worker wiring (spec §2, §5
/// "Shared state").
pub struct Conversation {
    conversation_id: String,
    transcript: Arc<Mutex<Transcript>>,
    agent: AgentWorker,
    current_event: Arc<Mutex<Option<Arc<AgentResponseEvent<AgentResponse>>>>>,
    playback_task: Option<JoinHandle<()>>,
}

impl Conversation {
    /// Wire a fresh conversation: builds the `ActionDispatcher` + `AgentWorker`
    /// pair, then spawns the playback loop driving `synthesizer` over the
    /// agent's output queue. Returns the actions queue receiver so an
    /// external action executor (out of scope, spec §1) can drain it.
    #[allow(clippy::too_many_arguments)]
    pub fn new<A: Agent>(
        conversation_id: impl Into<String>,
        agent_config: AgentConfig,
        agent: A,
        actions: Vec<ActionConfig>,
        action_factory: Arc<dyn ActionFactory>,
        goodbye_detector: Option<Arc<dyn GoodbyeDetector>>,
        synthesizer: Arc<dyn Synthesizer>,
        synthesizer_config: SynthesizerConfig,
        chunk_size: usize,
        sink: impl AudioSink,
    ) -> (Self, mpsc::UnboundedReceiver<Arc<InterruptibleEvent<ActionInput>>>) {
        let conversation_id = conversation_id.into();
        let transcript = Arc::new(Mutex::new(Transcript::new()));

        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(actions, action_factory, actions_tx);

        let (agent, mut agent_response_rx) = AgentWorker::new(
            agent_config,
            agent,
            dispatcher,
            Arc::clone(&transcript),
            goodbye_detector,
        );

        let current_event = Arc::new(Mutex::new(None));
        let playback_transcript = Arc::clone(&transcript);
        let playback_current = Arc::clone(&current_event);
        let playback_conversation_id = conversation_id.clone();
        let sink = Arc::new(sink);
        let bytes_per_second = turnline_audio::chunk_size_per_second(
            synthesizer_config.audio_encoding,
            synthesizer_config.sampling_rate_hz,
        ) as f64;

        let playback_task = tokio::spawn(async move {
            while let Some(event) = agent_response_rx.recv().await {
                match event.payload() {
                    AgentResponse::Stop => {
                        tracing::debug!("conversation received stop, ending playback loop");
                        break;
                    }
                    AgentResponse::Message { text, .. } => {
                        {
                            let mut transcript = playback_transcript.lock().await;
                            transcript.append_bot(&playback_conversation_id, text.clone());
                        }
                        *playback_current.lock().await = Some(Arc::clone(&event));

                        let mut result = match synthesizer
                            .create_speech(text, chunk_size, None)
                            .await
                        {
                            Ok(result) => result,
                            Err(err) => {
                                tracing::warn!(error = %err, "synthesis failed, skipping message");
                                // Transient stream error (spec §7): nothing
                                // was played, so there is no prefix to
                                // reconstruct. Invariant 3 (spec §8) still
                                // requires the tracker to resolve one way or
                                // another; signal it rather than leaving it
                                // dangling forever.
                                event.completion_tracker.signal();
                                *playback_current.lock().await = None;
                                continue;
                            }
                        };

                        let mut seconds_played = 0.0;
                        while let Some(chunk) = result.chunk_stream.next().await {
                            if event.inner.is_interrupted() {
                                break;
                            }
                            if bytes_per_second > 0.0 {
                                seconds_played += chunk.chunk.len() as f64 / bytes_per_second;
                            }
                            sink.play(chunk);
                        }

                        if event.inner.is_interrupted() {
                            // Invariant 4 (spec §8): completion_tracker stays
                            // unsignaled; repair the transcript to what the
                            // caller actually heard (spec §3).
                            let heard = result.message_up_to(seconds_played);
                            let mut transcript = playback_transcript.lock().await;
                            transcript.repair_last_bot_entry(heard);
                        } else {
                            event.completion_tracker.signal();
                            event.inner.mark_not_interruptable();
                        }
                        *playback_current.lock().await = None;
                    }
                    AgentResponse::FillerAudio
                    | AgentResponse::BackTrackingAudio
                    | AgentResponse::FollowUpAudio { .. } => {
                        // Pre-rendered filler/backtracking/follow-up audio is
                        // played from a `FillerAudioLibrary` the deployment
                        // owns (category selection is an external concern,
                        // spec §1); this thin supervisor just unblocks the
                        // tracker so nothing waits on it forever.
                        event.completion_tracker.signal();
                        event.inner.mark_not_interruptable();
                    }
                }
            }
        });

        (
            Self {
                conversation_id,
                transcript,
                agent,
                current_event,
                playback_task: Some(playback_task),
            },
            actions_rx,
        )
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
        Arc::clone(&self.transcript)
    }

    /// Submit a transcription (or action result) to the agent.
    pub fn submit(&self, input: AgentInput, is_interruptable: bool) {
        self.agent.submit(input, is_interruptable);
    }

    /// Wire a transcriber's `Transcription` output queue into this
    /// conversation's agent input queue, completing the four-worker wiring
    /// in spec §4.7. Kept as a standalone bridge task rather than a type
    /// parameter on `Conversation` itself, so this crate doesn't need to be
    /// generic over every caller's concrete `AsrEngine`.
    ///
    /// `vonage_uuid`/`twilio_sid` are attached to every bridged transcription
    /// as-is, since a transcriber's output carries no caller-identity
    /// metadata of its own (spec §3 `Transcription`); pass `None` for both
    /// unless this conversation is backing a Vonage/Twilio leg.
    pub fn spawn_transcriber_bridge(
        &self,
        mut transcription_rx: mpsc::UnboundedReceiver<Transcription>,
        vonage_uuid: Option<String>,
        twilio_sid: Option<String>,
    ) -> JoinHandle<()> {
        let conversation_id = self.conversation_id.clone();
        let submit_handle = self.agent.submit_handle();

        tokio::spawn(async move {
            while let Some(transcription) = transcription_rx.recv().await {
                submit_handle.submit(
                    AgentInput::TranscriptionInput {
                        conversation_id: conversation_id.clone(),
                        transcription,
                        vonage_uuid: vonage_uuid.clone(),
                        twilio_sid: twilio_sid.clone(),
                        agent_response_tracker: None,
                    },
                    true,
                );
            }
            tracing::debug!("transcriber bridge: transcription queue closed");
        })
    }

    pub fn set_agent_muted(&self, muted: bool) {
        self.agent.set_muted(muted);
    }

    /// Fan out the interruption protocol (spec §5 step 1): cancel the
    /// agent's in-flight turn if it's still interruptable, and set the flag
    /// on whatever `Message` is currently being played back.
    pub async fn interrupt(&self) {
        self.agent.cancel_current_task().await;
        if let Some(event) = self.current_event.lock().await.as_ref() {
            event.inner.interrupt();
        }
    }

    pub fn terminate(&mut self) {
        self.agent.terminate();
        if let Some(task) = self.playback_task.take() {
            task.abort();
        }
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use turnline_actions::DefaultActionFactory;
    use turnline_agent::ResponseItem;
    use turnline_audio::AudioEncoding;
    use turnline_events::Transcription;
    use turnline_synthesizer::synthesis_result_from_pcm;

    struct CannedAgent {
        fragments: Vec<(&'static str, bool)>,
    }

    #[async_trait]
    impl Agent for CannedAgent {
        fn generate_response(
            &self,
            _human_input: String,
            _conversation_id: String,
            _is_interrupt: bool,
            _confidence: f32,
        ) -> BoxStream<'static, (ResponseItem, bool)> {
            let items: Vec<_> = self
                .fragments
                .iter()
                .map(|(text, interruptable)| (ResponseItem::Text(text.to_string()), *interruptable))
                .collect();
            Box::pin(futures::stream::iter(items))
        }
    }

    struct EchoSynthesizer;

    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn create_speech(
            &self,
            message: &str,
            chunk_size: usize,
            _sentiment: Option<&str>,
        ) -> turnline_synthesizer::Result<turnline_synthesizer::SynthesisResult> {
            let config = SynthesizerConfig {
                audio_encoding: AudioEncoding::Linear16,
                sampling_rate_hz: 16_000,
                should_encode_as_wav: false,
                words_per_minute: 150,
            };
            let pcm = vec![0u8; message.len() * 2];
            Ok(synthesis_result_from_pcm(&config, message, pcm, chunk_size))
        }
    }

    fn test_conversation(
        fragments: Vec<(&'static str, bool)>,
    ) -> (
        Conversation,
        mpsc::UnboundedReceiver<Arc<InterruptibleEvent<ActionInput>>>,
        Arc<StdMutex<Vec<Vec<u8>>>>,
    ) {
        let played = Arc::new(StdMutex::new(Vec::new()));
        let played_for_sink = Arc::clone(&played);
        let sink = move |chunk: turnline_synthesizer::ChunkResult| {
            played_for_sink.lock().unwrap().push(chunk.chunk);
        };

        let (conversation, actions_rx) = Conversation::new(
            "c1",
            AgentConfig::default(),
            CannedAgent { fragments },
            vec![],
            Arc::new(DefaultActionFactory),
            None,
            Arc::new(EchoSynthesizer),
            SynthesizerConfig::default(),
            8,
            sink,
        );
        (conversation, actions_rx, played)
    }

    #[tokio::test]
    async fn s1_happy_path_plays_both_messages_and_records_transcript() {
        let (conversation, _actions_rx, played) = test_conversation(vec![
            ("Hi there.", true),
            ("How can I help?", true),
        ]);

        conversation.submit(
            AgentInput::TranscriptionInput {
                conversation_id: "c1".into(),
                transcription: Transcription::new("hello", 0.95, true),
                vonage_uuid: None,
                twilio_sid: None,
                agent_response_tracker: None,
            },
            true,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!played.lock().unwrap().is_empty());
        let transcript = conversation.transcript();
        let transcript = transcript.lock().await;
        assert_eq!(transcript.human_entries().count(), 1);
        assert_eq!(transcript.bot_entries().count(), 2);
    }

    #[tokio::test]
    async fn interrupt_with_nothing_playing_is_a_harmless_noop() {
        let (conversation, _actions_rx, _played) = test_conversation(vec![]);
        conversation.interrupt().await;
    }

    #[tokio::test]
    async fn transcriber_bridge_forwards_transcriptions_to_the_agent() {
        let (conversation, _actions_rx, played) = test_conversation(vec![("Hi there.", true)]);
        let (transcription_tx, transcription_rx) = mpsc::unbounded_channel();
        let _bridge = conversation.spawn_transcriber_bridge(transcription_rx, None, None);

        transcription_tx
            .send(Transcription::new("hello", 0.9, true))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!played.lock().unwrap().is_empty());
        let transcript = conversation.transcript();
        let transcript = transcript.lock().await;
        assert_eq!(transcript.human_entries().count(), 1);
    }
}
