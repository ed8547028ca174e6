//! Exercises the conversation pipeline end to end against scripted
//! collaborators standing in for the real ASR/LLM/TTS engines (spec §1):
//! S0 full pipeline wiring (raw audio through the transcriber bridge),
//! S1 happy path, S2 barge-in, S3 action dispatch with a spoken
//! acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use turnline_actions::{ActionConfig, ActionKind, DefaultActionFactory};
use turnline_agent::{Agent, AgentConfig, ResponseItem};
use turnline_audio::AudioEncoding;
use turnline_conversation::Conversation;
use turnline_events::{AgentInput, FunctionCall, Transcription};
use turnline_synthesizer::{
    message_cutoff_from_total_response_length, pcm_chunk_stream, ChunkResult, SynthesisResult,
    Synthesizer, SynthesizerConfig,
};
use turnline_transcriber::{AsrEngine, Transcriber, TranscriberConfig, TranscriberHooks};

/// Plays back a fixed script, standing in for a real language model.
struct ScriptedAgent {
    fragments: Vec<(&'static str, bool)>,
    function_call: Option<FunctionCall>,
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn generate_response(
        &self,
        _human_input: String,
        _conversation_id: String,
        _is_interrupt: bool,
        _confidence: f32,
    ) -> BoxStream<'static, (ResponseItem, bool)> {
        let mut items: Vec<_> = self
            .fragments
            .iter()
            .map(|(text, interruptable)| (ResponseItem::Text(text.to_string()), *interruptable))
            .collect();
        if let Some(call) = self.function_call.clone() {
            items.push((ResponseItem::FunctionCall(call), true));
        }
        Box::pin(futures::stream::iter(items))
    }
}

/// Paces its chunk stream with a fixed per-chunk delay so the demo has a
/// real window to interrupt mid-playback, standing in for a real TTS engine.
struct SlowEchoSynthesizer {
    seconds_per_chunk: Duration,
}

const DEMO_SAMPLING_RATE_HZ: u32 = 16_000;

#[async_trait]
impl Synthesizer for SlowEchoSynthesizer {
    async fn create_speech(
        &self,
        message: &str,
        chunk_size: usize,
        _sentiment: Option<&str>,
    ) -> turnline_synthesizer::Result<SynthesisResult> {
        let message = message.to_string();
        let pcm = vec![0u8; message.len().max(1) * 64];
        let total_len = pcm.len();
        let delay = self.seconds_per_chunk;

        let inner = pcm_chunk_stream(pcm, chunk_size, false, DEMO_SAMPLING_RATE_HZ);
        let stream: BoxStream<'static, ChunkResult> = Box::pin(async_stream::stream! {
            let mut inner = inner;
            while let Some(chunk) = inner.next().await {
                tokio::time::sleep(delay).await;
                yield chunk;
            }
        });

        let cutoff_message = message.clone();
        Ok(SynthesisResult::new(stream, move |seconds| {
            message_cutoff_from_total_response_length(
                &cutoff_message,
                seconds,
                total_len,
                DEMO_SAMPLING_RATE_HZ,
            )
        }))
    }
}

/// Stands in for a real ASR engine: echoes back one fixed transcription for
/// every audio chunk it's fed, so the demo can drive the full
/// audio-in-to-audio-out pipeline without a real speech model.
struct CannedAsrEngine {
    text: &'static str,
}

#[async_trait]
impl AsrEngine for CannedAsrEngine {
    async fn feed(&self, _chunk: Vec<u8>) -> turnline_transcriber::Result<Vec<Transcription>> {
        Ok(vec![Transcription::new(self.text, 0.92, true)])
    }
}

fn logging_sink() -> impl Fn(ChunkResult) + Send + Sync + 'static {
    |chunk: ChunkResult| {
        tracing::debug!(bytes = chunk.chunk.len(), last = chunk.is_last_chunk, "played chunk");
    }
}

fn demo_synthesizer_config() -> SynthesizerConfig {
    SynthesizerConfig {
        audio_encoding: AudioEncoding::Linear16,
        sampling_rate_hz: DEMO_SAMPLING_RATE_HZ,
        should_encode_as_wav: false,
        words_per_minute: 150,
    }
}

/// Exercises the full pipeline wiring from raw audio bytes through the
/// transcriber, agent and synthesizer (spec §4.7 "wires the four workers'
/// queues together"), rather than starting from an already-transcribed
/// `AgentInput` the way S1-S3 do.
async fn run_s0_full_pipeline_via_transcriber() {
    tracing::info!("--- S0 full pipeline via transcriber ---");
    let agent = ScriptedAgent {
        fragments: vec![("Got it, one second.", true)],
        function_call: None,
    };
    let synthesizer = Arc::new(SlowEchoSynthesizer {
        seconds_per_chunk: Duration::from_millis(10),
    });

    let (conversation, _actions_rx) = Conversation::new(
        "demo-s0",
        AgentConfig::default(),
        agent,
        vec![],
        Arc::new(DefaultActionFactory),
        None,
        synthesizer,
        demo_synthesizer_config(),
        3200,
        logging_sink(),
    );

    let (transcriber, transcription_rx) = Transcriber::new(
        TranscriberConfig {
            audio_encoding: AudioEncoding::Linear16,
            sampling_rate_hz: DEMO_SAMPLING_RATE_HZ,
            chunk_size_bytes: 3200,
            interrupt_on_blockers: false,
        },
        CannedAsrEngine {
            text: "what's the weather",
        },
        TranscriberHooks::default(),
    );
    let _bridge = conversation.spawn_transcriber_bridge(transcription_rx, None, None);

    transcriber.send_audio(vec![0u8; 3200]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let transcript = conversation.transcript();
    let transcript = transcript.lock().await;
    tracing::info!(
        human_entries = transcript.human_entries().count(),
        bot_entries = transcript.bot_entries().count(),
        "s0 finished"
    );
}

async fn run_s1_happy_path() {
    tracing::info!("--- S1 happy path ---");
    let agent = ScriptedAgent {
        fragments: vec![("Hi there.", true), ("How can I help?", true)],
        function_call: None,
    };
    let synthesizer = Arc::new(SlowEchoSynthesizer {
        seconds_per_chunk: Duration::from_millis(15),
    });

    let (conversation, _actions_rx) = Conversation::new(
        "demo-s1",
        AgentConfig::default(),
        agent,
        vec![],
        Arc::new(DefaultActionFactory),
        None,
        synthesizer,
        demo_synthesizer_config(),
        3200,
        logging_sink(),
    );

    conversation.submit(
        AgentInput::TranscriptionInput {
            conversation_id: "demo-s1".into(),
            transcription: Transcription::new("hello", 0.95, true),
            vonage_uuid: None,
            twilio_sid: None,
            agent_response_tracker: None,
        },
        true,
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    let transcript = conversation.transcript();
    let transcript = transcript.lock().await;
    tracing::info!(
        human_entries = transcript.human_entries().count(),
        bot_entries = transcript.bot_entries().count(),
        "s1 finished"
    );
}

async fn run_s2_barge_in() {
    tracing::info!("--- S2 barge-in ---");
    let agent = ScriptedAgent {
        fragments: vec![(
            "This is a fairly long response that will be interrupted partway through playback.",
            true,
        )],
        function_call: None,
    };
    let synthesizer = Arc::new(SlowEchoSynthesizer {
        seconds_per_chunk: Duration::from_millis(25),
    });

    let (conversation, _actions_rx) = Conversation::new(
        "demo-s2",
        AgentConfig::default(),
        agent,
        vec![],
        Arc::new(DefaultActionFactory),
        None,
        synthesizer,
        demo_synthesizer_config(),
        64,
        logging_sink(),
    );

    conversation.submit(
        AgentInput::TranscriptionInput {
            conversation_id: "demo-s2".into(),
            transcription: Transcription::new("tell me something", 0.9, true),
            vonage_uuid: None,
            twilio_sid: None,
            agent_response_tracker: None,
        },
        true,
    );

    // Let a couple of chunks play, then barge in.
    tokio::time::sleep(Duration::from_millis(90)).await;
    conversation.interrupt().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let transcript = conversation.transcript();
    let transcript = transcript.lock().await;
    tracing::info!(entries = transcript.entries().len(), "s2 finished (bot entry should be a truncated prefix)");
}

async fn run_s3_action_with_ack() {
    tracing::info!("--- S3 action with ack ---");
    let action_configs = vec![ActionConfig {
        name: "lookup".into(),
        kind: ActionKind::Generic,
        is_interruptable: false,
    }];
    let mut agent_config = AgentConfig::default();
    agent_config.actions = action_configs.clone();

    let agent = ScriptedAgent {
        fragments: vec![],
        function_call: Some(FunctionCall {
            name: "lookup".into(),
            arguments: r#"{"user_message":"one moment"}"#.into(),
        }),
    };
    let synthesizer = Arc::new(SlowEchoSynthesizer {
        seconds_per_chunk: Duration::from_millis(10),
    });

    let (conversation, mut actions_rx) = Conversation::new(
        "demo-s3",
        agent_config,
        agent,
        action_configs,
        Arc::new(DefaultActionFactory),
        None,
        synthesizer,
        demo_synthesizer_config(),
        3200,
        logging_sink(),
    );

    conversation.submit(
        AgentInput::TranscriptionInput {
            conversation_id: "demo-s3".into(),
            transcription: Transcription::new("look something up for me", 0.9, true),
            vonage_uuid: None,
            twilio_sid: None,
            agent_response_tracker: None,
        },
        true,
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    if let Ok(action_event) = actions_rx.try_recv() {
        tracing::info!(action = %action_event.payload.action_name, "action dispatched");
    }

    let transcript = conversation.transcript();
    let transcript = transcript.lock().await;
    tracing::info!(entries = transcript.entries().len(), "s3 finished");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run_s0_full_pipeline_via_transcriber().await;
    run_s1_happy_path().await;
    run_s2_barge_in().await;
    run_s3_action_with_ack().await;

    Ok(())
}
