//! Given a `Transcription` (or `ActionResult`), produce `AgentResponse`
//! events and, if the model asks for it, dispatch a tool/action invocation
//! (spec §4.3).
//!
//! The concrete language model is an external collaborator (spec §1); only
//! its two calling conventions — a single request/response (`respond`) and a
//! lazily streamed sequence of fragments (`generate_response`) — are
//! specified via the `Agent` trait.

mod goodbye;

pub use goodbye::{GoodbyeDetector, PhraseGoodbyeDetector};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use turnline_actions::{ActionConfig, ActionDispatcher};
use turnline_events::{
    AgentInput, AgentResponse, AgentResponseEvent, CompletionTracker, FunctionCall, Transcription,
};
use turnline_transcript::Transcript;
use turnline_worker::{emit_agent_response, InterruptibleProcess, InterruptibleWorker};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Bounded wait for the goodbye-detection task (spec §4.3 step 7 / §5
/// "Timeouts"). Kept hard-coded per DESIGN.md's open-question decision.
const GOODBYE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub generate_responses: bool,
    pub allow_agent_to_be_cut_off: bool,
    pub send_filler_audio: bool,
    pub end_conversation_on_goodbye: bool,
    pub actions: Vec<ActionConfig>,
    pub agent_type: String,
    pub model_engine: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            generate_responses: true,
            allow_agent_to_be_cut_off: true,
            send_filler_audio: false,
            end_conversation_on_goodbye: false,
            actions: Vec::new(),
            agent_type: "base".to_string(),
            model_engine: None,
        }
    }
}

/// An element of the agent's lazily streamed output: either a text fragment
/// (usually a sentence or clause) or a tool invocation (spec §4.3
/// "Streaming (`generate_response`)").
#[derive(Debug, Clone)]
pub enum ResponseItem {
    Text(String),
    FunctionCall(FunctionCall),
}

/// The underlying language model's two calling conventions. Implementations
/// provide whichever one `AgentConfig.generate_responses` selects; the
/// other's default falls back to "no response, do not stop" rather than
/// panicking, mirroring the source's `NotImplementedError` placeholders
/// without making the trait object-unsafe.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    async fn respond(
        &self,
        _human_input: &str,
        _conversation_id: &str,
        _is_interrupt: bool,
    ) -> Result<(Option<String>, bool)> {
        Ok((None, false))
    }

    fn generate_response(
        &self,
        _human_input: String,
        _conversation_id: String,
        _is_interrupt: bool,
        _confidence: f32,
    ) -> BoxStream<'static, (ResponseItem, bool)> {
        Box::pin(futures::stream::empty())
    }
}

/// Per-item processing for the agent's `InterruptibleWorker`, carrying the
/// shared transcript, action dispatcher, and optional goodbye detector.
pub struct AgentProcess<A: Agent> {
    config: Arc<AgentConfig>,
    agent: Arc<A>,
    dispatcher: Arc<ActionDispatcher>,
    transcript: Arc<Mutex<Transcript>>,
    goodbye_detector: Option<Arc<dyn GoodbyeDetector>>,
    tracer_name: Arc<OnceLock<String>>,
    muted: Arc<AtomicBool>,
    output_tx: mpsc::UnboundedSender<Arc<AgentResponseEvent<AgentResponse>>>,
}

impl<A: Agent> AgentProcess<A> {
    /// Span/trace name derived deterministically from the agent config: a
    /// base prefix joined with the agent type and, when present, the model
    /// engine id, non-alphanumeric characters stripped. Cached after first
    /// computation (spec §4.3 "Tracer naming").
    fn tracer_name(&self) -> Arc<str> {
        if let Some(name) = self.tracer_name.get() {
            return Arc::from(name.as_str());
        }
        let raw = match &self.config.model_engine {
            Some(engine) => format!("agent.{}{}", self.config.agent_type, engine),
            None => format!("agent.{}", self.config.agent_type),
        };
        let cleaned: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
        // Lost races just recompute the same deterministic string; whichever
        // `set` wins is fine.
        let _ = self.tracer_name.set(cleaned.clone());
        Arc::from(cleaned.as_str())
    }

    async fn handle_generate_response(
        &self,
        transcription: &Transcription,
        agent_input: &AgentInput,
        agent_response_tracker: Option<CompletionTracker>,
    ) -> bool {
        let conversation_id = agent_input.conversation_id();
        let tracer_name = self.tracer_name();
        let _turn_span = tracing::info_span!("agent_turn", tracer_name = %tracer_name).entered();
        let first_response_started_at = Instant::now();
        let mut awaiting_first_response = true;

        let mut stream = self.agent.generate_response(
            transcription.text.clone(),
            conversation_id.to_string(),
            transcription.is_interrupt,
            transcription.confidence,
        );

        let mut function_call = None;
        while let Some((item, is_interruptable)) = stream.next().await {
            match item {
                ResponseItem::FunctionCall(call) => {
                    // Remember the last one; don't emit audio for it yet
                    // (spec §4.3 step 2).
                    function_call = Some(call);
                    continue;
                }
                ResponseItem::Text(text) => {
                    if awaiting_first_response {
                        tracing::debug!(
                            tracer_name = %tracer_name,
                            elapsed_ms = first_response_started_at.elapsed().as_millis() as u64,
                            "first response fragment"
                        );
                        awaiting_first_response = false;
                    }
                    let is_interruptable =
                        self.config.allow_agent_to_be_cut_off && is_interruptable;
                    emit_agent_response(
                        &self.output_tx,
                        AgentResponse::Message { text, is_interruptable },
                        is_interruptable,
                        agent_response_tracker.clone(),
                    );
                }
            }
        }

        if let Some(call) = function_call {
            if !self.config.actions.is_empty() {
                self.dispatch_action(&call, agent_input).await;
            }
        }
        false
    }

    async fn handle_respond(&self, transcription: &Transcription, conversation_id: &str) -> bool {
        let tracer_name = self.tracer_name();
        let _span = tracing::info_span!("agent_turn_respond", tracer_name = %tracer_name).entered();
        match self
            .agent
            .respond(&transcription.text, conversation_id, transcription.is_interrupt)
            .await
        {
            Ok((Some(text), should_stop)) => {
                emit_agent_response(
                    &self.output_tx,
                    AgentResponse::Message {
                        text,
                        is_interruptable: self.config.allow_agent_to_be_cut_off,
                    },
                    self.config.allow_agent_to_be_cut_off,
                    None,
                );
                should_stop
            }
            Ok((None, _)) => {
                tracing::debug!("no response generated");
                false
            }
            Err(err) => {
                // Model exceptions are caught, logged, and treated as "no
                // response, do not stop" (spec §4.3 error semantics).
                tracing::error!(error = %err, "error while generating response");
                false
            }
        }
    }

    async fn dispatch_action(&self, call: &FunctionCall, agent_input: &AgentInput) {
        let conversation_id = agent_input.conversation_id().to_string();
        let mut transcript = self.transcript.lock().await;
        if let Err(err) = self
            .dispatcher
            .dispatch(&conversation_id, call, agent_input, &mut transcript, &self.output_tx)
            .await
        {
            tracing::warn!(error = %err, action = %call.name, "action dispatch failed");
        }
    }
}

#[async_trait]
impl<A: Agent> InterruptibleProcess for AgentProcess<A> {
    type Payload = AgentInput;

    async fn process(&self, event: Arc<turnline_events::InterruptibleEvent<AgentInput>>) {
        if self.muted.load(Ordering::SeqCst) {
            tracing::debug!("agent is muted, skipping processing");
            return;
        }

        let conversation_id = event.payload.conversation_id().to_string();
        let (transcription, agent_response_tracker) = match &event.payload {
            AgentInput::TranscriptionInput {
                transcription,
                agent_response_tracker,
                ..
            } => {
                {
                    let mut transcript = self.transcript.lock().await;
                    transcript.append_human(&conversation_id, &transcription.text, transcription.confidence);
                }
                (transcription.clone(), agent_response_tracker.clone())
            }
            AgentInput::ActionResultInput {
                action_input,
                action_output,
                is_quiet,
                ..
            } => {
                {
                    let mut transcript = self.transcript.lock().await;
                    transcript.append_action_finish(
                        &conversation_id,
                        &action_input.action_name,
                        action_output.response.clone(),
                    );
                }
                if *is_quiet {
                    tracing::debug!("action is quiet, skipping response generation");
                    return;
                }
                let pseudo = Transcription::new(action_output.response.to_string(), 1.0, true);
                (pseudo, None)
            }
        };

        let goodbye_task = if self.config.end_conversation_on_goodbye {
            self.goodbye_detector.clone().map(|detector| {
                let text = transcription.text.clone();
                tokio::spawn(async move { detector.is_goodbye(&text).await })
            })
        } else {
            None
        };

        if self.config.send_filler_audio {
            emit_agent_response(&self.output_tx, AgentResponse::FillerAudio, true, None);
        }

        tracing::debug!("responding to transcription");
        let should_stop = if self.config.generate_responses {
            self.handle_generate_response(&transcription, &event.payload, agent_response_tracker)
                .await
        } else {
            self.handle_respond(&transcription, &conversation_id).await
        };

        if should_stop {
            tracing::debug!("agent requested to stop");
            emit_agent_response(&self.output_tx, AgentResponse::Stop, false, None);
            return;
        }

        if let Some(task) = goodbye_task {
            match tokio::time::timeout(GOODBYE_TIMEOUT, task).await {
                Ok(Ok(true)) => {
                    tracing::debug!("goodbye detected, ending conversation");
                    emit_agent_response(&self.output_tx, AgentResponse::Stop, false, None);
                }
                Ok(Ok(false)) => {}
                Ok(Err(join_err)) => {
                    tracing::warn!(error = %join_err, "goodbye detection task panicked")
                }
                Err(_) => tracing::debug!("goodbye detection timed out"),
            }
        }
    }
}

/// Public agent worker: owns the `InterruptibleWorker` driving `AgentProcess`
/// plus the handles callers need (input sender, output receiver, transcript
/// handle, mute toggle).
pub struct AgentWorker {
    input_tx: mpsc::UnboundedSender<Arc<turnline_events::InterruptibleEvent<AgentInput>>>,
    muted: Arc<AtomicBool>,
    worker: InterruptibleWorker<AgentProcessErased>,
}

// `InterruptibleWorker<P>` needs a concrete `P`; `AgentProcessErased` lets
// `AgentWorker::new` stay generic over `Agent` impls without leaking that
// generic into the public `AgentWorker` type.
type AgentProcessErased = Box<dyn ErasedAgentProcess>;

#[async_trait]
trait ErasedAgentProcess: Send + Sync + 'static {
    async fn process(&self, event: Arc<turnline_events::InterruptibleEvent<AgentInput>>);
}

#[async_trait]
impl<A: Agent> ErasedAgentProcess for AgentProcess<A> {
    async fn process(&self, event: Arc<turnline_events::InterruptibleEvent<AgentInput>>) {
        InterruptibleProcess::process(self, event).await
    }
}

#[async_trait]
impl InterruptibleProcess for AgentProcessErased {
    type Payload = AgentInput;
    async fn process(&self, event: Arc<turnline_events::InterruptibleEvent<AgentInput>>) {
        self.as_ref().process(event).await
    }
}

/// A cloneable handle to an `AgentWorker`'s input queue, for callers that
/// need to feed it from a spawned task (e.g. bridging a transcriber's
/// output queue, spec §4.7) without holding the worker itself.
#[derive(Clone)]
pub struct AgentSubmitHandle {
    input_tx: mpsc::UnboundedSender<Arc<turnline_events::InterruptibleEvent<AgentInput>>>,
}

impl AgentSubmitHandle {
    pub fn submit(&self, input: AgentInput, is_interruptable: bool) {
        let event = Arc::new(turnline_events::InterruptibleEvent::new(input, is_interruptable));
        if self.input_tx.send(event).is_err() {
            tracing::debug!("submit: agent input queue closed");
        }
    }
}

impl AgentWorker {
    pub fn new<A: Agent>(
        config: AgentConfig,
        agent: A,
        dispatcher: ActionDispatcher,
        transcript: Arc<Mutex<Transcript>>,
        goodbye_detector: Option<Arc<dyn GoodbyeDetector>>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Arc<AgentResponseEvent<AgentResponse>>>,
    ) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let muted = Arc::new(AtomicBool::new(false));

        let process: AgentProcessErased = Box::new(AgentProcess {
            config: Arc::new(config),
            agent: Arc::new(agent),
            dispatcher: Arc::new(dispatcher),
            transcript,
            goodbye_detector,
            tracer_name: Arc::new(OnceLock::new()),
            muted: Arc::clone(&muted),
            output_tx,
        });

        let mut worker = InterruptibleWorker::new(process, input_rx);
        worker.start();

        (
            Self {
                input_tx,
                muted,
                worker,
            },
            output_rx,
        )
    }

    pub fn submit(&self, input: AgentInput, is_interruptable: bool) {
        let event = Arc::new(turnline_events::InterruptibleEvent::new(input, is_interruptable));
        if self.input_tx.send(event).is_err() {
            tracing::debug!("submit: agent input queue closed");
        }
    }

    /// A cloneable submit handle, for wiring the input queue into a
    /// spawned bridging task (spec §4.7).
    pub fn submit_handle(&self) -> AgentSubmitHandle {
        AgentSubmitHandle {
            input_tx: self.input_tx.clone(),
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    /// Cancel the in-flight turn, if its event is still marked interruptable
    /// (spec §5 interruption protocol step 2). Delegates to the underlying
    /// `InterruptibleWorker`, giving the conversation supervisor a handle to
    /// the agent's in-flight event without exposing the worker itself.
    pub async fn cancel_current_task(&self) {
        self.worker.cancel_current_task().await;
    }

    pub fn terminate(&mut self) {
        self.worker.terminate();
    }
}
