//! Translates a `FunctionCall` into an `ActionInput` enqueued for an
//! external executor, per spec §4.4. The action-execution body itself is out
//! of scope (spec §1) — only the dispatch/queueing contract is specified.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use turnline_events::{
    ActionInput, AgentInput, AgentResponse, AgentResponseEvent, CompletionTracker, FunctionCall,
    InterruptibleEvent,
};
use turnline_transcript::Transcript;

#[derive(Debug, thiserror::Error)]
pub enum ActionDispatchError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("malformed function-call arguments: {0}")]
    MalformedArguments(String),
    #[error("missing required caller id for action {action} (kind {kind:?})")]
    MissingCallerId { action: String, kind: ActionKind },
}

pub type Result<T> = std::result::Result<T, ActionDispatchError>;

/// Which caller-identity precondition an action requires (spec §4.4 dispatch
/// variants: "Vonage phone-call action", "Twilio phone-call action",
/// "Generic action").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Vonage,
    Twilio,
    Generic,
}

#[derive(Debug, Clone)]
pub struct ActionConfig {
    pub name: String,
    pub kind: ActionKind,
    pub is_interruptable: bool,
}

/// Registry-by-name pattern mirroring `plugins/tools`'s `ToolRegistry`:
/// actions are instantiated from a declared config, not hardcoded dispatch.
pub trait ActionFactory: Send + Sync {
    /// Instantiate the action named by `config`. Returning `()` here is
    /// deliberate: the action-execution body is an external collaborator
    /// (spec §1) — this call only validates that the action is
    /// constructible from its config before dispatch proceeds.
    fn create_action(&self, config: &ActionConfig) -> Result<()>;
}

/// Default factory: any action present in the dispatcher's config map is
/// considered constructible.
pub struct DefaultActionFactory;

impl ActionFactory for DefaultActionFactory {
    fn create_action(&self, _config: &ActionConfig) -> Result<()> {
        Ok(())
    }
}

/// Outcome of a successful dispatch: the enqueued action's completion is
/// tracked separately; this carries the pre-action acknowledgement tracker,
/// if a `user_message` was present in the function-call arguments, so the
/// caller (agent turn loop) can let the action executor wait on it.
pub struct DispatchOutcome {
    pub acknowledgement_tracker: Option<CompletionTracker>,
}

pub struct ActionDispatcher {
    actions: HashMap<String, ActionConfig>,
    factory: Arc<dyn ActionFactory>,
    actions_tx: mpsc::UnboundedSender<Arc<InterruptibleEvent<ActionInput>>>,
}

impl ActionDispatcher {
    pub fn new(
        actions: Vec<ActionConfig>,
        factory: Arc<dyn ActionFactory>,
        actions_tx: mpsc::UnboundedSender<Arc<InterruptibleEvent<ActionInput>>>,
    ) -> Self {
        Self {
            actions: actions.into_iter().map(|c| (c.name.clone(), c)).collect(),
            factory,
            actions_tx,
        }
    }

    /// Algorithm steps 1–7 of spec §4.4.
    pub async fn dispatch(
        &self,
        conversation_id: &str,
        function_call: &FunctionCall,
        agent_input: &AgentInput,
        transcript: &mut Transcript,
        agent_response_tx: &mpsc::UnboundedSender<Arc<AgentResponseEvent<AgentResponse>>>,
    ) -> Result<Option<DispatchOutcome>> {
        // Step 1: look up action config by name; absent is a precondition
        // failure, logged and dropped (no retry).
        let Some(config) = self.actions.get(&function_call.name) else {
            tracing::warn!(action = %function_call.name, "no action config for function call, dropping");
            return Ok(None);
        };

        // Step 2: instantiate through the factory.
        self.factory.create_action(config)?;

        // Step 3: parse arguments as JSON into a parameter mapping.
        let params: serde_json::Value = serde_json::from_str(&function_call.arguments)
            .map_err(|e| ActionDispatchError::MalformedArguments(e.to_string()))?;

        let mut acknowledgement_tracker = None;
        if let Some(user_message) = params.get("user_message").and_then(|v| v.as_str()) {
            let tracker = CompletionTracker::new();
            let event = Arc::new(AgentResponseEvent::new(
                AgentResponse::Message {
                    text: user_message.to_string(),
                    is_interruptable: false,
                },
                false,
                tracker.clone(),
            ));
            if agent_response_tx.send(event).is_err() {
                tracing::debug!("dispatch: agent response queue closed while emitting acknowledgement");
            }
            acknowledgement_tracker = Some(tracker);
        }

        // Step 4: build the action-specific input; three dispatch variants.
        let caller_id = match config.kind {
            ActionKind::Vonage => match agent_input {
                AgentInput::TranscriptionInput { vonage_uuid: Some(id), .. } => Some(id.clone()),
                _ => {
                    return Err(ActionDispatchError::MissingCallerId {
                        action: config.name.clone(),
                        kind: config.kind,
                    })
                }
            },
            ActionKind::Twilio => match agent_input {
                AgentInput::TranscriptionInput { twilio_sid: Some(id), .. } => Some(id.clone()),
                _ => {
                    return Err(ActionDispatchError::MissingCallerId {
                        action: config.name.clone(),
                        kind: config.kind,
                    })
                }
            },
            ActionKind::Generic => None,
        };

        let action_input = ActionInput {
            conversation_id: conversation_id.to_string(),
            action_name: config.name.clone(),
            params: params.clone(),
            caller_id,
            user_message_tracker: acknowledgement_tracker.clone(),
        };

        // Step 5: wrap in an InterruptibleEvent per the action's declared
        // interruptability.
        let event = Arc::new(InterruptibleEvent::new(action_input, config.is_interruptable));

        // Step 6: append action-start entry. Ordered before dequeue so the
        // transcript reflects the action regardless of executor scheduling.
        transcript.append_action_start(conversation_id, &config.name, params);

        // Step 7: enqueue.
        if self.actions_tx.send(event).is_err() {
            tracing::warn!(action = %config.name, "actions queue closed, action dropped");
        }

        Ok(Some(DispatchOutcome {
            acknowledgement_tracker,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnline_events::Transcription;

    fn transcription_input(vonage: Option<&str>, twilio: Option<&str>) -> AgentInput {
        AgentInput::TranscriptionInput {
            conversation_id: "c1".into(),
            transcription: Transcription::new("hi", 0.9, true),
            vonage_uuid: vonage.map(String::from),
            twilio_sid: twilio.map(String::from),
            agent_response_tracker: None,
        }
    }

    #[tokio::test]
    async fn unknown_action_is_dropped_without_error() {
        let (actions_tx, _actions_rx) = mpsc::unbounded_channel();
        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(vec![], Arc::new(DefaultActionFactory), actions_tx);

        let call = FunctionCall {
            name: "lookup".into(),
            arguments: "{}".into(),
        };
        let mut transcript = Transcript::new();
        let result = dispatcher
            .dispatch(
                "c1",
                &call,
                &transcription_input(None, None),
                &mut transcript,
                &agent_tx,
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(transcript.entries().is_empty());
    }

    #[tokio::test]
    async fn user_message_emits_tracked_acknowledgement_before_action_start() {
        let (actions_tx, mut actions_rx) = mpsc::unbounded_channel();
        let (agent_tx, mut agent_rx) = mpsc::unbounded_channel();
        let config = vec![ActionConfig {
            name: "lookup".into(),
            kind: ActionKind::Generic,
            is_interruptable: false,
        }];
        let dispatcher = ActionDispatcher::new(config, Arc::new(DefaultActionFactory), actions_tx);

        let call = FunctionCall {
            name: "lookup".into(),
            arguments: r#"{"user_message":"one moment"}"#.into(),
        };
        let mut transcript = Transcript::new();
        let outcome = dispatcher
            .dispatch(
                "c1",
                &call,
                &transcription_input(None, None),
                &mut transcript,
                &agent_tx,
            )
            .await
            .unwrap()
            .expect("should dispatch");

        assert!(outcome.acknowledgement_tracker.is_some());

        let ack = agent_rx.try_recv().expect("acknowledgement emitted");
        match ack.payload() {
            AgentResponse::Message { text, .. } => assert_eq!(text, "one moment"),
            other => panic!("unexpected payload: {other:?}"),
        }

        assert_eq!(transcript.entries().len(), 1);
        let action_event = actions_rx.try_recv().expect("action enqueued");
        assert_eq!(action_event.payload.action_name, "lookup");
    }

    #[tokio::test]
    async fn vonage_action_requires_caller_id() {
        let (actions_tx, _actions_rx) = mpsc::unbounded_channel();
        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        let config = vec![ActionConfig {
            name: "call".into(),
            kind: ActionKind::Vonage,
            is_interruptable: false,
        }];
        let dispatcher = ActionDispatcher::new(config, Arc::new(DefaultActionFactory), actions_tx);

        let call = FunctionCall {
            name: "call".into(),
            arguments: "{}".into(),
        };
        let mut transcript = Transcript::new();
        let result = dispatcher
            .dispatch(
                "c1",
                &call,
                &transcription_input(None, None),
                &mut transcript,
                &agent_tx,
            )
            .await;
        assert!(matches!(
            result,
            Err(ActionDispatchError::MissingCallerId { .. })
        ));
    }

    #[tokio::test]
    async fn vonage_action_with_caller_id_dispatches() {
        let (actions_tx, mut actions_rx) = mpsc::unbounded_channel();
        let (agent_tx, _agent_rx) = mpsc::unbounded_channel();
        let config = vec![ActionConfig {
            name: "call".into(),
            kind: ActionKind::Vonage,
            is_interruptable: true,
        }];
        let dispatcher = ActionDispatcher::new(config, Arc::new(DefaultActionFactory), actions_tx);

        let call = FunctionCall {
            name: "call".into(),
            arguments: "{}".into(),
        };
        let mut transcript = Transcript::new();
        dispatcher
            .dispatch(
                "c1",
                &call,
                &transcription_input(Some("vonage-uuid-1"), None),
                &mut transcript,
                &agent_tx,
            )
            .await
            .unwrap();

        let action_event = actions_rx.try_recv().expect("action enqueued");
        assert_eq!(
            action_event.payload.caller_id.as_deref(),
            Some("vonage-uuid-1")
        );
        assert!(action_event.is_interruptable());
    }
}
