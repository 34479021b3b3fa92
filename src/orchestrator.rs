//! Turn orchestration
//!
//! One call to [`Orchestrator::handle_turn`] is one turn: the user message is
//! logged, routed or submitted to the active step, the state machine moves,
//! and the assistant reply is logged before it is returned. Completing a
//! workflow additionally yields a [`SideEffectRequest`] for the host to
//! execute; nothing here performs I/O.
//!
//! Errors never escape a turn. Validation failures become reprompts and a
//! corrupted state is reset to chat with a diagnostic reply.

mod responder;

pub use responder::{CannedResponder, Responder};

use crate::intent::{classify, Intent};
use crate::message_log::{Message, MessageLog, MessageMetadata};
use crate::state_machine::{ConvState, ConversationStateMachine, FieldMap, SubmitOutcome, TransitionError};
use crate::workflow::{WorkflowId, WorkflowRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

/// Instruction to an external system, emitted when a workflow completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectRequest {
    pub id: Uuid,
    pub conversation_id: String,
    pub workflow: WorkflowId,
    pub data: FieldMap,
}

impl SideEffectRequest {
    fn new(conversation_id: &str, workflow: WorkflowId, data: FieldMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            workflow,
            data,
        }
    }

    /// Wire form handed to the host: validated values as plain JSON
    pub fn payload(&self) -> Value {
        json!({
            "requestId": self.id.to_string(),
            "conversationId": self.conversation_id,
            "workflow": self.workflow.as_str(),
            "data": self.data.to_json(),
        })
    }
}

/// What the host reports back after executing a side effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectReceipt {
    /// Host-side identifier of whatever was created (client id, invoice number...)
    pub reference: String,
}

impl SideEffectReceipt {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The reply, as stored in the log
    pub assistant_message: Message,
    pub side_effect: Option<SideEffectRequest>,
}

/// One user's conversation: state machine, log and side effects awaiting
/// resolution
#[derive(Debug)]
pub struct Conversation {
    id: String,
    machine: ConversationStateMachine,
    log: MessageLog,
    pending: HashMap<Uuid, WorkflowId>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            id: id.into(),
            machine: ConversationStateMachine::new(registry),
            log: MessageLog::new(),
            pending: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ConvState {
        self.machine.state()
    }

    pub fn machine(&self) -> &ConversationStateMachine {
        &self.machine
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Side effects emitted but not yet resolved
    pub fn pending_side_effects(&self) -> impl Iterator<Item = (&Uuid, &WorkflowId)> {
        self.pending.iter()
    }
}

/// Serializable form of a [`Conversation`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: String,
    pub state: ConvState,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub pending: HashMap<Uuid, WorkflowId>,
}

/// Drives turns for any number of conversations sharing one registry
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<WorkflowRegistry>,
    responder: Arc<dyn Responder>,
}

impl Orchestrator {
    pub fn new(registry: Arc<WorkflowRegistry>, responder: Arc<dyn Responder>) -> Self {
        Self { registry, responder }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn new_conversation(&self, id: impl Into<String>) -> Conversation {
        Conversation::new(id, Arc::clone(&self.registry))
    }

    pub fn handle_turn(&self, conversation: &mut Conversation, text: &str) -> TurnOutcome {
        conversation.log.append(Message::user(text));

        let (reply, side_effect) = if conversation.machine.state().in_workflow() {
            self.workflow_turn(conversation, text)
        } else {
            conversation.machine.acknowledge();
            (self.chat_turn(conversation, text), None)
        };

        let assistant_message = conversation.log.append(reply).clone();
        TurnOutcome {
            assistant_message,
            side_effect,
        }
    }

    fn chat_turn(&self, conversation: &mut Conversation, text: &str) -> Message {
        match classify(text, &self.registry) {
            Intent::StartWorkflow(workflow) => match conversation.machine.start(workflow.as_str()) {
                Ok(prompt) => {
                    tracing::info!(session_id = %conversation.id, workflow = %workflow, "Workflow started");
                    Message::assistant(prompt)
                }
                Err(e) => self.recover(conversation, &e),
            },
            Intent::PlainChat(_) => Message::assistant(self.plain_reply(conversation)),
        }
    }

    /// Ask the responder for a chat reply. A panicking responder falls back
    /// to the idle prompt.
    fn plain_reply(&self, conversation: &Conversation) -> String {
        let history = conversation.log.messages();
        match catch_unwind(AssertUnwindSafe(|| self.responder.respond(history))) {
            Ok(reply) => reply,
            Err(_) => {
                tracing::error!(session_id = %conversation.id, "Responder panicked");
                self.registry.vocabulary().idle_prompt.clone()
            }
        }
    }

    fn workflow_turn(&self, conversation: &mut Conversation, text: &str) -> (Message, Option<SideEffectRequest>) {
        let vocabulary = self.registry.vocabulary();

        if vocabulary.is_cancel(text) {
            let cancelled = conversation.machine.cancel();
            tracing::info!(
                session_id = %conversation.id,
                workflow = ?cancelled.as_ref().map(WorkflowId::as_str),
                "Workflow cancelled"
            );
            let title = cancelled
                .as_ref()
                .and_then(|id| self.registry.lookup(id.as_str()))
                .map_or("That", |w| w.title());
            let text = format!("{title} cancelled. {}", vocabulary.idle_prompt);
            return (Message::assistant(text), None);
        }

        if vocabulary.is_back(text) {
            let reply = match conversation.machine.back() {
                Ok(prompt) => Message::assistant(prompt),
                Err(e) => self.recover(conversation, &e),
            };
            return (reply, None);
        }

        match conversation.machine.submit(text) {
            Ok(SubmitOutcome::Advanced { prompt, .. }) => (Message::assistant(prompt), None),
            Ok(SubmitOutcome::Completed { workflow, data }) => {
                let (reply, request) = self.complete(conversation, workflow, data);
                (reply, Some(request))
            }
            Err(e) => (self.recover(conversation, &e), None),
        }
    }

    fn complete(
        &self,
        conversation: &mut Conversation,
        workflow: WorkflowId,
        data: FieldMap,
    ) -> (Message, SideEffectRequest) {
        let mut text = String::new();
        let mut metadata = MessageMetadata::default();

        if let Some(definition) = self.registry.lookup(workflow.as_str()) {
            text.push_str(definition.completion_message());
            for step in definition.steps() {
                if let Some(value) = data.get(step.field()) {
                    let _ = write!(text, "\n- {}: {value}", step.field());
                }
            }
            if let Some(value) = definition.report_type_field().and_then(|field| data.get(field)) {
                metadata.report_type = Some(value.to_string());
                metadata.credit_cost = value.credit_cost();
            }
        }

        let request = SideEffectRequest::new(&conversation.id, workflow, data);
        conversation.pending.insert(request.id, request.workflow.clone());
        conversation.machine.acknowledge();

        tracing::info!(
            session_id = %conversation.id,
            workflow = %request.workflow,
            request_id = %request.id,
            "Workflow completed"
        );
        (Message::assistant(text).with_metadata(metadata), request)
    }

    /// Turn a transition error into a reply. Input errors reprompt the
    /// current step; anything that leaves the state unusable resets to chat.
    fn recover(&self, conversation: &mut Conversation, error: &TransitionError) -> Message {
        if error.requires_reset() {
            tracing::warn!(session_id = %conversation.id, error = %error, "Resetting conversation");
            conversation.machine.reset();
            return Message::assistant(format!(
                "Sorry, I lost track of what we were doing ({error}). Let's start over. {}",
                self.registry.vocabulary().idle_prompt
            ));
        }

        let field = conversation.machine.current_step().map(|s| s.field().to_string());
        tracing::debug!(session_id = %conversation.id, field = ?field, error = %error, "Reprompting");
        let mut reason = error.to_string();
        if !reason.ends_with(['.', '?', '!']) {
            reason.push('.');
        }
        Message::assistant(format!("{reason}\n{}", conversation.machine.current_prompt()))
    }

    /// Report the outcome of a side effect the host executed. Returns the
    /// follow-up message appended to the log, or `None` for an unknown id.
    pub fn resolve_side_effect(
        &self,
        conversation: &mut Conversation,
        request_id: Uuid,
        outcome: Result<SideEffectReceipt, String>,
    ) -> Option<Message> {
        let Some(workflow) = conversation.pending.remove(&request_id) else {
            tracing::warn!(session_id = %conversation.id, request_id = %request_id, "Unknown side effect resolved");
            return None;
        };
        let title = self
            .registry
            .lookup(workflow.as_str())
            .map_or(workflow.as_str(), |w| w.title());

        let text = match outcome {
            Ok(receipt) => {
                tracing::info!(session_id = %conversation.id, workflow = %workflow, reference = %receipt.reference, "Side effect confirmed");
                format!("{title} done (reference {}).", receipt.reference)
            }
            Err(reason) => {
                tracing::warn!(session_id = %conversation.id, workflow = %workflow, reason = %reason, "Side effect failed");
                format!("{title} could not be completed: {reason}. Please try again.")
            }
        };
        Some(conversation.log.append(Message::assistant(text)).clone())
    }

    pub fn snapshot(&self, conversation: &Conversation) -> ConversationSnapshot {
        ConversationSnapshot {
            id: conversation.id.clone(),
            state: conversation.machine.state().clone(),
            messages: conversation.log.messages().to_vec(),
            pending: conversation.pending.clone(),
        }
    }

    /// Rebuild a conversation. A state the registry no longer accepts is
    /// replaced by chat mode and the user is told why.
    pub fn restore(&self, snapshot: ConversationSnapshot) -> Conversation {
        let ConversationSnapshot {
            id,
            state,
            messages,
            pending,
        } = snapshot;
        let mut log = MessageLog::from_messages(messages);

        let machine = match ConversationStateMachine::resume(Arc::clone(&self.registry), state) {
            Ok(machine) => machine,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Discarding saved state");
                log.append(Message::assistant(format!(
                    "I couldn't pick up where we left off ({e}). {}",
                    self.registry.vocabulary().idle_prompt
                )));
                ConversationStateMachine::new(Arc::clone(&self.registry))
            }
        };

        Conversation {
            id,
            machine,
            log,
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Step, Validator, ValidatorSpec, Vocabulary, Workflow};
    use serde_json::json;

    fn orchestrator() -> Orchestrator {
        let registry = Arc::new(WorkflowRegistry::builtin());
        let responder = Arc::new(CannedResponder::new(&registry));
        Orchestrator::new(registry, responder)
    }

    fn turns(orchestrator: &Orchestrator, conversation: &mut Conversation, inputs: &[&str]) -> Vec<TurnOutcome> {
        inputs
            .iter()
            .map(|input| orchestrator.handle_turn(conversation, input))
            .collect()
    }

    #[test]
    fn test_trigger_starts_workflow_with_first_prompt() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");

        let outcome = orchestrator.handle_turn(&mut conversation, "I need to register a new client");

        assert_eq!(outcome.assistant_message.text, "What is the client's name?");
        assert!(!outcome.assistant_message.is_user);
        assert!(outcome.side_effect.is_none());
        assert_eq!(
            conversation.state(),
            &ConvState::InWorkflow {
                workflow: WorkflowId::new("client_registration"),
                step: 0,
                data: FieldMap::new(),
            }
        );
    }

    #[test]
    fn test_plain_chat_goes_to_responder() {
        let registry = Arc::new(WorkflowRegistry::builtin());
        let responder = |history: &[Message]| format!("echo: {}", history.last().map_or("", |m| m.text.as_str()));
        let orchestrator = Orchestrator::new(registry, Arc::new(responder));
        let mut conversation = orchestrator.new_conversation("s1");

        let outcome = orchestrator.handle_turn(&mut conversation, "hello there");

        assert_eq!(outcome.assistant_message.text, "echo: hello there");
        assert!(conversation.state().is_idle());
    }

    #[test]
    fn test_panicking_responder_falls_back_to_idle_prompt() {
        let registry = Arc::new(WorkflowRegistry::builtin());
        let responder = |_: &[Message]| -> String { panic!("responder bug") };
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(responder));
        let mut conversation = orchestrator.new_conversation("s1");

        let outcome = orchestrator.handle_turn(&mut conversation, "hello there");

        assert_eq!(outcome.assistant_message.text, registry.vocabulary().idle_prompt);
        assert_eq!(conversation.log().len(), 2);
        assert!(conversation.state().is_idle());

        // the conversation keeps working afterwards
        let next = orchestrator.handle_turn(&mut conversation, "new invoice");
        assert_eq!(next.assistant_message.text, "Which client is this invoice for? Enter the client id.");
    }

    #[test]
    fn test_invoice_scenario() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");

        let outcomes = turns(
            &orchestrator,
            &mut conversation,
            &["create invoice", "123", "abc", "150.00", "2025-01-01"],
        );

        // the invalid amount reprompts verbatim and keeps the step
        let reprompt = &outcomes[2].assistant_message.text;
        assert!(reprompt.starts_with("Invalid value for amount"));
        assert!(reprompt.ends_with("What is the invoice amount?"));
        assert_eq!(outcomes[3].assistant_message.text, "When is it due? (YYYY-MM-DD or DD/MM/YYYY)");

        let requests: Vec<_> = outcomes.iter().filter_map(|o| o.side_effect.as_ref()).collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].payload()["data"],
            json!({"clientId": "123", "amount": "150.00", "dueDate": "2025-01-01"})
        );
        assert_eq!(requests[0].workflow, WorkflowId::new("invoice_creation"));
        assert!(outcomes[4].assistant_message.text.starts_with("Invoice ready to be created."));

        assert!(conversation.state().is_idle());
        assert_eq!(conversation.log().len(), 10);
        assert_eq!(conversation.pending_side_effects().count(), 1);
    }

    #[test]
    fn test_log_grows_two_messages_per_turn() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");
        let inputs = ["hi", "new client", "", "Acme", "not-an-email", "cancel", "gerar relatório", "voltar"];

        for (n, input) in inputs.iter().enumerate() {
            orchestrator.handle_turn(&mut conversation, input);
            assert_eq!(conversation.log().len(), 2 * (n + 1));
        }
        assert_eq!(conversation.log().user_message_count(), inputs.len());
        assert_eq!(conversation.log().assistant_message_count(), inputs.len());
    }

    #[test]
    fn test_required_step_rejects_skip() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");

        let outcomes = turns(&orchestrator, &mut conversation, &["new invoice", "skip"]);

        assert!(outcomes[1].assistant_message.text.contains("clientId is required"));
        assert!(outcomes[1].assistant_message.text.ends_with(&outcomes[0].assistant_message.text));
        assert_eq!(conversation.state().step_index(), Some(0));
    }

    #[test]
    fn test_report_confirmation_carries_credit_metadata() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");

        let outcomes = turns(
            &orchestrator,
            &mut conversation,
            &["generate report", "Receita", "skip", ""],
        );

        let confirmation = &outcomes[3].assistant_message;
        assert_eq!(
            confirmation.metadata,
            Some(MessageMetadata {
                report_type: Some("revenue".to_string()),
                credit_cost: Some(2),
            })
        );
        let request = outcomes[3].side_effect.as_ref().unwrap();
        assert_eq!(request.payload()["data"], json!({"reportType": "revenue"}));
    }

    #[test]
    fn test_report_end_date_before_start_date_reprompts() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");

        let outcomes = turns(
            &orchestrator,
            &mut conversation,
            &["generate report", "revenue", "2025-02-01", "2025-01-01"],
        );

        let reprompt = &outcomes[3];
        assert!(reprompt.side_effect.is_none());
        assert_eq!(
            reprompt.assistant_message.text,
            "Invalid value for endDate: It can't be before startDate (2025-02-01).\nUntil which date? (type 'skip' for today)"
        );
        assert_eq!(conversation.state().step_index(), Some(2));
        assert!(conversation.pending_side_effects().next().is_none());

        let done = orchestrator.handle_turn(&mut conversation, "2025-03-01");
        assert!(done.side_effect.is_some());
    }

    #[test]
    fn test_cancel_and_back_words() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");

        let outcomes = turns(&orchestrator, &mut conversation, &["new client", "Acme", "back"]);
        assert_eq!(outcomes[2].assistant_message.text, "What is the client's name?");
        assert_eq!(conversation.state().step_index(), Some(0));
        assert!(conversation.state().data().unwrap().is_empty());

        let cancelled = orchestrator.handle_turn(&mut conversation, "Cancelar");
        assert!(cancelled.assistant_message.text.starts_with("Client registration cancelled."));
        assert!(conversation.state().is_idle());
        assert!(cancelled.side_effect.is_none());
    }

    #[test]
    fn test_panicking_validator_becomes_reprompt() {
        let workflow = Workflow::new("fragile", "Fragile")
            .with_trigger("fragile")
            .with_step(Step::required(
                "value",
                "Give me a value",
                Validator::new("boom", |_| panic!("validator bug")),
            ));
        let registry = Arc::new(WorkflowRegistry::new(vec![workflow], Vocabulary::default()).unwrap());
        let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(CannedResponder::new(&registry)));
        let mut conversation = orchestrator.new_conversation("s1");

        let outcomes = turns(&orchestrator, &mut conversation, &["fragile", "anything"]);

        assert!(outcomes[1].assistant_message.text.starts_with("Invalid value for value"));
        assert!(outcomes[1].assistant_message.text.ends_with("Give me a value"));
        assert_eq!(conversation.state().step_index(), Some(0));
    }

    #[test]
    fn test_resolve_side_effect() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");
        let outcomes = turns(
            &orchestrator,
            &mut conversation,
            &["create invoice", "123", "150", "2025-01-01"],
        );
        let request = outcomes[3].side_effect.clone().unwrap();

        let follow_up = orchestrator
            .resolve_side_effect(&mut conversation, request.id, Ok(SideEffectReceipt::new("INV-42")))
            .unwrap();
        assert_eq!(follow_up.text, "Invoice creation done (reference INV-42).");
        assert_eq!(conversation.log().last(), Some(&follow_up));
        assert_eq!(conversation.pending_side_effects().count(), 0);

        // resolving twice is ignored
        let len = conversation.log().len();
        assert!(orchestrator
            .resolve_side_effect(&mut conversation, request.id, Err("late".to_string()))
            .is_none());
        assert_eq!(conversation.log().len(), len);
    }

    #[test]
    fn test_failed_side_effect_reports_reason() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");
        let outcomes = turns(&orchestrator, &mut conversation, &["generate report", "clients", "", ""]);
        let request = outcomes[3].side_effect.clone().unwrap();

        let follow_up = orchestrator
            .resolve_side_effect(&mut conversation, request.id, Err("not enough credits".to_string()))
            .unwrap();
        assert_eq!(
            follow_up.text,
            "Report generation could not be completed: not enough credits. Please try again."
        );
    }

    #[test]
    fn test_snapshot_restore_mid_workflow() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");
        turns(&orchestrator, &mut conversation, &["create invoice", "123"]);

        let json = serde_json::to_string(&orchestrator.snapshot(&conversation)).unwrap();
        let snapshot: ConversationSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = orchestrator.restore(snapshot);

        assert_eq!(restored.id(), "s1");
        assert_eq!(restored.state(), conversation.state());
        assert_eq!(restored.log(), conversation.log());

        let outcomes = turns(&orchestrator, &mut restored, &["150", "2025-01-01"]);
        assert!(outcomes[1].side_effect.is_some());
    }

    #[test]
    fn test_restore_corrupted_snapshot() {
        let orchestrator = orchestrator();
        let snapshot = ConversationSnapshot {
            id: "s1".to_string(),
            state: ConvState::InWorkflow {
                workflow: WorkflowId::new("payroll"),
                step: 3,
                data: FieldMap::new(),
            },
            messages: vec![Message::user("run payroll")],
            pending: HashMap::new(),
        };

        let conversation = orchestrator.restore(snapshot);

        assert!(conversation.state().is_idle());
        assert_eq!(conversation.log().len(), 2);
        let diagnostic = conversation.log().last().unwrap();
        assert!(!diagnostic.is_user);
        assert!(diagnostic.text.contains("couldn't pick up where we left off"));
    }

    #[test]
    fn test_payload_shape() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("abc");
        let outcomes = turns(
            &orchestrator,
            &mut conversation,
            &["new client", "Acme Ltda", "billing@acme.com", "", "529.982.247-25"],
        );
        let request = outcomes[4].side_effect.as_ref().unwrap();
        let payload = request.payload();

        assert_eq!(payload["conversationId"], "abc");
        assert_eq!(payload["workflow"], "client_registration");
        assert_eq!(payload["requestId"], request.id.to_string());
        assert_eq!(
            payload["data"],
            json!({"name": "Acme Ltda", "email": "billing@acme.com", "document": "52998224725"})
        );
    }

    #[test]
    fn test_validator_spec_errors_reprompt_with_reason() {
        let orchestrator = orchestrator();
        let mut conversation = orchestrator.new_conversation("s1");
        let outcomes = turns(&orchestrator, &mut conversation, &["novo cliente", "Acme", "nope"]);

        let reason = ValidatorSpec::Email.build().validate("nope").unwrap_err();
        assert_eq!(
            outcomes[2].assistant_message.text,
            format!("Invalid value for email: {reason}\n{}", outcomes[1].assistant_message.text)
        );
    }
}
