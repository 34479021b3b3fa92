//! Billing Assistant - conversational core for a billing SaaS
//!
//! Guides users through multi-step data-collection workflows (client
//! registration, invoice creation, report generation) inside a chat. Chat
//! messages are routed to workflows by trigger phrase, each answer is checked
//! by the active step's validator, and a completed workflow yields a
//! side-effect request for the host to execute.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::return_self_not_must_use
)]

pub mod config;
pub mod intent;
pub mod message_log;
pub mod orchestrator;
pub mod runtime;
pub mod state_machine;
pub mod text;
pub mod workflow;

pub use config::{AssistantConfig, ConfigError, LogFormat};
pub use intent::{classify, Intent};
pub use message_log::{Message, MessageLog, MessageMetadata};
pub use orchestrator::{
    CannedResponder, Conversation, ConversationSnapshot, Orchestrator, Responder, SideEffectReceipt,
    SideEffectRequest, TurnOutcome,
};
pub use runtime::{LoggingSink, SessionManager, SideEffectSink, TurnReport};
pub use state_machine::{ConvState, ConversationStateMachine, TransitionError};
pub use workflow::{CatalogError, WorkflowId, WorkflowRegistry};
