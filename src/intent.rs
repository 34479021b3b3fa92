//! Intent routing for chat messages
//!
//! Only consulted while no workflow is active. Matching is on whole-word
//! trigger phrases after case and diacritic folding; workflows are tried in
//! registry order and the first hit wins.

use crate::text::{contains_phrase, words};
use crate::workflow::{WorkflowId, WorkflowRegistry};

/// What an idle-mode message asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    StartWorkflow(WorkflowId),
    PlainChat(String),
}

/// Classify `message`. Total: every input yields exactly one intent.
pub fn classify(message: &str, registry: &WorkflowRegistry) -> Intent {
    let message_words = words(message);
    if !message_words.is_empty() {
        for (workflow, triggers) in registry.iter_with_triggers() {
            if triggers.iter().any(|phrase| contains_phrase(&message_words, phrase)) {
                return Intent::StartWorkflow(workflow.id().clone());
            }
        }
    }
    Intent::PlainChat(message.to_string())
}
