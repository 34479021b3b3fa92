//! Plain-chat replies
//!
//! Messages that match no workflow trigger are answered by a [`Responder`].
//! Hosts plug in whatever they like (a template, an LLM); the crate ships a
//! canned one that points the user at the available workflows.

use crate::message_log::Message;
use crate::workflow::WorkflowRegistry;

/// Produces a reply to free-form chat
pub trait Responder: Send + Sync {
    /// `history` is the full log, ending with the message being answered
    fn respond(&self, history: &[Message]) -> String;
}

impl<F> Responder for F
where
    F: Fn(&[Message]) -> String + Send + Sync,
{
    fn respond(&self, history: &[Message]) -> String {
        self(history)
    }
}

/// Replies with the list of workflows the assistant can run
#[derive(Debug, Clone)]
pub struct CannedResponder {
    reply: String,
}

impl CannedResponder {
    pub fn new(registry: &WorkflowRegistry) -> Self {
        let titles: Vec<&str> = registry.iter().map(|w| w.title()).collect();
        let reply = if titles.is_empty() {
            "I'm not able to run any tasks right now.".to_string()
        } else {
            format!(
                "I didn't catch a request there. I can help with: {}. Just tell me what you need.",
                titles.join(", ")
            )
        };
        Self { reply }
    }
}

impl Responder for CannedResponder {
    fn respond(&self, _history: &[Message]) -> String {
        self.reply.clone()
    }
}
