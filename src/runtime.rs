//! Session runtime
//!
//! Owns one [`Conversation`] per session id. Turns within a session are
//! serialized by a per-session mutex; different sessions proceed
//! concurrently. When a turn completes a workflow, the session is released
//! and the side effect runs on the sink in its own task; the outcome is fed
//! back into the conversation as a follow-up message even if the caller
//! stops waiting.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::message_log::Message;
use crate::orchestrator::{Conversation, ConversationSnapshot, Orchestrator, SideEffectRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Everything the host should show after one turn
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub reply: Message,
    /// Confirmation or error appended once the side effect was executed
    pub follow_up: Option<Message>,
    pub side_effect: Option<SideEffectRequest>,
}

impl TurnReport {
    /// Assistant messages in the order they were logged
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        std::iter::once(&self.reply).chain(self.follow_up.as_ref())
    }
}

type SessionHandle = Arc<Mutex<Conversation>>;

/// Manager for all live conversations
pub struct SessionManager<K: SideEffectSink> {
    orchestrator: Orchestrator,
    sink: Arc<K>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl<K: SideEffectSink + 'static> SessionManager<K> {
    pub fn new(orchestrator: Orchestrator, sink: K) -> Self {
        Self {
            orchestrator,
            sink: Arc::new(sink),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Get the session handle, creating an empty conversation if needed
    async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id = %session_id, "Creating session");
            Arc::new(Mutex::new(self.orchestrator.new_conversation(session_id)))
        });
        Arc::clone(handle)
    }

    /// Run one turn for `session_id`
    pub async fn send(&self, session_id: &str, text: &str) -> TurnReport {
        let handle = self.get_or_create(session_id).await;
        let outcome = {
            let mut conversation = handle.lock().await;
            self.orchestrator.handle_turn(&mut conversation, text)
        };

        let follow_up = match &outcome.side_effect {
            Some(request) => self.execute_side_effect(session_id, handle, request.clone()).await,
            None => None,
        };

        TurnReport {
            reply: outcome.assistant_message,
            follow_up,
            side_effect: outcome.side_effect,
        }
    }

    /// Run the sink without holding the session, then resolve the request.
    /// The work is spawned so dropping the caller cannot strand it.
    async fn execute_side_effect(
        &self,
        session_id: &str,
        handle: SessionHandle,
        request: SideEffectRequest,
    ) -> Option<Message> {
        let sink = Arc::clone(&self.sink);
        let orchestrator = self.orchestrator.clone();
        let task = tokio::spawn(async move {
            tracing::debug!(session_id = %request.conversation_id, request_id = %request.id, "Executing side effect");
            let result = sink.execute(&request).await;
            let mut conversation = handle.lock().await;
            orchestrator.resolve_side_effect(&mut conversation, request.id, result)
        });

        match task.await {
            Ok(follow_up) => follow_up,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Side effect task failed");
                None
            }
        }
    }

    /// Current snapshot of a live session
    pub async fn snapshot(&self, session_id: &str) -> Option<ConversationSnapshot> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;
        let conversation = handle.lock().await;
        Some(self.orchestrator.snapshot(&conversation))
    }

    /// Remove a session, returning its final snapshot.
    /// Waits for an in-flight turn on that session to finish first; side
    /// effects still running on the sink are not waited for.
    pub async fn end_session(&self, session_id: &str) -> Option<ConversationSnapshot> {
        let handle = self.sessions.write().await.remove(session_id)?;
        let conversation = handle.lock().await;
        tracing::info!(session_id = %session_id, messages = conversation.log().len(), "Session ended");
        Some(self.orchestrator.snapshot(&conversation))
    }

    /// Install a conversation rebuilt from `snapshot`, replacing any live
    /// session with the same id
    pub async fn restore_session(&self, snapshot: ConversationSnapshot) {
        let conversation = self.orchestrator.restore(snapshot);
        let session_id = conversation.id().to_string();
        tracing::info!(
            session_id = %session_id,
            mode = %conversation.state().mode(),
            messages = conversation.log().len(),
            "Session restored"
        );
        let replaced = self
            .sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(conversation)));
        if replaced.is_some() {
            tracing::warn!(session_id = %session_id, "Restored session replaced a live one");
        }
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
