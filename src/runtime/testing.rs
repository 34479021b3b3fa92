//! Mock implementations for testing
//!
//! These mocks let the session runtime be exercised without a real host.

use super::traits::SideEffectSink;
use super::SessionManager;
use crate::message_log::Message;
use crate::orchestrator::{CannedResponder, Orchestrator, Responder, SideEffectReceipt, SideEffectRequest};
use crate::workflow::WorkflowRegistry;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Mock Side-Effect Sink
// ============================================================================

/// Sink that returns queued outcomes and records every request.
/// With nothing queued it accepts with reference `mock-<n>`.
#[derive(Default)]
pub struct MockSideEffectSink {
    outcomes: Mutex<VecDeque<Result<SideEffectReceipt, String>>>,
    /// Record of all requests executed
    pub requests: Mutex<Vec<SideEffectRequest>>,
}

impl MockSideEffectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_receipt(&self, reference: impl Into<String>) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(SideEffectReceipt::new(reference)));
    }

    pub fn queue_error(&self, reason: impl Into<String>) {
        self.outcomes.lock().unwrap().push_back(Err(reason.into()));
    }

    pub fn recorded_requests(&self) -> Vec<SideEffectRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SideEffectSink for MockSideEffectSink {
    async fn execute(&self, request: &SideEffectRequest) -> Result<SideEffectReceipt, String> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SideEffectReceipt::new(format!("mock-{count}"))))
    }
}

// ============================================================================
// Gated Sink (for concurrency testing)
// ============================================================================

/// Sink that blocks every request until the test opens the gate
pub struct GatedSideEffectSink {
    inner: MockSideEffectSink,
    /// Notified when a request reaches the sink
    pub execution_started: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedSideEffectSink {
    pub fn new() -> Self {
        Self {
            inner: MockSideEffectSink::new(),
            execution_started: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Let one waiting (or the next) request through
    pub fn open(&self) {
        self.gate.notify_one();
    }

    pub fn recorded_requests(&self) -> Vec<SideEffectRequest> {
        self.inner.recorded_requests()
    }
}

impl Default for GatedSideEffectSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SideEffectSink for GatedSideEffectSink {
    async fn execute(&self, request: &SideEffectRequest) -> Result<SideEffectReceipt, String> {
        self.execution_started.notify_one();
        self.gate.notified().await;
        self.inner.execute(request).await
    }
}

// ============================================================================
// Scripted Responder
// ============================================================================

/// Responder that replays queued replies and records how long the history
/// was at each call
#[derive(Default)]
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<String>>,
    pub history_lengths: Mutex<Vec<usize>>,
}

impl ScriptedResponder {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            history_lengths: Mutex::new(Vec::new()),
        }
    }
}

impl Responder for ScriptedResponder {
    fn respond(&self, history: &[Message]) -> String {
        self.history_lengths.lock().unwrap().push(history.len());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "(no scripted reply)".to_string())
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn test_orchestrator() -> Orchestrator {
    let registry = Arc::new(WorkflowRegistry::builtin());
    let responder = Arc::new(CannedResponder::new(&registry));
    Orchestrator::new(registry, responder)
}

/// Session manager over the built-in catalog, sharing `sink` with the test
pub fn test_sessions<K: SideEffectSink + 'static>(sink: Arc<K>) -> SessionManager<Arc<K>> {
    SessionManager::new(test_orchestrator(), sink)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::FieldMap;
    use crate::workflow::WorkflowId;
    use uuid::Uuid;

    fn request() -> SideEffectRequest {
        SideEffectRequest {
            id: Uuid::new_v4(),
            conversation_id: "test-conv".to_string(),
            workflow: WorkflowId::new("invoice_creation"),
            data: FieldMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_sink_outcomes() {
        let sink = MockSideEffectSink::new();
        sink.queue_error("billing API down");

        assert_eq!(sink.execute(&request()).await, Err("billing API down".to_string()));
        assert_eq!(sink.execute(&request()).await, Ok(SideEffectReceipt::new("mock-2")));
        assert_eq!(sink.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_gated_sink_waits_for_gate() {
        let sink = Arc::new(GatedSideEffectSink::new());
        let task = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.execute(&request()).await })
        };

        sink.execution_started.notified().await;
        assert!(!task.is_finished());

        sink.open();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(sink.recorded_requests().len(), 1);
    }

    #[test]
    fn test_scripted_responder() {
        let responder = ScriptedResponder::new(["hi!"]);
        assert_eq!(responder.respond(&[Message::user("hello")]), "hi!");
        assert_eq!(responder.respond(&[]), "(no scripted reply)");
        assert_eq!(*responder.history_lengths.lock().unwrap(), vec![1, 0]);
    }
}
