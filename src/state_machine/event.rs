//! Events that can occur in a conversation

use crate::workflow::WorkflowId;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Enter a workflow at its first step
    Start { workflow: WorkflowId },
    /// Answer for the current step
    Submit { raw: String },
    /// Rewind to the previous step
    Back,
    /// Abandon the current workflow
    Cancel,
    /// Settle a transient `Completed`/`Cancelled` state back to `Idle`
    Acknowledge,
}

impl Event {
    pub fn start(workflow: impl Into<WorkflowId>) -> Self {
        Event::Start {
            workflow: workflow.into(),
        }
    }

    pub fn submit(raw: impl Into<String>) -> Self {
        Event::Submit { raw: raw.into() }
    }
}
