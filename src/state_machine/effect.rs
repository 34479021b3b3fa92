//! Effects produced by state transitions

use super::state::FieldMap;
use crate::workflow::{Step, WorkflowId};

/// Effects to be acted on after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the user for a step's value
    Prompt {
        workflow: WorkflowId,
        field: String,
        text: String,
        optional: bool,
    },

    /// Every step answered; the host should act on the validated data
    RequestSideEffect { workflow: WorkflowId, data: FieldMap },

    /// A workflow was left before completion and its partial data dropped
    Discard { workflow: WorkflowId, fields: usize },
}

impl Effect {
    pub fn prompt(workflow: &WorkflowId, step: &Step) -> Self {
        Effect::Prompt {
            workflow: workflow.clone(),
            field: step.field().to_string(),
            text: step.prompt().to_string(),
            optional: step.is_optional(),
        }
    }

    pub fn is_side_effect_request(&self) -> bool {
        matches!(self, Effect::RequestSideEffect { .. })
    }
}
