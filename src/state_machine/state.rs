//! Conversation state types

use super::transition::TransitionError;
use crate::workflow::{FieldValue, Workflow, WorkflowId, WorkflowRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Field Map - schema-checked workflow data
// ============================================================================

/// Values collected so far in a workflow, keyed by field name.
///
/// Keys are checked against the workflow schema on assignment, so a map can
/// never hold a field its workflow does not declare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    values: BTreeMap<String, FieldValue>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `field`, rejecting fields `workflow` does not declare
    pub fn assign(&mut self, workflow: &Workflow, field: &str, value: FieldValue) -> Result<(), TransitionError> {
        if !workflow.declares(field) {
            return Err(TransitionError::CorruptedState(format!(
                "field {field} is not declared by workflow {}",
                workflow.id()
            )));
        }
        self.values.insert(field.to_string(), value);
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.values.remove(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fields present here that `workflow` does not declare
    pub fn undeclared_fields<'a>(&'a self, workflow: &Workflow) -> Vec<&'a str> {
        self.values
            .keys()
            .map(String::as_str)
            .filter(|field| !workflow.declares(field))
            .collect()
    }

    /// Flat JSON object of field name to plain value
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        Value::Object(map)
    }
}

// ============================================================================
// Mode
// ============================================================================

/// Which workflow, if any, a conversation is in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Chat,
    Workflow(WorkflowId),
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Chat => f.write_str("chat"),
            Mode::Workflow(id) => write!(f, "{id}"),
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Conversation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// Plain chat, no workflow in progress
    #[default]
    Idle,

    /// Collecting the value for `step` of `workflow`
    InWorkflow {
        workflow: WorkflowId,
        step: usize,
        #[serde(default)]
        data: FieldMap,
    },

    /// Every step answered; the side effect has been requested.
    /// Transient: the next event starts from `Idle`.
    Completed { workflow: WorkflowId, data: FieldMap },

    /// User abandoned the workflow. Transient like `Completed`.
    Cancelled { workflow: WorkflowId },
}

impl ConvState {
    pub fn mode(&self) -> Mode {
        match self.workflow() {
            Some(id) if !self.is_transient() => Mode::Workflow(id.clone()),
            _ => Mode::Chat,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConvState::Idle)
    }

    pub fn in_workflow(&self) -> bool {
        matches!(self, ConvState::InWorkflow { .. })
    }

    /// `Completed` and `Cancelled` only exist between two events
    pub fn is_transient(&self) -> bool {
        matches!(self, ConvState::Completed { .. } | ConvState::Cancelled { .. })
    }

    pub fn workflow(&self) -> Option<&WorkflowId> {
        match self {
            ConvState::Idle => None,
            ConvState::InWorkflow { workflow, .. }
            | ConvState::Completed { workflow, .. }
            | ConvState::Cancelled { workflow } => Some(workflow),
        }
    }

    pub fn step_index(&self) -> Option<usize> {
        match self {
            ConvState::InWorkflow { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&FieldMap> {
        match self {
            ConvState::InWorkflow { data, .. } | ConvState::Completed { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Verify the state only references workflows, steps and fields the
    /// registry declares. Used before adopting a saved state.
    pub fn check(&self, registry: &WorkflowRegistry) -> Result<(), TransitionError> {
        let Some(id) = self.workflow() else {
            return Ok(());
        };
        let workflow = registry
            .lookup(id.as_str())
            .ok_or_else(|| TransitionError::CorruptedState(format!("unknown workflow {id}")))?;

        if let Some(step) = self.step_index() {
            if step >= workflow.len() {
                return Err(TransitionError::CorruptedState(format!(
                    "step {step} is past the end of {id} ({} steps)",
                    workflow.len()
                )));
            }
        }

        if let Some(data) = self.data() {
            let undeclared = data.undeclared_fields(workflow);
            if !undeclared.is_empty() {
                return Err(TransitionError::CorruptedState(format!(
                    "{id} does not declare {}",
                    undeclared.join(", ")
                )));
            }
        }

        if let ConvState::Completed { data, .. } = self {
            if let Some(missing) = workflow.required_fields().find(|f| !data.contains(f)) {
                return Err(TransitionError::CorruptedState(format!(
                    "{id} completed without {missing}"
                )));
            }
        }
        Ok(())
    }
}
