//! Pure state transition function
//!
//! Given the same state, registry and event, `transition` always returns the
//! same result and performs no I/O. An `Err` means the caller keeps its
//! current state.

use super::{ConvState, Effect, Event, FieldMap};
use crate::workflow::{FieldValue, Step, Workflow, WorkflowId, WorkflowRegistry};
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("{field} is required and can't be skipped")]
    MissingRequiredField { field: String },
    #[error("Conversation state is corrupted: {0}")]
    CorruptedState(String),
    #[error("No workflow is in progress")]
    NoActiveWorkflow,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Errors that leave the conversation unusable until it is reset
    pub fn requires_reset(&self) -> bool {
        matches!(self, TransitionError::CorruptedState(_) | TransitionError::UnknownWorkflow(_))
    }
}

/// Pure transition function
pub fn transition(
    state: &ConvState,
    registry: &WorkflowRegistry,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Transient states settle to Idle before anything else
        // ============================================================
        (ConvState::Completed { .. } | ConvState::Cancelled { .. }, Event::Acknowledge) => {
            Ok(TransitionResult::new(ConvState::Idle))
        }

        (ConvState::Completed { .. } | ConvState::Cancelled { .. }, event) => {
            transition(&ConvState::Idle, registry, event)
        }

        // ============================================================
        // Idle
        // ============================================================
        (ConvState::Idle, Event::Start { workflow }) => start(registry, &workflow, None),

        (ConvState::Idle, Event::Cancel | Event::Acknowledge) => Ok(TransitionResult::new(ConvState::Idle)),

        (ConvState::Idle, Event::Submit { .. } | Event::Back) => Err(TransitionError::NoActiveWorkflow),

        // ============================================================
        // In a workflow
        // ============================================================
        (ConvState::InWorkflow { workflow, step, data }, Event::Submit { raw }) => {
            submit(registry, workflow, *step, data, &raw)
        }

        (ConvState::InWorkflow { workflow, step, data }, Event::Back) => back(registry, workflow, *step, data),

        (ConvState::InWorkflow { workflow, data, .. }, Event::Cancel) => {
            Ok(TransitionResult::new(ConvState::Cancelled {
                workflow: workflow.clone(),
            })
            .with_effect(Effect::Discard {
                workflow: workflow.clone(),
                fields: data.len(),
            }))
        }

        // Switching workflows drops the partial data of the current one
        (ConvState::InWorkflow { workflow: current, data, .. }, Event::Start { workflow }) => {
            let discard = Effect::Discard {
                workflow: current.clone(),
                fields: data.len(),
            };
            start(registry, &workflow, Some(discard))
        }

        (ConvState::InWorkflow { workflow, .. }, Event::Acknowledge) => Err(TransitionError::InvalidTransition(
            format!("{workflow} is still in progress"),
        )),
    }
}

fn start(
    registry: &WorkflowRegistry,
    id: &WorkflowId,
    discarded: Option<Effect>,
) -> Result<TransitionResult, TransitionError> {
    let workflow = registry
        .lookup(id.as_str())
        .ok_or_else(|| TransitionError::UnknownWorkflow(id.to_string()))?;
    let first = step_at(workflow, 0)?;

    Ok(TransitionResult::new(ConvState::InWorkflow {
        workflow: id.clone(),
        step: 0,
        data: FieldMap::new(),
    })
    .with_effects(discarded)
    .with_effect(Effect::prompt(id, first)))
}

fn submit(
    registry: &WorkflowRegistry,
    id: &WorkflowId,
    index: usize,
    data: &FieldMap,
    raw: &str,
) -> Result<TransitionResult, TransitionError> {
    let workflow = active_workflow(registry, id)?;
    let step = step_at(workflow, index)?;
    let mut data = data.clone();

    if raw.trim().is_empty() || registry.vocabulary().is_skip(raw) {
        if !step.is_optional() {
            return Err(TransitionError::MissingRequiredField {
                field: step.field().to_string(),
            });
        }
    } else {
        let value = run_validator(step, raw)?;
        check_lower_bound(step, &data, &value)?;
        data.assign(workflow, step.field(), value)?;
    }

    advance(workflow, index + 1, data)
}

fn advance(workflow: &Workflow, next: usize, data: FieldMap) -> Result<TransitionResult, TransitionError> {
    let id = workflow.id();
    if let Some(step) = workflow.step(next) {
        return Ok(TransitionResult::new(ConvState::InWorkflow {
            workflow: id.clone(),
            step: next,
            data,
        })
        .with_effect(Effect::prompt(id, step)));
    }

    if let Some(missing) = workflow.required_fields().find(|f| !data.contains(f)) {
        return Err(TransitionError::CorruptedState(format!(
            "{id} reached its end without {missing}"
        )));
    }

    Ok(TransitionResult::new(ConvState::Completed {
        workflow: id.clone(),
        data: data.clone(),
    })
    .with_effect(Effect::RequestSideEffect {
        workflow: id.clone(),
        data,
    }))
}

fn back(
    registry: &WorkflowRegistry,
    id: &WorkflowId,
    index: usize,
    data: &FieldMap,
) -> Result<TransitionResult, TransitionError> {
    let workflow = active_workflow(registry, id)?;
    step_at(workflow, index)?;

    let target = index.saturating_sub(1);
    let step = step_at(workflow, target)?;
    let mut data = data.clone();
    data.remove(step.field());

    Ok(TransitionResult::new(ConvState::InWorkflow {
        workflow: id.clone(),
        step: target,
        data,
    })
    .with_effect(Effect::prompt(id, step)))
}

fn active_workflow<'a>(registry: &'a WorkflowRegistry, id: &WorkflowId) -> Result<&'a Workflow, TransitionError> {
    registry
        .lookup(id.as_str())
        .ok_or_else(|| TransitionError::CorruptedState(format!("unknown workflow {id}")))
}

fn step_at(workflow: &Workflow, index: usize) -> Result<&Step, TransitionError> {
    workflow.step(index).ok_or_else(|| {
        TransitionError::CorruptedState(format!(
            "step {index} is past the end of {} ({} steps)",
            workflow.id(),
            workflow.len()
        ))
    })
}

fn check_lower_bound(step: &Step, data: &FieldMap, value: &FieldValue) -> Result<(), TransitionError> {
    let Some(bound) = step.lower_bound() else {
        return Ok(());
    };
    match data.get(bound) {
        Some(earliest) if value.precedes(earliest) == Some(true) => Err(TransitionError::Validation {
            field: step.field().to_string(),
            reason: format!("It can't be before {bound} ({earliest})"),
        }),
        _ => Ok(()),
    }
}

/// Run a step's validator. A panicking validator is reported as a
/// validation failure for that field.
fn run_validator(step: &Step, raw: &str) -> Result<FieldValue, TransitionError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| step.validator().validate(raw)));
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(reason)) => Err(TransitionError::Validation {
            field: step.field().to_string(),
            reason,
        }),
        Err(_) => Err(TransitionError::Validation {
            field: step.field().to_string(),
            reason: "This value couldn't be checked. Please try again.".to_string(),
        }),
    }
}
