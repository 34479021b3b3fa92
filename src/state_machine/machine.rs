//! Per-session state machine
//!
//! Thin shell around [`transition`]: it owns the current state and commits a
//! new one only when the transition succeeds.

use super::{transition, ConvState, Effect, Event, FieldMap, TransitionError};
use crate::workflow::{Step, Workflow, WorkflowId, WorkflowRegistry};
use std::sync::Arc;

/// What happened to an accepted answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored (or skipped); the next step is waiting
    Advanced { field: String, prompt: String },
    /// The last step was answered
    Completed { workflow: WorkflowId, data: FieldMap },
}

#[derive(Debug, Clone)]
pub struct ConversationStateMachine {
    registry: Arc<WorkflowRegistry>,
    state: ConvState,
}

impl ConversationStateMachine {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            registry,
            state: ConvState::Idle,
        }
    }

    /// Adopt a previously saved state after checking it against the registry
    pub fn resume(registry: Arc<WorkflowRegistry>, state: ConvState) -> Result<Self, TransitionError> {
        state.check(&registry)?;
        Ok(Self { registry, state })
    }

    pub fn state(&self) -> &ConvState {
        &self.state
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Apply an event. On error the state is left untouched.
    pub fn apply(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        let result = transition(&self.state, &self.registry, event)?;
        tracing::debug!(
            from = ?self.state.mode(),
            to = ?result.new_state.mode(),
            step = ?result.new_state.step_index(),
            "State transition"
        );
        self.state = result.new_state;
        Ok(result.effects)
    }

    /// Enter `workflow` at its first step; returns the first prompt
    pub fn start(&mut self, workflow: &str) -> Result<String, TransitionError> {
        let effects = self.apply(Event::start(workflow))?;
        prompt_from(effects)
    }

    pub fn submit(&mut self, raw: &str) -> Result<SubmitOutcome, TransitionError> {
        let effects = self.apply(Event::submit(raw))?;
        let mut prompt = None;
        for effect in effects {
            match effect {
                Effect::RequestSideEffect { workflow, data } => {
                    return Ok(SubmitOutcome::Completed { workflow, data });
                }
                Effect::Prompt { field, text, .. } => prompt = Some(SubmitOutcome::Advanced { field, prompt: text }),
                Effect::Discard { .. } => {}
            }
        }
        prompt.ok_or_else(|| TransitionError::InvalidTransition("submit produced no prompt".to_string()))
    }

    /// Rewind one step; returns the prompt to re-ask
    pub fn back(&mut self) -> Result<String, TransitionError> {
        let effects = self.apply(Event::Back)?;
        prompt_from(effects)
    }

    /// Abandon the current workflow and return to chat.
    /// Returns the abandoned workflow, or `None` when nothing was in progress.
    pub fn cancel(&mut self) -> Option<WorkflowId> {
        let cancelled = match self.apply(Event::Cancel) {
            Ok(effects) => effects.into_iter().find_map(|effect| match effect {
                Effect::Discard { workflow, .. } => Some(workflow),
                _ => None,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Cancel failed, forcing reset");
                self.reset().workflow().cloned()
            }
        };
        self.acknowledge();
        cancelled
    }

    /// Settle `Completed`/`Cancelled` back to `Idle`
    pub fn acknowledge(&mut self) {
        if self.state.is_transient() {
            self.state = ConvState::Idle;
        }
    }

    /// Unconditionally return to `Idle`, handing back the abandoned state
    pub fn reset(&mut self) -> ConvState {
        std::mem::take(&mut self.state)
    }

    pub fn active_workflow(&self) -> Option<&Workflow> {
        match &self.state {
            ConvState::InWorkflow { workflow, .. } => self.registry.lookup(workflow.as_str()),
            _ => None,
        }
    }

    pub fn current_step(&self) -> Option<&Step> {
        let index = self.state.step_index()?;
        self.active_workflow()?.step(index)
    }

    /// Prompt for the active step, or the chat prompt when no workflow runs
    pub fn current_prompt(&self) -> &str {
        match self.current_step() {
            Some(step) => step.prompt(),
            None => &self.registry.vocabulary().idle_prompt,
        }
    }
}

fn prompt_from(effects: Vec<Effect>) -> Result<String, TransitionError> {
    effects
        .into_iter()
        .find_map(|effect| match effect {
            Effect::Prompt { text, .. } => Some(text),
            _ => None,
        })
        .ok_or_else(|| TransitionError::InvalidTransition("transition produced no prompt".to_string()))
}
