//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::workflow::{Step, WorkflowRegistry};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn registry() -> WorkflowRegistry {
    WorkflowRegistry::builtin()
}

/// A value the step's validator accepts
fn valid_input(step: &Step) -> &'static str {
    match step.validator().name() {
        "identifier" => "123",
        "email" => "billing@acme.com",
        "phone" => "(11) 98765-4321",
        "money" => "150.00",
        "date" => "2025-01-01",
        "choice" => "revenue",
        "tax_id" => "529.982.247-25",
        _ => "Acme Ltda",
    }
}

const WORKFLOWS: [&str; 3] = ["client_registration", "invoice_creation", "report_generation"];

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_raw_input() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("123".to_string()),
        Just("Acme Ltda".to_string()),
        Just("billing@acme.com".to_string()),
        Just("(11) 98765-4321".to_string()),
        Just("150.00".to_string()),
        Just("2025-01-01".to_string()),
        Just("revenue".to_string()),
        Just("529.982.247-25".to_string()),
        Just("skip".to_string()),
        Just(String::new()),
        "[a-zA-Z0-9 .,@/-]{0,16}",
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => prop::sample::select(WORKFLOWS.to_vec()).prop_map(Event::start),
        1 => Just(Event::start("payroll")),
        8 => arb_raw_input().prop_map(Event::submit),
        1 => Just(Event::Back),
        1 => Just(Event::Cancel),
        1 => Just(Event::Acknowledge),
    ]
}

fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    proptest::collection::vec(arb_event(), 0..30)
}

/// Drive a state through events, ignoring rejected ones
fn reach(registry: &WorkflowRegistry, events: Vec<Event>) -> ConvState {
    let mut state = ConvState::Idle;
    for event in events {
        if let Ok(result) = transition(&state, registry, event) {
            state = result.new_state;
        }
    }
    state
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn effects_are_valid(effects: &[Effect], new_state: &ConvState) -> bool {
    let requests = effects.iter().filter(|e| e.is_side_effect_request()).count();
    let completed = matches!(new_state, ConvState::Completed { .. });

    // A side effect is requested exactly when a workflow completes
    if completed != (requests == 1) || requests > 1 {
        return false;
    }

    // Prompts only while collecting input
    let prompts = effects.iter().filter(|e| matches!(e, Effect::Prompt { .. })).count();
    if prompts > 0 && !new_state.in_workflow() {
        return false;
    }

    true
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: every reachable state is consistent with the registry
    #[test]
    fn prop_transitions_preserve_validity(events in arb_events()) {
        let registry = registry();
        let mut state = ConvState::Idle;

        for event in events {
            if let Ok(result) = transition(&state, &registry, event) {
                state = result.new_state;
                prop_assert!(state.check(&registry).is_ok(), "Invalid state: {:?}", state);
                prop_assert!(
                    effects_are_valid(&result.effects, &state),
                    "Invalid effects for state {:?}: {:?}",
                    state,
                    result.effects
                );
            }
        }
    }

    // Invariant 2: a rejected answer changes neither step nor data
    #[test]
    fn prop_rejected_submit_leaves_state_unchanged(events in arb_events(), raw in arb_raw_input()) {
        let registry = Arc::new(registry());
        let state = reach(&registry, events);
        let mut machine = ConversationStateMachine::resume(registry, state.clone()).unwrap();

        if machine.submit(&raw).is_err() {
            prop_assert_eq!(machine.state(), &state);
        }
    }

    // Invariant 3: cancel always lands in Idle with nothing collected
    #[test]
    fn prop_cancel_returns_to_idle(events in arb_events()) {
        let registry = Arc::new(registry());
        let state = reach(&registry, events);
        let was_in_workflow = state.in_workflow();
        let mut machine = ConversationStateMachine::resume(registry, state).unwrap();

        let cancelled = machine.cancel();

        prop_assert_eq!(machine.state(), &ConvState::Idle);
        prop_assert!(machine.state().data().is_none());
        prop_assert_eq!(cancelled.is_some(), was_in_workflow);
    }

    // Invariant 4: valid answers for every step complete exactly once,
    // whichever optional steps are skipped
    #[test]
    fn prop_valid_walk_completes_once(
        workflow_index in 0usize..WORKFLOWS.len(),
        skips in proptest::collection::vec(any::<bool>(), 8),
    ) {
        let registry = registry();
        let id = WORKFLOWS[workflow_index];
        let workflow = registry.lookup(id).unwrap();

        let mut result = transition(&ConvState::Idle, &registry, Event::start(id)).unwrap();
        let mut requests = 0;
        let mut completions = 0;

        for (index, step) in workflow.steps().iter().enumerate() {
            let raw = if step.is_optional() && skips[index] { "skip" } else { valid_input(step) };
            result = transition(&result.new_state, &registry, Event::submit(raw)).unwrap();
            requests += result.effects.iter().filter(|e| e.is_side_effect_request()).count();
            if matches!(result.new_state, ConvState::Completed { .. }) {
                completions += 1;
            }
        }

        prop_assert_eq!(requests, 1);
        prop_assert_eq!(completions, 1);
        let data = result.new_state.data().unwrap();
        for field in workflow.required_fields() {
            prop_assert!(data.contains(field), "missing {}", field);
        }
    }

    // Invariant 5: transitions are deterministic
    #[test]
    fn prop_transition_is_deterministic(events in arb_events(), event in arb_event()) {
        let registry = registry();
        let state = reach(&registry, events);

        let first = transition(&state, &registry, event.clone());
        let second = transition(&state, &registry, event);

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.new_state, b.new_state);
                prop_assert_eq!(a.effects, b.effects);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            (a, b) => prop_assert!(false, "diverged: {:?} vs {:?}", a, b),
        }
    }

    // Invariant 6: data only ever holds fields the active workflow declares
    #[test]
    fn prop_data_keys_are_declared(events in arb_events()) {
        let registry = registry();
        let state = reach(&registry, events);

        if let (Some(id), Some(data)) = (state.workflow(), state.data()) {
            let workflow = registry.lookup(id.as_str()).unwrap();
            prop_assert!(data.undeclared_fields(workflow).is_empty());
        }
    }
}
