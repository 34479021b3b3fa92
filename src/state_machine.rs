//! Core conversation state machine
//!
//! Pure state transitions in `transition`, with effects returned as data;
//! `ConversationStateMachine` holds one session's state.

mod effect;
pub mod event;
mod machine;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use machine::{ConversationStateMachine, SubmitOutcome};
pub use state::{ConvState, FieldMap, Mode};
pub use transition::{transition, TransitionError, TransitionResult};
