//! Workflow registry, steps and validators

pub mod catalog;
mod registry;
mod step;
pub mod validators;

pub use catalog::CatalogError;
pub use registry::{Vocabulary, Workflow, WorkflowId, WorkflowRegistry};
pub use step::{FieldValue, Money, Step, Validator, ValidatorFn};
pub use validators::{ChoiceOption, ValidatorSpec};
