//! Workflow catalog file format
//!
//! A catalog is plain configuration: trigger phrases, prompts and validator
//! kinds for every workflow, plus the words that mean "skip", "cancel" and
//! "back" inside a workflow.

use super::validators::ValidatorSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Catalog declares no workflows")]
    Empty,
    #[error("Workflow declared twice: {0}")]
    DuplicateWorkflow(String),
    #[error("Workflow {0} has no steps")]
    NoSteps(String),
    #[error("Workflow {workflow} declares field {field} twice")]
    DuplicateField { workflow: String, field: String },
    #[error("Workflow {workflow}: step {field} has an empty prompt")]
    EmptyPrompt { workflow: String, field: String },
    #[error("Workflow {0} has a blank trigger phrase")]
    BlankTrigger(String),
    #[error("Workflow {workflow}: report type field {field} is not a declared step")]
    UnknownReportField { workflow: String, field: String },
    #[error("Workflow {workflow}: choice for {field} has no options")]
    EmptyChoice { workflow: String, field: String },
    #[error("Workflow {workflow}: {field} is bounded by {bound}, which is not an earlier step")]
    UnknownLowerBound {
        workflow: String,
        field: String,
        bound: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDef {
    pub idle_prompt: String,
    #[serde(default = "default_skip_words")]
    pub skip_words: Vec<String>,
    #[serde(default = "default_cancel_words")]
    pub cancel_words: Vec<String>,
    #[serde(default = "default_back_words")]
    pub back_words: Vec<String>,
    pub workflows: Vec<WorkflowDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    pub completion_message: String,
    /// Field whose value labels the confirmation message as a report type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_type_field: Option<String>,
    pub steps: Vec<StepDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDef {
    pub field: String,
    pub prompt: String,
    #[serde(default)]
    pub optional: bool,
    pub validator: ValidatorSpec,
    /// Earlier field whose value this one may not precede
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
}

fn default_skip_words() -> Vec<String> {
    vec!["skip".to_string(), "pular".to_string()]
}

fn default_cancel_words() -> Vec<String> {
    ["cancel", "cancelar", "stop", "sair"].into_iter().map(String::from).collect()
}

fn default_back_words() -> Vec<String> {
    vec!["back".to_string(), "voltar".to_string()]
}
