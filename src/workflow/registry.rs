//! Workflow registry
//!
//! Fixed at startup and read-only afterwards. The rest of the crate never
//! names a concrete workflow; everything it needs comes from here.

use super::catalog::{CatalogDef, CatalogError, WorkflowDef};
use super::step::Step;
use super::validators::ValidatorSpec;
use crate::text::{fold, words};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("catalog.json");

/// Name of a workflow, e.g. `invoice_creation`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A registered workflow: ordered steps plus the phrases that start it
#[derive(Debug, Clone)]
pub struct Workflow {
    id: WorkflowId,
    title: String,
    triggers: Vec<String>,
    completion_message: String,
    report_type_field: Option<String>,
    steps: Vec<Step>,
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            triggers: Vec::new(),
            completion_message: "All set.".to_string(),
            report_type_field: None,
            steps: Vec::new(),
        }
    }

    pub fn with_trigger(mut self, phrase: impl Into<String>) -> Self {
        self.triggers.push(phrase.into());
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_completion_message(mut self, message: impl Into<String>) -> Self {
        self.completion_message = message.into();
        self
    }

    pub fn with_report_type_field(mut self, field: impl Into<String>) -> Self {
        self.report_type_field = Some(field.into());
        self
    }

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn completion_message(&self) -> &str {
        &self.completion_message
    }

    pub fn report_type_field(&self) -> Option<&str> {
        self.report_type_field.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether `field` is part of this workflow's schema
    pub fn declares(&self, field: &str) -> bool {
        self.steps.iter().any(|s| s.field() == field)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter(|s| !s.is_optional()).map(Step::field)
    }

    fn from_def(def: WorkflowDef) -> Result<Self, CatalogError> {
        let mut workflow = Workflow::new(def.id, def.title).with_completion_message(def.completion_message);
        workflow.triggers = def.triggers;
        workflow.report_type_field = def.report_type_field;
        for step in def.steps {
            if let ValidatorSpec::Choice { options } = &step.validator {
                if options.is_empty() {
                    return Err(CatalogError::EmptyChoice {
                        workflow: workflow.id.to_string(),
                        field: step.field,
                    });
                }
            }
            let validator = step.validator.build();
            let mut built = if step.optional {
                Step::optional(step.field, step.prompt, validator)
            } else {
                Step::required(step.field, step.prompt, validator)
            };
            if let Some(bound) = step.not_before {
                built = built.with_lower_bound(bound);
            }
            workflow.steps.push(built);
        }
        Ok(workflow)
    }

    fn check(&self) -> Result<(), CatalogError> {
        let id = self.id.to_string();
        if self.steps.is_empty() {
            return Err(CatalogError::NoSteps(id));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if let Some(bound) = step.lower_bound() {
                if !seen.contains(bound) {
                    return Err(CatalogError::UnknownLowerBound {
                        workflow: id,
                        field: step.field().to_string(),
                        bound: bound.to_string(),
                    });
                }
            }
            if !seen.insert(step.field()) {
                return Err(CatalogError::DuplicateField {
                    workflow: id,
                    field: step.field().to_string(),
                });
            }
            if step.prompt().trim().is_empty() {
                return Err(CatalogError::EmptyPrompt {
                    workflow: id,
                    field: step.field().to_string(),
                });
            }
        }
        if self.triggers.iter().any(|t| fold(t).is_empty()) {
            return Err(CatalogError::BlankTrigger(id));
        }
        if let Some(field) = &self.report_type_field {
            if !self.declares(field) {
                return Err(CatalogError::UnknownReportField {
                    workflow: id,
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Words with a fixed meaning inside a workflow
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub idle_prompt: String,
    pub skip_words: Vec<String>,
    pub cancel_words: Vec<String>,
    pub back_words: Vec<String>,
}

impl Vocabulary {
    fn matches(list: &[String], input: &str) -> bool {
        let answer = fold(input);
        !answer.is_empty() && list.iter().any(|w| fold(w) == answer)
    }

    pub fn is_skip(&self, input: &str) -> bool {
        Self::matches(&self.skip_words, input)
    }

    pub fn is_cancel(&self, input: &str) -> bool {
        Self::matches(&self.cancel_words, input)
    }

    pub fn is_back(&self, input: &str) -> bool {
        Self::matches(&self.back_words, input)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            idle_prompt: "How can I help?".to_string(),
            skip_words: vec!["skip".to_string()],
            cancel_words: vec!["cancel".to_string()],
            back_words: vec!["back".to_string()],
        }
    }
}

/// Catalog of every workflow a conversation can enter
#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    workflows: Vec<Workflow>,
    vocabulary: Vocabulary,
    /// Folded trigger phrases, parallel to `workflows`
    trigger_words: Vec<Vec<Vec<String>>>,
}

impl WorkflowRegistry {
    pub fn new(workflows: Vec<Workflow>, vocabulary: Vocabulary) -> Result<Self, CatalogError> {
        if workflows.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut ids = HashSet::new();
        for workflow in &workflows {
            if !ids.insert(workflow.id.clone()) {
                return Err(CatalogError::DuplicateWorkflow(workflow.id.to_string()));
            }
            workflow.check()?;
        }
        let trigger_words = workflows
            .iter()
            .map(|w| w.triggers.iter().map(|t| words(t)).collect())
            .collect();
        Ok(Self {
            workflows,
            vocabulary,
            trigger_words,
        })
    }

    /// The catalog shipped with the crate
    ///
    /// # Panics
    ///
    /// Panics if the embedded `catalog.json` fails to load, which
    /// `test_builtin_catalog_loads` rules out.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_CATALOG).expect("built-in workflow catalog is valid")
    }

    pub fn from_catalog(def: CatalogDef) -> Result<Self, CatalogError> {
        let vocabulary = Vocabulary {
            idle_prompt: def.idle_prompt,
            skip_words: def.skip_words,
            cancel_words: def.cancel_words,
            back_words: def.back_words,
        };
        let workflows = def
            .workflows
            .into_iter()
            .map(Workflow::from_def)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(workflows, vocabulary)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Self::from_catalog(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn lookup(&self, id: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.id.as_str() == id)
    }

    /// Workflows in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Workflow> {
        self.workflows.iter()
    }

    pub(crate) fn iter_with_triggers(&self) -> impl Iterator<Item = (&Workflow, &[Vec<String>])> {
        self.workflows
            .iter()
            .zip(self.trigger_words.iter().map(Vec::as_slice))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
