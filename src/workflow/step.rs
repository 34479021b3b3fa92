//! Steps and validated field values

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A currency amount in integer cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn cents(self) -> i64 {
        self.cents
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A value that passed its step validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Money(Money),
    Date(NaiveDate),
    Choice {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credit_cost: Option<u32>,
    },
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// JSON form used in side-effect payloads. Money is rendered as a
    /// two-decimal string so no precision is lost on the way out.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Money(money) => Value::String(money.to_string()),
            FieldValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            FieldValue::Choice { value, .. } => Value::String(value.clone()),
        }
    }

    /// Whether `self` comes strictly before `other`. `None` when the two
    /// values have no common order (different kinds, or text).
    pub fn precedes(&self, other: &FieldValue) -> Option<bool> {
        match (self, other) {
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a < b),
            (FieldValue::Money(a), FieldValue::Money(b)) => Some(a < b),
            _ => None,
        }
    }

    pub fn credit_cost(&self) -> Option<u32> {
        match self {
            FieldValue::Choice { credit_cost, .. } => *credit_cost,
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Money(money) => write!(f, "{money}"),
            FieldValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            FieldValue::Choice { value, .. } => f.write_str(value),
        }
    }
}

/// Pure validation function: raw user input to a typed value or a reason
pub type ValidatorFn = dyn Fn(&str) -> Result<FieldValue, String> + Send + Sync;

/// Named, shareable validator
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<ValidatorFn>,
}

impl Validator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> Result<FieldValue, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validate(&self, raw: &str) -> Result<FieldValue, String> {
        (self.check)(raw)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

/// One input within a workflow
#[derive(Debug, Clone)]
pub struct Step {
    field: String,
    prompt: String,
    validator: Validator,
    optional: bool,
    /// Earlier field this value may not precede
    lower_bound: Option<String>,
}

impl Step {
    pub fn required(field: impl Into<String>, prompt: impl Into<String>, validator: Validator) -> Self {
        Self {
            field: field.into(),
            prompt: prompt.into(),
            validator,
            optional: false,
            lower_bound: None,
        }
    }

    pub fn optional(field: impl Into<String>, prompt: impl Into<String>, validator: Validator) -> Self {
        Self {
            optional: true,
            ..Self::required(field, prompt, validator)
        }
    }

    /// Require the value to be no earlier than the one captured for `field`
    pub fn with_lower_bound(mut self, field: impl Into<String>) -> Self {
        self.lower_bound = Some(field.into());
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn lower_bound(&self) -> Option<&str> {
        self.lower_bound.as_deref()
    }
}
