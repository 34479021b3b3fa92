//! Host configuration from environment variables

use crate::workflow::{CatalogError, WorkflowRegistry};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const CATALOG_VAR: &str = "BILLING_ASSISTANT_CATALOG";
pub const LOG_FORMAT_VAR: &str = "BILLING_ASSISTANT_LOG_FORMAT";
pub const SESSION_VAR: &str = "BILLING_ASSISTANT_SESSION";

const DEFAULT_SESSION: &str = "local";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { var: &'static str, value: String },
    #[error("{var} is set but empty")]
    Empty { var: &'static str },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ConfigError::InvalidLogFormat {
                var: LOG_FORMAT_VAR,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Workflow catalog file; the built-in catalog when `None`
    pub catalog_path: Option<PathBuf>,
    pub log_format: LogFormat,
    pub session_id: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            log_format: LogFormat::default(),
            session_id: DEFAULT_SESSION.to_string(),
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &'static str| match lookup(var) {
            Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { var }),
            other => Ok(other),
        };

        let mut config = Self::default();
        if let Some(path) = non_empty(CATALOG_VAR)? {
            config.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(format) = non_empty(LOG_FORMAT_VAR)? {
            config.log_format = format.parse()?;
        }
        if let Some(session) = non_empty(SESSION_VAR)? {
            config.session_id = session.trim().to_string();
        }
        Ok(config)
    }

    /// Load the configured catalog, or the built-in one
    pub fn load_registry(&self) -> Result<WorkflowRegistry, ConfigError> {
        match &self.catalog_path {
            Some(path) => {
                let registry = WorkflowRegistry::from_path(path)?;
                tracing::info!(path = %path.display(), workflows = registry.len(), "Loaded workflow catalog");
                Ok(registry)
            }
            None => Ok(WorkflowRegistry::builtin()),
        }
    }
}
