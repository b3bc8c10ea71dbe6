//! User contexts (persona JSON).
//!
//! A context set is exchanged with text-generation collaborators as JSON,
//! often wrapped in chatty text. [`UserContextSet::parse`] extracts the
//! object, checks its shape against the derived JSON Schema, then applies
//! the rules the schema cannot express.

use crate::error::{Error, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// Number of contexts a set must hold.
pub const CONTEXT_COUNT: usize = 5;

static OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object pattern"));

/// One simulated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserContext {
    #[schemars(length(min = 1))]
    pub user_name: String,
    #[schemars(length(min = 1))]
    pub user_role: String,
    #[schemars(length(min = 1))]
    pub user_personality: String,
    #[schemars(length(min = 1))]
    pub what_they_are_doing_for_current_task: String,
    pub conversation_flow: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserContextSet {
    #[schemars(length(equal = 5))]
    pub contexts: Vec<UserContext>,
}

impl UserContextSet {
    /// Parse a context set from text that contains one JSON object.
    pub fn parse(text: &str) -> Result<Self> {
        let json_text = OBJECT
            .find(text)
            .map_or_else(|| text.trim(), |m| m.as_str());
        let value: serde_json::Value = serde_json::from_str(json_text)
            .map_err(|e| Error::InvalidUserContext(format!("invalid JSON format: {e}")))?;

        let schema = crate::json_schema_for::<Self>();
        if let Ok(validator) = jsonschema::validator_for(&schema) {
            let errors: Vec<String> = validator
                .iter_errors(&value)
                .map(|e| format!("{}: {e}", e.instance_path()))
                .collect();
            if !errors.is_empty() {
                return Err(Error::InvalidUserContext(errors.join("; ")));
            }
        }

        let set: Self = serde_json::from_value(value)
            .map_err(|e| Error::InvalidUserContext(e.to_string()))?;
        set.check()?;
        Ok(set)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Rules beyond the schema: exact count and non-blank fields.
    fn check(&self) -> Result<()> {
        if self.contexts.len() != CONTEXT_COUNT {
            return Err(Error::InvalidUserContext(format!(
                "expected exactly {CONTEXT_COUNT} contexts, got {}",
                self.contexts.len()
            )));
        }
        for (i, context) in self.contexts.iter().enumerate() {
            let fields = [
                ("user_name", &context.user_name),
                ("user_role", &context.user_role),
                ("user_personality", &context.user_personality),
                (
                    "what_they_are_doing_for_current_task",
                    &context.what_they_are_doing_for_current_task,
                ),
            ];
            if let Some((key, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
                return Err(Error::InvalidUserContext(format!(
                    "context {} key '{key}' must be a non-empty string",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    /// The context at zero-based `index`.
    pub fn get(&self, index: usize) -> Result<&UserContext> {
        self.contexts.get(index).ok_or_else(|| {
            Error::InvalidUserContext(format!(
                "context index {index} out of range ({} contexts)",
                self.contexts.len()
            ))
        })
    }
}
