//! Pipeline configuration and request files.
//!
//! ```
//! use promptloom::config::PipelineConfig;
//!
//! let config = PipelineConfig::default()
//!     .with_exact_paragraphs(6)
//!     .with_max_attempts(3)
//!     .with_seed(7);
//! assert_eq!(config.paragraphs, 6..=6);
//! ```

use crate::annotate::MIN_SETTINGS;
use crate::assemble::check_literal;
use crate::catalog::BlockCatalog;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::text;
use crate::validate::{MAX_PARAGRAPHS, MIN_PARAGRAPHS, leaked_tool_names};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Allowed paragraph counts, within 6..=8.
    pub paragraphs: RangeInclusive<usize>,
    pub retry: RetryPolicy,
    /// Base seed. A random one is drawn (and reported) when unset.
    pub seed: Option<u64>,
    /// Minimum document length in characters.
    pub min_chars: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paragraphs: MIN_PARAGRAPHS..=MAX_PARAGRAPHS,
            retry: RetryPolicy::default(),
            seed: None,
            min_chars: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_paragraphs(mut self, range: RangeInclusive<usize>) -> Self {
        self.paragraphs = range;
        self
    }

    pub fn with_exact_paragraphs(self, n: usize) -> Self {
        self.with_paragraphs(n..=n)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = Some(min_chars);
        self
    }
}

/// One prompt to generate, as read from a request file or CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PromptRequest {
    /// Fragments that must appear word for word, one span each.
    #[serde(default)]
    pub inspiration: Vec<String>,
    /// Literal appended unmodified to the final paragraph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_include: Option<String>,
    /// Name of the user the prompt addresses. Mentioned at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    /// Tool names that must never appear in the document.
    #[serde(default)]
    pub tool_names: Vec<String>,
    /// System settings folded into the context block (2 to 5 used).
    #[serde(default)]
    pub system_settings: Vec<String>,
}

impl PromptRequest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject inputs no attempt could turn into a valid document.
    pub fn check(&self, catalog: &BlockCatalog) -> Result<()> {
        for fragment in &self.inspiration {
            check_literal(fragment, "inspiration fragment", catalog)?;
        }
        if let Some(must) = &self.must_include {
            check_literal(must, "must-include text", catalog)?;
        }
        if let Some(persona) = &self.persona {
            check_literal(persona, "persona name", catalog)?;
        }
        let protected = self
            .inspiration
            .iter()
            .chain(self.must_include.as_ref())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        let leaked = leaked_tool_names(&protected, &self.tool_names);
        if !leaked.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "verbatim text names tool(s) that must not appear: {}",
                leaked.join(", ")
            )));
        }

        // Text the populator writes after tool names are scrubbed.
        let mut inserted = vec![text::TOOL_REFERENT.to_string(), text::BLOCK_REFERENT.to_string()];
        if let Some(persona) = &self.persona {
            inserted.push(text::persona_introduction(persona));
        }
        let clashing = leaked_tool_names(&inserted.join("\n"), &self.tool_names);
        if !clashing.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "tool name(s) {} would match the generated wording; use the full tool name",
                clashing.join(", ")
            )));
        }

        if let Some(pattern) = self.persona.as_deref().and_then(text::persona_pattern) {
            let mentions = pattern.find_iter(&protected).count();
            if mentions > 1 {
                return Err(Error::InvalidRequest(format!(
                    "persona name appears {mentions} times in verbatim text; at most once is allowed"
                )));
            }
        }
        let settings = self
            .system_settings
            .iter()
            .filter(|s| !s.trim().is_empty())
            .count();
        if settings > 0 && settings < MIN_SETTINGS {
            return Err(Error::InvalidRequest(format!(
                "{settings} system setting given; at least {MIN_SETTINGS} are needed"
            )));
        }
        Ok(())
    }
}
