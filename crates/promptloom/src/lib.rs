//! Structured system-prompt assembly, validation, and population.
//!
//! `promptloom` builds system prompts out of a fixed catalog of semantic
//! blocks. A prompt starts life as a *structure*: paragraphs of block
//! references, complex-block overlays, explanations and verbatim spans, all
//! expressible in a small bracket markup. The structure is checked against a
//! set of counting and coverage invariants, then expanded into prose with
//! verbatim text preserved and tool names scrubbed.
//!
//! ```
//! use promptloom::prelude::*;
//!
//! let request = PromptRequest {
//!     inspiration: vec!["answer in metric units".into()],
//!     must_include: Some("Always confirm before deleting files.".into()),
//!     ..Default::default()
//! };
//! let report = Pipeline::new(PipelineConfig::default().with_seed(7))
//!     .run(&request, None)
//!     .unwrap();
//! assert!(report.document.ends_with("Always confirm before deleting files."));
//! assert!(!report.document.contains('['));
//! ```
//!
//! # Where to find things
//!
//! - **The block vocabulary:** [`BlockCatalog`](catalog::BlockCatalog), with
//!   [`SimpleBlock`](catalog::SimpleBlock) and
//!   [`ComplexBlock`](catalog::ComplexBlock).
//!
//! - **Building a structure by stages:** [`Assembler`](assemble::Assembler)
//!   lays out paragraphs and simple references,
//!   [`Annotator`](annotate::Annotator) overlays complex blocks and fills
//!   explanations through an [`Explainer`](explain::Explainer), and
//!   [`enrich_context`](annotate::enrich_context) folds system settings in.
//!
//! - **Checking:** [`validate_structure`](validate::validate_structure) and
//!   [`validate_document`](validate::validate_document) report every broken
//!   constraint at once. [`CoverageReport`](coverage::CoverageReport)
//!   summarises complex-block coverage.
//!
//! - **Markup:** [`render_markup`](markup::render_markup) and
//!   [`parse_markup`](markup::parse_markup).
//!
//! - **Prose:** [`Populator`](populate::Populator).
//!
//! - **End to end:** [`Pipeline`](pipeline::Pipeline) runs every stage with
//!   bounded retries; [`run_batch`](batch::run_batch) runs many requests
//!   concurrently.

pub mod annotate;
pub mod assemble;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod coverage;
pub mod error;
pub mod explain;
pub mod markup;
pub mod pipeline;
pub mod populate;
pub mod prelude;
pub mod retry;
pub mod structure;
pub mod text;
pub mod user_context;
pub mod validate;

use schemars::JsonSchema;

pub use error::{Error, Result};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// ```
/// use promptloom::json_schema_for;
/// use promptloom::structure::PromptStructure;
///
/// let schema = json_schema_for::<PromptStructure>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"paragraphs".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}
