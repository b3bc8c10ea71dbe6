//! Convenience re-exports for common `promptloom` types.
//!
//! ```
//! use promptloom::prelude::*;
//! ```
//!
//! Stage-level helpers (markup grammar internals, text utilities, the
//! builder types behind population) are left out. Import those from their
//! modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Error, Result, json_schema_for};

// ── Vocabulary and structure ────────────────────────────────────────
pub use crate::catalog::{BlockCatalog, ComplexBlock, Format, SimpleBlock};
pub use crate::structure::{BlockOccurrence, ComplexOverlay, Item, Paragraph, PromptStructure, VerbatimSpan};

// ── Stages ──────────────────────────────────────────────────────────
pub use crate::annotate::{Annotator, enrich_context};
pub use crate::assemble::Assembler;
pub use crate::explain::{BlockRef, CatalogExplainer, ExplainContext, Explainer, FnExplainer};
pub use crate::markup::{parse_markup, render_markup};
pub use crate::populate::{Anchoring, PopulateOptions, Populator};
pub use crate::validate::{Constraint, Violation, validate_document, validate_structure};

// ── Orchestration ───────────────────────────────────────────────────
pub use crate::batch::{BatchJob, run_batch};
pub use crate::config::{PipelineConfig, PromptRequest};
pub use crate::coverage::CoverageReport;
pub use crate::pipeline::{CancelFlag, Pipeline, PromptReport};
pub use crate::retry::RetryPolicy;
pub use crate::user_context::{UserContext, UserContextSet};
