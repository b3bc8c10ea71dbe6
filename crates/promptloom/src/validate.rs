//! Structural and output validation.
//!
//! Both entry points are pure: they never mutate their input and always
//! report every violated constraint, in a stable order, so a caller can show
//! all problems at once or decide to re-assemble.

use crate::catalog::{BlockCatalog, Format};
use crate::structure::PromptStructure;
use crate::text;
use serde::Serialize;
use std::fmt;

pub const MIN_PARAGRAPHS: usize = 6;
pub const MAX_PARAGRAPHS: usize = 8;
pub const MIN_REFERENCES: usize = 2;
pub const MAX_REFERENCES: usize = 3;
pub const MIN_PURE_PARAGRAPHS: usize = 2;
pub const MIN_SIMPLE_PAIR_PARAGRAPHS: usize = 1;
pub const MIN_COMPLEX_PAIR_PARAGRAPHS: usize = 3;
pub const MERGED_PERCENT_MIN: usize = 30;
pub const MERGED_PERCENT_MAX: usize = 40;

/// Named constraint checked by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    ParagraphCount,
    ParagraphReferences,
    UnknownBlock,
    SimpleCoverage,
    ComplexCoverage,
    PureReferenceParagraphs,
    TwoReferenceParagraph,
    DistinctComplexPairs,
    FormatRatio,
    FormatNotAllowed,
    MissingExplanation,
    MarkupResidue,
    BlockTokenResidue,
    ToolNameResidue,
    PersonaRepeated,
    MustIncludeMissing,
    VerbatimMissing,
    DocumentTooShort,
}

impl Constraint {
    pub fn name(self) -> &'static str {
        match self {
            Self::ParagraphCount => "paragraph_count",
            Self::ParagraphReferences => "paragraph_references",
            Self::UnknownBlock => "unknown_block",
            Self::SimpleCoverage => "simple_coverage",
            Self::ComplexCoverage => "complex_coverage",
            Self::PureReferenceParagraphs => "pure_reference_paragraphs",
            Self::TwoReferenceParagraph => "two_reference_paragraph",
            Self::DistinctComplexPairs => "distinct_complex_pairs",
            Self::FormatRatio => "format_ratio",
            Self::FormatNotAllowed => "format_not_allowed",
            Self::MissingExplanation => "missing_explanation",
            Self::MarkupResidue => "markup_residue",
            Self::BlockTokenResidue => "block_token_residue",
            Self::ToolNameResidue => "tool_name_residue",
            Self::PersonaRepeated => "persona_repeated",
            Self::MustIncludeMissing => "must_include_missing",
            Self::VerbatimMissing => "verbatim_missing",
            Self::DocumentTooShort => "document_too_short",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub constraint: Constraint,
    pub detail: String,
}

impl Violation {
    pub fn new(constraint: Constraint, detail: impl Into<String>) -> Self {
        Self {
            constraint,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.constraint, self.detail)
    }
}

/// Inclusive range of merged occurrences allowed for `total` complex blocks.
///
/// The lower bound rounds down and the upper bound rounds up, so seven
/// occurrences accept two or three merged.
pub fn merged_band(total: usize) -> (usize, usize) {
    let lo = total * MERGED_PERCENT_MIN / 100;
    let hi = (total * MERGED_PERCENT_MAX).div_ceil(100);
    (lo, hi)
}

/// Check a structure against every pre-population invariant.
pub fn validate_structure(structure: &PromptStructure, catalog: &BlockCatalog) -> Vec<Violation> {
    let mut violations = Vec::new();
    let paragraphs = &structure.paragraphs;

    if !(MIN_PARAGRAPHS..=MAX_PARAGRAPHS).contains(&paragraphs.len()) {
        violations.push(Violation::new(
            Constraint::ParagraphCount,
            format!(
                "{} paragraphs (should be {MIN_PARAGRAPHS}-{MAX_PARAGRAPHS})",
                paragraphs.len()
            ),
        ));
    }

    for (i, paragraph) in paragraphs.iter().enumerate() {
        let refs = paragraph.reference_count();
        if !(MIN_REFERENCES..=MAX_REFERENCES).contains(&refs) {
            violations.push(Violation::new(
                Constraint::ParagraphReferences,
                format!(
                    "paragraph {} has {refs} block references (should be {MIN_REFERENCES}-{MAX_REFERENCES})",
                    i + 1
                ),
            ));
        }
    }

    let mut unknown: Vec<String> = Vec::new();
    for occ in paragraphs.iter().flat_map(|p| p.blocks()) {
        if catalog.simple(occ.block).is_none() {
            unknown.push(format!("[{}]", occ.block.id()));
        }
        if let Some(overlay) = &occ.complex
            && catalog.complex(overlay.block).is_none()
        {
            unknown.push(format!("#{}#", overlay.block.name()));
        }
    }
    if !unknown.is_empty() {
        unknown.dedup();
        violations.push(Violation::new(
            Constraint::UnknownBlock,
            format!("blocks not in catalog: {}", unknown.join(", ")),
        ));
    }

    let missing_simple: Vec<&str> = catalog
        .simple_blocks()
        .filter(|b| structure.count_simple(*b) == 0)
        .map(|b| b.id())
        .collect();
    if !missing_simple.is_empty() {
        violations.push(Violation::new(
            Constraint::SimpleCoverage,
            format!("missing building blocks: {}", missing_simple.join(", ")),
        ));
    }

    let mut missing_complex = Vec::new();
    let mut repeated_complex = Vec::new();
    for block in catalog.complex_blocks() {
        match structure.count_complex(block) {
            0 => missing_complex.push(block.name()),
            1 => {}
            n => repeated_complex.push(format!("{} (x{n})", block.name())),
        }
    }
    if !missing_complex.is_empty() {
        violations.push(Violation::new(
            Constraint::ComplexCoverage,
            format!(
                "missing complex blocks ({}/{} missing): {}",
                missing_complex.len(),
                catalog.complex_defs().len(),
                missing_complex.join(", ")
            ),
        ));
    }
    if !repeated_complex.is_empty() {
        violations.push(Violation::new(
            Constraint::ComplexCoverage,
            format!(
                "complex blocks used more than once: {}",
                repeated_complex.join(", ")
            ),
        ));
    }

    let pure = paragraphs.iter().filter(|p| p.is_pure_reference()).count();
    if pure < MIN_PURE_PARAGRAPHS {
        violations.push(Violation::new(
            Constraint::PureReferenceParagraphs,
            format!("{pure} pure-reference paragraphs (need at least {MIN_PURE_PARAGRAPHS})"),
        ));
    }

    let pairs = paragraphs.iter().filter(|p| p.is_simple_pair()).count();
    if pairs < MIN_SIMPLE_PAIR_PARAGRAPHS {
        violations.push(Violation::new(
            Constraint::TwoReferenceParagraph,
            "no paragraph consists of exactly two building-block references",
        ));
    }

    let complex_pairs = paragraphs
        .iter()
        .filter(|p| p.distinct_complex_count() >= 2)
        .count();
    if complex_pairs < MIN_COMPLEX_PAIR_PARAGRAPHS {
        violations.push(Violation::new(
            Constraint::DistinctComplexPairs,
            format!(
                "only {complex_pairs} paragraphs have 2+ distinct complex blocks (need at least {MIN_COMPLEX_PAIR_PARAGRAPHS})"
            ),
        ));
    }

    let total = structure.complex_overlays().count();
    let merged = structure.merged_count();
    let (lo, hi) = merged_band(total);
    if total > 0 && !(lo..=hi).contains(&merged) {
        violations.push(Violation::new(
            Constraint::FormatRatio,
            format!(
                "{merged} of {total} complex blocks merged (should be {lo}-{hi}, {MERGED_PERCENT_MIN}-{MERGED_PERCENT_MAX}%)"
            ),
        ));
    }

    for (i, paragraph) in paragraphs.iter().enumerate() {
        for overlay in paragraph.complex_overlays() {
            if let Some(def) = catalog.complex(overlay.block)
                && !def.allows(overlay.format)
            {
                violations.push(Violation::new(
                    Constraint::FormatNotAllowed,
                    format!(
                        "paragraph {}: #{}# does not allow the {:?} format",
                        i + 1,
                        overlay.block.name(),
                        overlay.format
                    ),
                ));
            }
        }
    }

    for (i, paragraph) in paragraphs.iter().enumerate() {
        if paragraph.is_pure_reference() {
            continue;
        }
        for occ in paragraph.blocks() {
            if occ.explanation.is_none() {
                violations.push(Violation::new(
                    Constraint::MissingExplanation,
                    format!(
                        "paragraph {}: [{}] has no explanation",
                        i + 1,
                        occ.block.id()
                    ),
                ));
            }
            if let Some(overlay) = &occ.complex
                && overlay.format == Format::Separate
                && overlay.explanation.is_none()
            {
                violations.push(Violation::new(
                    Constraint::MissingExplanation,
                    format!(
                        "paragraph {}: #{}# has no separate explanation",
                        i + 1,
                        overlay.block.name()
                    ),
                ));
            }
        }
    }

    violations
}

/// What a populated document is checked against.
#[derive(Debug, Clone, Default)]
pub struct DocumentExpectations {
    /// Verbatim span texts that must appear.
    pub verbatim: Vec<String>,
    pub must_include: Option<String>,
    pub persona: Option<String>,
    pub tool_names: Vec<String>,
    /// Block identifiers that must not appear.
    pub block_tokens: Vec<String>,
    pub min_chars: Option<usize>,
}

impl DocumentExpectations {
    /// Expectations for a document populated from `structure`.
    pub fn for_structure(structure: &PromptStructure, catalog: &BlockCatalog) -> Self {
        Self {
            verbatim: structure.verbatim_spans().map(|s| s.text.clone()).collect(),
            block_tokens: catalog.block_tokens(),
            ..Default::default()
        }
    }
}

/// Check a populated document against every output invariant.
pub fn validate_document(document: &str, expect: &DocumentExpectations) -> Vec<Violation> {
    let mut violations = Vec::new();

    let markup = text::markup_tokens_in(document);
    if !markup.is_empty() {
        violations.push(Violation::new(
            Constraint::MarkupResidue,
            format!("markup tokens remain: {}", markup.join(" ")),
        ));
    }

    let blocks: Vec<&str> = expect
        .block_tokens
        .iter()
        .filter(|t| !t.is_empty() && document.contains(t.as_str()))
        .map(String::as_str)
        .collect();
    if !blocks.is_empty() {
        violations.push(Violation::new(
            Constraint::BlockTokenResidue,
            format!("block identifiers remain: {}", blocks.join(", ")),
        ));
    }

    let tools = leaked_tool_names(document, &expect.tool_names);
    if !tools.is_empty() {
        violations.push(Violation::new(
            Constraint::ToolNameResidue,
            format!("tool names remain: {}", tools.join(", ")),
        ));
    }

    if let Some(name) = expect.persona.as_deref()
        && let Some(pattern) = text::persona_pattern(name)
    {
        let mentions = pattern.find_iter(document).count();
        if mentions > 1 {
            violations.push(Violation::new(
                Constraint::PersonaRepeated,
                format!("persona name '{}' appears {mentions} times", name.trim()),
            ));
        }
    }

    if let Some(must) = expect.must_include.as_deref()
        && !must.trim().is_empty()
        && !document.contains(must.trim())
    {
        violations.push(Violation::new(
            Constraint::MustIncludeMissing,
            format!("required text not found: {}", must.trim()),
        ));
    }

    for span in &expect.verbatim {
        if !text::contains_span(document, span) {
            violations.push(Violation::new(
                Constraint::VerbatimMissing,
                format!("verbatim span not found: {}", span.trim()),
            ));
        }
    }

    if let Some(min) = expect.min_chars {
        let len = document.chars().count();
        if len < min {
            violations.push(Violation::new(
                Constraint::DocumentTooShort,
                format!("document has {len} characters (expected at least {min})"),
            ));
        }
    }

    violations
}

/// Tool names occurring anywhere in `document`, compared case-insensitively.
pub fn leaked_tool_names(document: &str, tool_names: &[String]) -> Vec<String> {
    let lower = document.to_lowercase();
    tool_names
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && lower.contains(&t.to_lowercase()))
        .map(str::to_string)
        .collect()
}
