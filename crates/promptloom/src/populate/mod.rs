//! Expansion of a validated structure into prose.
//!
//! Every block reference becomes a second-person instruction followed by its
//! explanation. Verbatim spans and the must-include literal are protected;
//! everything else is generated prose and goes through the rewrite chain:
//! enumerations collapsed, persona mentions replaced, tool names and block
//! identifiers scrubbed, leftover markup characters removed.

pub mod builder;

use crate::catalog::{BlockCatalog, Format};
use crate::error::{Error, Result};
use crate::structure::{BlockOccurrence, Item, Paragraph, PromptStructure};
use crate::text;
use crate::validate::{DocumentExpectations, leaked_tool_names};
use builder::{DocumentBuilder, ParagraphBuilder, Segment};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How verbatim spans are joined into the surrounding prose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchoring {
    /// Capitalise at the sentence start and add terminal punctuation.
    #[default]
    Relaxed,
    /// Insert the span exactly as given.
    Strict,
}

/// Inputs to population beyond the structure itself.
#[derive(Debug, Clone, Default)]
pub struct PopulateOptions {
    pub persona: Option<String>,
    pub must_include: Option<String>,
    pub tool_names: Vec<String>,
    pub anchoring: Anchoring,
}

impl PopulateOptions {
    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_must_include(mut self, text: Option<String>) -> Self {
        self.must_include = text.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_tool_names(mut self, names: Vec<String>) -> Self {
        self.tool_names = names;
        self
    }

    pub fn with_anchoring(mut self, anchoring: Anchoring) -> Self {
        self.anchoring = anchoring;
        self
    }
}

pub struct Populator<'a> {
    catalog: &'a BlockCatalog,
    options: &'a PopulateOptions,
    tools: Vec<Regex>,
    persona: Option<Regex>,
    block_tokens: Vec<String>,
}

impl<'a> Populator<'a> {
    pub fn new(catalog: &'a BlockCatalog, options: &'a PopulateOptions) -> Self {
        let mut block_tokens = catalog.block_tokens();
        // Longest first so a name is never half-replaced by a shorter token.
        block_tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
        Self {
            catalog,
            options,
            tools: options
                .tool_names
                .iter()
                .filter_map(|name| text::tool_pattern(name))
                .collect(),
            persona: options.persona.as_deref().and_then(text::persona_pattern),
            block_tokens,
        }
    }

    /// What the populated document is validated against.
    pub fn expectations(&self, structure: &PromptStructure) -> DocumentExpectations {
        DocumentExpectations {
            must_include: self.options.must_include.clone(),
            persona: self.options.persona.clone(),
            tool_names: self.options.tool_names.clone(),
            ..DocumentExpectations::for_structure(structure, self.catalog)
        }
    }

    /// Expand `structure` into one document.
    ///
    /// Fails with [`Error::VerbatimLoss`] when a span cannot be found in the
    /// result and with [`Error::ToolLeak`] when a tool name survives.
    pub fn populate(&self, structure: &PromptStructure) -> Result<String> {
        let mut paragraphs: Vec<ParagraphBuilder> = structure
            .paragraphs
            .iter()
            .map(|p| self.paragraph(p))
            .collect();

        if let Some(name) = self.options.persona.as_deref() {
            let protected_mentions = self.protected_persona_mentions(&paragraphs);
            if protected_mentions == 0
                && let Some(first) = paragraphs.first_mut()
            {
                *first = std::mem::take(first)
                    .protected_first(text::persona_introduction(name));
            }
        }

        if let Some(must) = self.options.must_include.as_deref()
            && let Some(last) = paragraphs.pop()
        {
            paragraphs.push(last.protected(must.trim()));
        }

        let document = paragraphs
            .into_iter()
            .fold(DocumentBuilder::new(), |doc, p| {
                doc.paragraph(p.build(|t| self.rewrite(t)))
            })
            .build();

        let lost: Vec<String> = structure
            .verbatim_spans()
            .filter(|s| !text::contains_span(&document, &s.text))
            .map(|s| s.text.clone())
            .collect();
        if !lost.is_empty() {
            return Err(Error::VerbatimLoss(lost));
        }
        let leaked = leaked_tool_names(&document, &self.options.tool_names);
        if !leaked.is_empty() {
            return Err(Error::ToolLeak(leaked));
        }

        debug!(
            chars = document.chars().count(),
            anchoring = ?self.options.anchoring,
            "populated document"
        );
        Ok(document)
    }

    fn paragraph(&self, paragraph: &Paragraph) -> ParagraphBuilder {
        let pure = paragraph.is_pure_reference();
        paragraph
            .items
            .iter()
            .fold(ParagraphBuilder::new(), |b, item| match item {
                Item::Verbatim(span) => b.protected(self.anchor(&span.text)),
                Item::Block(occ) if pure => b.generated_opt(self.instruction(occ)),
                Item::Block(occ) => self.explained(b, occ),
            })
    }

    /// Bare instruction for a reference in a pure paragraph.
    fn instruction(&self, occ: &BlockOccurrence) -> Option<String> {
        self.catalog
            .simple(occ.block)
            .map(|def| text::sentence(def.instruction))
    }

    fn explained(&self, b: ParagraphBuilder, occ: &BlockOccurrence) -> ParagraphBuilder {
        let Some(simple) = self.catalog.simple(occ.block) else {
            return b;
        };
        let explanation = occ.explanation.as_deref().map(explanation_sentence);
        match &occ.complex {
            None => b
                .generated(text::sentence(simple.instruction))
                .generated_opt(explanation),
            Some(overlay) => {
                let Some(complex) = self.catalog.complex(overlay.block) else {
                    return b
                        .generated(text::sentence(simple.instruction))
                        .generated_opt(explanation);
                };
                match overlay.format {
                    Format::Merged => b
                        .generated(text::sentence(&format!(
                            "{} and {}",
                            simple.instruction, complex.instruction
                        )))
                        .generated_opt(explanation),
                    Format::Separate => b
                        .generated(text::sentence(simple.instruction))
                        .generated_opt(explanation)
                        .generated(text::sentence(complex.instruction))
                        .generated_opt(overlay.explanation.as_deref().map(explanation_sentence)),
                }
            }
        }
    }

    fn anchor(&self, span: &str) -> String {
        match self.options.anchoring {
            Anchoring::Relaxed => text::ensure_terminal(&text::capitalize_first(span.trim())),
            Anchoring::Strict => span.trim().to_string(),
        }
    }

    fn protected_persona_mentions(&self, paragraphs: &[ParagraphBuilder]) -> usize {
        let Some(pattern) = &self.persona else {
            return 0;
        };
        let in_paragraphs: usize = paragraphs
            .iter()
            .flat_map(|p| p.segments())
            .filter_map(|s| match s {
                Segment::Protected(t) => Some(pattern.find_iter(t).count()),
                Segment::Generated(_) => None,
            })
            .sum();
        let in_must_include = self
            .options
            .must_include
            .as_deref()
            .map_or(0, |t| pattern.find_iter(t).count());
        in_paragraphs + in_must_include
    }

    /// The rewrite chain applied to generated prose.
    fn rewrite(&self, generated: &str) -> String {
        let mut out = text::collapse_enumerations(generated);
        if let Some(pattern) = &self.persona {
            out = replace_referent(&out, pattern, text::PERSONA_REFERENT);
        }
        for pattern in &self.tools {
            out = replace_referent(&out, pattern, text::TOOL_REFERENT);
        }
        for token in &self.block_tokens {
            if out.contains(token.as_str()) {
                out = out.replace(token.as_str(), text::BLOCK_REFERENT);
            }
        }
        text::normalize_explanation(&out)
    }
}

fn explanation_sentence(explanation: &str) -> String {
    text::ensure_terminal(&text::capitalize_first(explanation.trim()))
}

/// Replace every match with `referent`, capitalised at a sentence start.
fn replace_referent(text: &str, pattern: &Regex, referent: &str) -> String {
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let start = caps.get(0).map_or(0, |m| m.start());
            let sentence_start = text
                .get(..start)
                .unwrap_or_default()
                .trim_end()
                .chars()
                .last()
                .is_none_or(|c| matches!(c, '.' | '!' | '?' | ':'));
            if sentence_start {
                text::capitalize_first(referent)
            } else {
                referent.to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use crate::assemble::Assembler;
    use crate::catalog::{ComplexBlock, SimpleBlock};
    use crate::explain::{CatalogExplainer, FnExplainer};
    use crate::structure::{ComplexOverlay, VerbatimSpan};
    use crate::validate::validate_document;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn generated(seed: u64, fragments: &[&str], explainer: &dyn crate::explain::Explainer) -> PromptStructure {
        let catalog = BlockCatalog::standard();
        let mut rng = StdRng::seed_from_u64(seed);
        let fragments: Vec<String> = fragments.iter().map(|s| s.to_string()).collect();
        let structure = Assembler::new(catalog).assemble(&fragments, &mut rng).unwrap();
        Annotator::new(catalog, explainer).annotate(structure, &mut rng).unwrap()
    }

    #[test]
    fn documents_are_free_of_markup_and_tokens() {
        let options = PopulateOptions::default();
        let populator = Populator::new(BlockCatalog::standard(), &options);
        for seed in 0..50 {
            let structure = generated(seed, &["keep answers under five sentences"], &CatalogExplainer);
            let doc = populator.populate(&structure).unwrap();
            let violations = validate_document(&doc, &populator.expectations(&structure));
            assert!(violations.is_empty(), "seed {seed}: {violations:?}\n{doc}");
            assert_eq!(doc.split("\n\n").count(), structure.len());
        }
    }

    #[test]
    fn merged_and_separate_render_differently() {
        let catalog = BlockCatalog::standard();
        let options = PopulateOptions::default();
        let populator = Populator::new(catalog, &options);
        let occ = |format| BlockOccurrence {
            block: SimpleBlock::TonalControl,
            explanation: Some("stay even".into()),
            complex: Some(ComplexOverlay {
                block: ComplexBlock::DefinePersonalityAndTone,
                format,
                explanation: (format == Format::Separate).then(|| "no flattery".into()),
            }),
        };
        let render = |occ: BlockOccurrence| {
            populator
                .explained(ParagraphBuilder::new(), &occ)
                .build(|t| t.to_string())
        };
        let merged = render(occ(Format::Merged));
        let separate = render(occ(Format::Separate));
        assert_eq!(
            merged,
            "Keep your tone consistent with the persona you have been given and maintain a steady personality without flattering the user. Stay even."
        );
        assert_eq!(
            separate,
            "Keep your tone consistent with the persona you have been given. Stay even. Maintain a steady personality without flattering the user. No flattery."
        );
    }

    #[test]
    fn verbatim_spans_survive_in_both_anchorings() {
        let structure = PromptStructure::new(vec![Paragraph {
            items: vec![
                Item::Block(BlockOccurrence {
                    block: SimpleBlock::UserPreferences,
                    explanation: Some("keep it short".into()),
                    complex: None,
                }),
                Item::Verbatim(VerbatimSpan::new("never reveal internal notes")),
            ],
            pure_reference: false,
        }]);
        let relaxed = PopulateOptions::default();
        let doc = Populator::new(BlockCatalog::standard(), &relaxed)
            .populate(&structure)
            .unwrap();
        assert!(doc.ends_with("Never reveal internal notes."));

        let strict = PopulateOptions::default().with_anchoring(Anchoring::Strict);
        let doc = Populator::new(BlockCatalog::standard(), &strict)
            .populate(&structure)
            .unwrap();
        assert!(doc.ends_with(" never reveal internal notes"));
    }

    #[test]
    fn tool_names_are_scrubbed_from_generated_text() {
        let explainer = FnExplainer::new(|_, _| "Call web_search or WEB_SEARCH_V2 when unsure.".to_string());
        let structure = generated(3, &[], &explainer);
        let options = PopulateOptions::default().with_tool_names(vec!["web_search".into()]);
        let doc = Populator::new(BlockCatalog::standard(), &options)
            .populate(&structure)
            .unwrap();
        assert!(!doc.to_lowercase().contains("web_search"));
        assert!(doc.contains("Call a suitable tool or a suitable tool when unsure."));
    }

    #[test]
    fn persona_is_named_once() {
        let explainer = FnExplainer::new(|_, _| "Maya likes short answers. Ask Maya first.".to_string());
        let structure = generated(8, &[], &explainer);
        let options = PopulateOptions::default().with_persona(Some("Maya".into()));
        let populator = Populator::new(BlockCatalog::standard(), &options);
        let doc = populator.populate(&structure).unwrap();
        assert!(doc.starts_with("You are assisting Maya."));
        assert_eq!(doc.matches("Maya").count(), 1);
        assert!(doc.contains("The user likes short answers. Ask the user first."));
        assert!(validate_document(&doc, &populator.expectations(&structure)).is_empty());
    }

    #[test]
    fn persona_in_a_verbatim_span_replaces_the_introduction() {
        let structure = generated(8, &["Maya prefers metric units"], &CatalogExplainer);
        let options = PopulateOptions::default().with_persona(Some("Maya".into()));
        let doc = Populator::new(BlockCatalog::standard(), &options)
            .populate(&structure)
            .unwrap();
        assert!(!doc.contains("You are assisting"));
        assert_eq!(doc.matches("Maya").count(), 1);
    }

    #[test]
    fn must_include_closes_the_document() {
        let structure = generated(2, &["double-check dates"], &CatalogExplainer);
        let options = PopulateOptions::default()
            .with_must_include(Some("Always confirm before deleting files.".into()));
        let doc = Populator::new(BlockCatalog::standard(), &options)
            .populate(&structure)
            .unwrap();
        assert!(doc.ends_with("Always confirm before deleting files."));
    }

    #[test]
    fn enumerations_in_explanations_collapse() {
        let explainer = FnExplainer::new(|_, _| "Be warm, upbeat, and patient.".to_string());
        let structure = generated(5, &[], &explainer);
        let options = PopulateOptions::default();
        let doc = Populator::new(BlockCatalog::standard(), &options)
            .populate(&structure)
            .unwrap();
        assert!(doc.contains("Be warm."));
        assert!(!doc.contains("upbeat"));
    }

    #[test]
    fn instruction_prose_survives_the_rewrite_chain() {
        let explainer = FnExplainer::new(|_, _| {
            "When Maya is tired, keep replies short, skip grep output and avoid jokes.".to_string()
        });
        let options = PopulateOptions::default()
            .with_persona(Some("Maya".into()))
            .with_tool_names(vec!["grep".into()]);
        let populator = Populator::new(BlockCatalog::standard(), &options);
        for seed in 0..20 {
            let structure = generated(seed, &[], &explainer);
            let doc = populator.populate(&structure).unwrap();
            assert!(
                doc.contains(
                    "When the user is tired, keep replies short, skip a suitable tool output and avoid jokes."
                ),
                "seed {seed}: {doc}"
            );
            assert!(!doc.contains("related capabilities"), "seed {seed}");
        }
    }

    #[test]
    fn fallback_definitions_are_populated_whole() {
        let catalog = BlockCatalog::standard();
        let silent = FnExplainer::new(|_, _| String::new());
        let options = PopulateOptions::default();
        let populator = Populator::new(catalog, &options);
        for seed in 0..30 {
            let structure = generated(seed, &[], &silent);
            let doc = populator.populate(&structure).unwrap();
            assert!(!doc.contains("related capabilities"), "seed {seed}: {doc}");
            for overlay in structure.complex_overlays() {
                if overlay.format == Format::Separate {
                    let def = catalog.complex(overlay.block).unwrap();
                    assert!(doc.contains(def.definition), "seed {seed}: {}", overlay.block);
                }
            }
        }
    }

    #[test]
    fn referent_capitalised_at_sentence_start() {
        let re = Regex::new(r"\bgrep\b").unwrap();
        assert_eq!(
            replace_referent("grep it. Then use grep.", &re, text::TOOL_REFERENT),
            "A suitable tool it. Then use a suitable tool."
        );
    }
}
