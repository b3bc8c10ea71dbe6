//! Structural markup: rendering and parsing.
//!
//! ```text
//! [CONTEXT_INFORMATION#Provide_Context_Information] (merged explanation)
//! [USER_PREFERENCES] (host explanation) #Set Clear Guardrails# (own explanation)
//! __verbatim text__
//! ```
//!
//! Paragraphs are separated by blank lines. A paragraph holding only the
//! words "You are" is a header some generators emit and is skipped.

use crate::catalog::{BlockCatalog, ComplexBlock, Format, SimpleBlock};
use crate::error::{Error, Result};
use crate::structure::{BlockOccurrence, ComplexOverlay, Item, Paragraph, PromptStructure, VerbatimSpan};

// ── Rendering ──────────────────────────────────────────────────────

pub fn render_markup(structure: &PromptStructure) -> String {
    structure
        .paragraphs
        .iter()
        .map(render_paragraph)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_paragraph(paragraph: &Paragraph) -> String {
    let mut tokens: Vec<String> = Vec::new();
    for item in &paragraph.items {
        match item {
            Item::Verbatim(span) => tokens.push(format!("__{}__", span.text)),
            Item::Block(occ) => {
                match &occ.complex {
                    Some(overlay) if overlay.format == Format::Merged => {
                        tokens.push(format!("[{}#{}]", occ.block.id(), overlay.block.token()));
                    }
                    _ => tokens.push(format!("[{}]", occ.block.id())),
                }
                if let Some(explanation) = &occ.explanation {
                    tokens.push(format!("({explanation})"));
                }
                if let Some(overlay) = &occ.complex
                    && overlay.format == Format::Separate
                {
                    tokens.push(format!("#{}#", overlay.block.name()));
                    if let Some(explanation) = &overlay.explanation {
                        tokens.push(format!("({explanation})"));
                    }
                }
            }
        }
    }
    tokens.join(" ")
}

// ── Parsing ────────────────────────────────────────────────────────

/// Parse markup text into a structure.
///
/// Pure-reference designation is derived from each paragraph's content.
/// The result is not validated; run it through the validator.
pub fn parse_markup(input: &str, catalog: &BlockCatalog) -> Result<PromptStructure> {
    let mut paragraphs = Vec::new();
    for (line, text) in split_paragraphs(input) {
        if is_header(&text) {
            continue;
        }
        let mut paragraph = Parser::new(&text, line, catalog).paragraph()?;
        paragraph.pure_reference = paragraph.is_pure_reference();
        paragraphs.push(paragraph);
    }
    Ok(PromptStructure::new(paragraphs))
}

/// Blank-line separated chunks with the 1-based line each starts on.
fn split_paragraphs(input: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0;
    for (i, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push((start, current.join("\n")));
                current.clear();
            }
            continue;
        }
        if current.is_empty() {
            start = i + 1;
        }
        current.push(line);
    }
    if !current.is_empty() {
        out.push((start, current.join("\n")));
    }
    out
}

fn is_header(text: &str) -> bool {
    text.trim()
        .trim_end_matches([':', '.', ','])
        .eq_ignore_ascii_case("you are")
}

/// What the next `( … )` attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    None,
    Host,
    Overlay,
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    catalog: &'a BlockCatalog,
}

impl<'a> Parser<'a> {
    fn new(text: &str, line: usize, catalog: &'a BlockCatalog) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line,
            catalog,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Markup {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Consume up to (and including) `close`, returning what came before.
    fn until(&mut self, close: &str, what: &str) -> Result<String> {
        let start_line = self.line;
        let mut out = String::new();
        loop {
            if self.starts_with(close) {
                for _ in close.chars() {
                    self.bump();
                }
                return Ok(out);
            }
            match self.bump() {
                Some(c) => out.push(c),
                None => {
                    return Err(Error::Markup {
                        line: start_line,
                        message: format!("unterminated {what}"),
                    });
                }
            }
        }
    }

    /// Balanced parentheses; the opening `(` is already consumed.
    fn explanation(&mut self) -> Result<String> {
        let start_line = self.line;
        let mut depth = 1usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out.split_whitespace().collect::<Vec<_>>().join(" "));
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        Err(Error::Markup {
            line: start_line,
            message: "unterminated explanation".into(),
        })
    }

    fn simple(&self, id: &str) -> Result<SimpleBlock> {
        let id = id.trim();
        SimpleBlock::from_id(id)
            .filter(|b| self.catalog.simple(*b).is_some())
            .ok_or_else(|| self.error(format!("unknown building block [{id}]")))
    }

    fn complex(&self, name: &str) -> Result<ComplexBlock> {
        let name = name.trim();
        ComplexBlock::from_name(name)
            .filter(|b| self.catalog.complex(*b).is_some())
            .ok_or_else(|| self.error(format!("unknown complex block '{name}'")))
    }

    fn paragraph(mut self) -> Result<Paragraph> {
        let mut items: Vec<Item> = Vec::new();
        let mut anchor = Anchor::None;

        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if self.starts_with("__") {
                self.pos += 2;
                let text = self.until("__", "verbatim span")?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(self.error("empty verbatim span"));
                }
                items.push(Item::Verbatim(VerbatimSpan::new(text)));
                anchor = Anchor::None;
                continue;
            }
            match c {
                '[' => {
                    self.bump();
                    let inner = self.until("]", "block reference")?;
                    let occ = match inner.split_once('#') {
                        Some((id, name)) => BlockOccurrence {
                            block: self.simple(id)?,
                            explanation: None,
                            complex: Some(ComplexOverlay {
                                block: self.complex(name)?,
                                format: Format::Merged,
                                explanation: None,
                            }),
                        },
                        None => BlockOccurrence::reference(self.simple(&inner)?),
                    };
                    items.push(Item::Block(occ));
                    anchor = Anchor::Host;
                }
                '#' => {
                    self.bump();
                    let name = self.until("#", "complex block name")?;
                    let block = self.complex(&name)?;
                    match items.last_mut() {
                        Some(Item::Block(occ)) if occ.complex.is_none() => {
                            occ.complex = Some(ComplexOverlay {
                                block,
                                format: Format::Separate,
                                explanation: None,
                            });
                        }
                        _ => {
                            return Err(self.error(format!(
                                "#{}# must follow a building block without a complex block",
                                block.name()
                            )));
                        }
                    }
                    anchor = Anchor::Overlay;
                }
                '(' => {
                    self.bump();
                    let text = self.explanation()?;
                    let slot = match (anchor, items.last_mut()) {
                        (Anchor::Host, Some(Item::Block(occ))) => &mut occ.explanation,
                        (Anchor::Overlay, Some(Item::Block(occ))) => match occ.complex.as_mut() {
                            Some(overlay) => &mut overlay.explanation,
                            None => return Err(self.error("explanation with no preceding block")),
                        },
                        _ => return Err(self.error("explanation with no preceding block")),
                    };
                    if slot.is_some() {
                        return Err(self.error("block already has an explanation"));
                    }
                    *slot = Some(text);
                    anchor = Anchor::None;
                }
                other => {
                    return Err(self.error(format!("unexpected character '{other}'")));
                }
            }
        }
        Ok(Paragraph {
            items,
            pure_reference: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{Annotator, enrich_context};
    use crate::assemble::Assembler;
    use crate::explain::CatalogExplainer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SAMPLE: &str = "You are

[CONTEXT_INFORMATION] [TONAL_CONTROL]

[TONAL_CONTROL#Define_Personality_and_Tone] (Stay even and never flatter.) __keep replies short__
[USER_PREFERENCES] (Respect the stated format.) #Set Clear Guardrails# (Refuse harmful requests (politely).)";

    #[test]
    fn parses_all_token_kinds() {
        let structure = parse_markup(SAMPLE, BlockCatalog::standard()).unwrap();
        assert_eq!(structure.len(), 2);
        assert!(structure.paragraphs[0].pure_reference);
        assert!(structure.paragraphs[0].is_simple_pair());

        let second = &structure.paragraphs[1];
        assert!(!second.pure_reference);
        assert_eq!(second.items.len(), 3);
        let blocks: Vec<&BlockOccurrence> = second.blocks().collect();
        let merged = blocks[0].complex.as_ref().unwrap();
        assert_eq!(merged.block, ComplexBlock::DefinePersonalityAndTone);
        assert_eq!(merged.format, Format::Merged);
        assert_eq!(blocks[0].explanation.as_deref(), Some("Stay even and never flatter."));
        let separate = blocks[1].complex.as_ref().unwrap();
        assert_eq!(separate.format, Format::Separate);
        assert_eq!(
            separate.explanation.as_deref(),
            Some("Refuse harmful requests (politely).")
        );
        assert_eq!(
            second.verbatim_spans().next().map(|s| s.text.as_str()),
            Some("keep replies short")
        );
    }

    #[test]
    fn generated_structures_round_trip() {
        let catalog = BlockCatalog::standard();
        for seed in 0..40 {
            let mut rng = StdRng::seed_from_u64(seed);
            let structure = Assembler::new(catalog)
                .assemble(&["cite sources when asked".into(), "it's fine to say you don't know".into()], &mut rng)
                .unwrap();
            let mut structure = Annotator::new(catalog, &CatalogExplainer)
                .annotate(structure, &mut rng)
                .unwrap();
            enrich_context(&mut structure, &["it is late evening".into(), "the phone is on silent".into()]).unwrap();
            let markup = render_markup(&structure);
            let parsed = parse_markup(&markup, catalog).unwrap();
            assert_eq!(parsed, structure, "seed {seed}\n{markup}");
        }
    }

    #[test]
    fn unknown_ids_report_their_line() {
        let err = parse_markup("[TONAL_CONTROL] [USER_PREFERENCES]\n\n[TONAL_CONTROL]\n[MOOD_RING]", BlockCatalog::standard())
            .unwrap_err();
        match err {
            Error::Markup { line, message } => {
                assert_eq!(line, 4);
                assert!(message.contains("MOOD_RING"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_complex_name_rejected() {
        let err = parse_markup("[TONAL_CONTROL#Be_Nice]", BlockCatalog::standard()).unwrap_err();
        assert!(matches!(err, Error::Markup { line: 1, .. }));
    }

    #[test]
    fn dangling_tokens_rejected() {
        for bad in [
            "[TONAL_CONTROL",
            "__never closed",
            "[TONAL_CONTROL] (open",
            "(orphan explanation)",
            "#Set Clear Guardrails#",
            "[TONAL_CONTROL] (one) (two)",
            "[TONAL_CONTROL] stray words",
        ] {
            let err = parse_markup(bad, BlockCatalog::standard()).unwrap_err();
            assert!(matches!(err, Error::Markup { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn blocks_missing_from_a_custom_catalog_are_unknown() {
        let catalog = BlockCatalog::subset(&[SimpleBlock::TonalControl], &[]);
        assert!(parse_markup("[USER_PREFERENCES]", &catalog).is_err());
        assert!(parse_markup("[TONAL_CONTROL]", &catalog).is_ok());
    }

    #[test]
    fn renders_separate_and_merged_forms() {
        let paragraph = Paragraph {
            items: vec![
                Item::Block(BlockOccurrence {
                    block: SimpleBlock::ToolUseInstructions,
                    explanation: Some("act only when asked".into()),
                    complex: Some(ComplexOverlay {
                        block: ComplexBlock::GuideToolUseAndFormatting,
                        format: Format::Merged,
                        explanation: None,
                    }),
                }),
                Item::Block(BlockOccurrence {
                    block: SimpleBlock::BackgroundInformation,
                    explanation: Some("mind the project".into()),
                    complex: Some(ComplexOverlay {
                        block: ComplexBlock::AdaptToTaskComplexity,
                        format: Format::Separate,
                        explanation: Some("scale depth".into()),
                    }),
                }),
            ],
            pure_reference: false,
        };
        assert_eq!(
            render_markup(&PromptStructure::new(vec![paragraph])),
            "[TOOL_USE_INSTRUCTIONS#Guide_Tool_Use_and_Response_Formatting] (act only when asked) \
             [BACKGROUND_INFORMATION] (mind the project) #Adapt to Task Complexity# (scale depth)"
        );
    }
}
