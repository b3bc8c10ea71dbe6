//! Complex-block overlay and explanations.
//!
//! The annotator places every complex block of the catalog on an existing
//! building-block occurrence, picks the merged or separate rendering, and
//! fills in the explanations of every block in a content paragraph.

use crate::assemble::MIN_CONTENT_PARAGRAPHS;
use crate::catalog::{BlockCatalog, ComplexBlock, Format, SimpleBlock};
use crate::error::{Error, Result};
use crate::explain::{BlockRef, ExplainContext, Explainer};
use crate::structure::{ComplexOverlay, Item, PromptStructure};
use crate::text;
use crate::user_context::UserContext;
use crate::validate::{MIN_COMPLEX_PAIR_PARAGRAPHS, MIN_PARAGRAPHS, merged_band};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::debug;

/// Smallest complex vocabulary the pair layout can place.
pub const MIN_COMPLEX_BLOCKS: usize = 2 * MIN_COMPLEX_PAIR_PARAGRAPHS;

/// Most system settings folded into the context block.
pub const MAX_SETTINGS: usize = 5;
pub const MIN_SETTINGS: usize = 2;

pub struct Annotator<'a> {
    catalog: &'a BlockCatalog,
    explainer: &'a dyn Explainer,
    user: Option<&'a UserContext>,
}

/// Where a complex block landed, in placement order.
#[derive(Debug, Clone, Copy)]
struct Placement {
    paragraph: usize,
    item: usize,
    block: ComplexBlock,
}

impl<'a> Annotator<'a> {
    pub fn new(catalog: &'a BlockCatalog, explainer: &'a dyn Explainer) -> Self {
        Self {
            catalog,
            explainer,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Option<&'a UserContext>) -> Self {
        self.user = user;
        self
    }

    /// Overlay every complex block and explain every content block.
    ///
    /// Designated pure-reference paragraphs are left untouched.
    pub fn annotate<R: Rng>(&self, mut structure: PromptStructure, rng: &mut R) -> Result<PromptStructure> {
        let mut content: Vec<usize> = structure
            .paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.pure_reference)
            .map(|(i, _)| i)
            .collect();

        if structure.len() < MIN_PARAGRAPHS {
            return Err(Error::CoverageUnsatisfiable(format!(
                "structure has {} paragraphs; at least {MIN_PARAGRAPHS} are needed",
                structure.len()
            )));
        }
        if content.len() < MIN_CONTENT_PARAGRAPHS {
            return Err(Error::CoverageUnsatisfiable(format!(
                "{} content paragraph(s); complex coverage needs at least {MIN_CONTENT_PARAGRAPHS}",
                content.len()
            )));
        }
        let mut complex: Vec<ComplexBlock> = self.catalog.complex_blocks().collect();
        if complex.len() < MIN_COMPLEX_BLOCKS {
            return Err(Error::CoverageUnsatisfiable(format!(
                "catalog has {} complex block(s); at least {MIN_COMPLEX_BLOCKS} are needed",
                complex.len()
            )));
        }

        for paragraph in &mut structure.paragraphs {
            if !paragraph.pure_reference {
                for occ in paragraph.blocks_mut() {
                    occ.complex = None;
                    occ.explanation = None;
                }
            }
        }

        content.shuffle(rng);
        complex.shuffle(rng);
        let (pairs, singles) = complex.split_at(MIN_COMPLEX_BLOCKS);

        // Each host is reserved as soon as it is chosen; formats are settled
        // once every block has a place.
        let mut placements: Vec<Placement> = Vec::with_capacity(complex.len());
        for (slot, chunk) in pairs.chunks(2).enumerate() {
            for &block in chunk {
                let placement = self.host(&structure, content[slot], block, rng)?;
                self.attach(&mut structure, placement, Format::Separate);
                placements.push(placement);
            }
        }
        let rest = &content[MIN_COMPLEX_PAIR_PARAGRAPHS..];
        for (i, &block) in singles.iter().enumerate() {
            let placement = (0..rest.len())
                .map(|offset| rest[(i + offset) % rest.len()])
                .find_map(|p| self.host(&structure, p, block, rng).ok())
                .ok_or_else(|| {
                    Error::CoverageUnsatisfiable(format!(
                        "no free building block can host #{}#",
                        block.name()
                    ))
                })?;
            self.attach(&mut structure, placement, Format::Separate);
            placements.push(placement);
        }

        let mut formats: Vec<Format> = placements
            .iter()
            .map(|p| self.preferred_format(&structure, *p))
            .collect();
        self.balance_formats(&placements, &mut formats);
        for (placement, format) in placements.iter().zip(&formats) {
            self.attach(&mut structure, *placement, *format);
        }

        self.explain_all(&mut structure);
        debug!(
            placed = placements.len(),
            merged = structure.merged_count(),
            "annotated structure"
        );
        Ok(structure)
    }

    /// Pick a free building block in `paragraph` to host `block`, preferring
    /// the block it overlaps.
    fn host<R: Rng>(
        &self,
        structure: &PromptStructure,
        paragraph: usize,
        block: ComplexBlock,
        rng: &mut R,
    ) -> Result<Placement> {
        let overlap = self.catalog.complex(block).and_then(|d| d.overlap);
        let free: Vec<(usize, SimpleBlock)> = structure.paragraphs[paragraph]
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Item::Block(occ) if occ.complex.is_none() => Some((i, occ.block)),
                _ => None,
            })
            .collect();
        let chosen = free
            .iter()
            .find(|(_, b)| Some(*b) == overlap)
            .or_else(|| free.choose(rng))
            .copied();
        match chosen {
            Some((item, _)) => Ok(Placement {
                paragraph,
                item,
                block,
            }),
            None => Err(Error::CoverageUnsatisfiable(format!(
                "paragraph {} has no free building block for #{}#",
                paragraph + 1,
                block.name()
            ))),
        }
    }

    fn host_block(&self, structure: &PromptStructure, placement: Placement) -> Option<SimpleBlock> {
        match structure.paragraphs[placement.paragraph].items.get(placement.item) {
            Some(Item::Block(occ)) => Some(occ.block),
            _ => None,
        }
    }

    fn allows(&self, block: ComplexBlock, format: Format) -> bool {
        self.catalog.complex(block).is_some_and(|d| d.allows(format))
    }

    /// Merged when the complex block overlaps its host, separate otherwise,
    /// falling back to whichever format the definition allows.
    fn preferred_format(&self, structure: &PromptStructure, placement: Placement) -> Format {
        let overlap = self.catalog.complex(placement.block).and_then(|d| d.overlap);
        let preferred = if overlap.is_some() && overlap == self.host_block(structure, placement) {
            Format::Merged
        } else {
            Format::Separate
        };
        if self.allows(placement.block, preferred) {
            preferred
        } else {
            other(preferred)
        }
    }

    /// Flip formats in placement order until the merged tally is in band.
    fn balance_formats(&self, placements: &[Placement], formats: &mut [Format]) {
        let (lo, hi) = merged_band(placements.len());
        let mut merged = formats.iter().filter(|f| **f == Format::Merged).count();
        for (placement, format) in placements.iter().zip(formats.iter_mut()) {
            if merged > hi && *format == Format::Merged && self.allows(placement.block, Format::Separate) {
                *format = Format::Separate;
                merged -= 1;
            } else if merged < lo
                && *format == Format::Separate
                && self.allows(placement.block, Format::Merged)
            {
                *format = Format::Merged;
                merged += 1;
            }
        }
    }

    fn attach(&self, structure: &mut PromptStructure, placement: Placement, format: Format) {
        if let Some(Item::Block(occ)) = structure.paragraphs[placement.paragraph]
            .items
            .get_mut(placement.item)
        {
            occ.complex = Some(ComplexOverlay {
                block: placement.block,
                format,
                explanation: None,
            });
        }
    }

    fn explain_all(&self, structure: &mut PromptStructure) {
        for (index, paragraph) in structure.paragraphs.iter_mut().enumerate() {
            if paragraph.pure_reference {
                continue;
            }
            let ctx = ExplainContext {
                catalog: self.catalog,
                paragraph: index,
                user: self.user,
            };
            for occ in paragraph.blocks_mut() {
                match occ.complex.as_mut() {
                    None => {
                        occ.explanation = Some(self.explanation(BlockRef::Simple(occ.block), &ctx));
                    }
                    Some(overlay) if overlay.format == Format::Merged => {
                        occ.explanation =
                            Some(self.explanation(BlockRef::Merged(occ.block, overlay.block), &ctx));
                        overlay.explanation = None;
                    }
                    Some(overlay) => {
                        occ.explanation = Some(self.explanation(BlockRef::Simple(occ.block), &ctx));
                        overlay.explanation =
                            Some(self.explanation(BlockRef::Complex(overlay.block), &ctx));
                    }
                }
            }
        }
    }

    /// Normalised explainer output, falling back to catalog text when the
    /// explainer has nothing usable to say.
    fn explanation(&self, block: BlockRef, ctx: &ExplainContext<'_>) -> String {
        let text = text::normalize_explanation(&self.explainer.explain(block, ctx));
        if !text.is_empty() {
            return text;
        }
        let fallback = match block {
            BlockRef::Simple(s) | BlockRef::Merged(s, _) => {
                self.catalog.simple(s).map(|d| d.explanation.to_string())
            }
            BlockRef::Complex(c) => self.catalog.complex(c).map(|d| d.definition.to_string()),
        };
        text::normalize_explanation(&fallback.unwrap_or_else(|| block.to_string()))
    }
}

fn other(format: Format) -> Format {
    match format {
        Format::Merged => Format::Separate,
        Format::Separate => Format::Merged,
    }
}

/// Fold 2 to 5 system settings into the explanation of the first
/// CONTEXT_INFORMATION block that sits in a content paragraph.
///
/// Only the first [`MAX_SETTINGS`] settings are used.
pub fn enrich_context(structure: &mut PromptStructure, settings: &[String]) -> Result<usize> {
    let settings: Vec<String> = settings
        .iter()
        .map(|s| text::normalize_explanation(s))
        .filter(|s| !s.is_empty())
        .take(MAX_SETTINGS)
        .collect();
    if settings.len() < MIN_SETTINGS {
        return Err(Error::InvalidRequest(format!(
            "{} system setting(s) given; at least {MIN_SETTINGS} are needed",
            settings.len()
        )));
    }

    let target = structure
        .paragraphs
        .iter_mut()
        .filter(|p| !p.pure_reference)
        .flat_map(|p| p.blocks_mut())
        .find(|occ| occ.block == SimpleBlock::ContextInformation)
        .ok_or_else(|| {
            Error::InvalidRequest(
                "no CONTEXT_INFORMATION block in a content paragraph to hold system settings".into(),
            )
        })?;

    let facts: Vec<String> = settings
        .iter()
        .map(|s| format!("Take into account that {}.", setting_clause(s)))
        .collect();
    let mut explanation = target.explanation.take().unwrap_or_default();
    for fact in &facts {
        if !explanation.is_empty() {
            explanation.push(' ');
        }
        explanation.push_str(fact);
    }
    target.explanation = Some(explanation);
    debug!(settings = facts.len(), "enriched context block");
    Ok(facts.len())
}

/// A setting phrased to follow "Take into account that".
fn setting_clause(setting: &str) -> String {
    let trimmed = setting.trim().trim_end_matches(['.', '!', '?', ';']);
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        // Leave acronyms and single letters alone.
        (Some(first), Some(second)) if first.is_uppercase() && second.is_lowercase() => {
            first.to_lowercase().chain(trimmed.chars().skip(1)).collect()
        }
        _ => trimmed.to_string(),
    }
}
