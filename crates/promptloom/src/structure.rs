//! Data model shared by every pipeline stage.
//!
//! A [`PromptStructure`] is an ordered list of [`Paragraph`]s; each paragraph
//! is an ordered list of [`Item`]s. A complex block never stands alone: it is
//! an overlay on the building-block occurrence that hosts it, the same way
//! the markup writes `[HOST#Complex_Name]` or `[HOST] #Complex Name#`.

use crate::catalog::{ComplexBlock, Format, SimpleBlock};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Text that must survive population unchanged in wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerbatimSpan {
    pub text: String,
}

impl VerbatimSpan {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A complex block attached to a building-block occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ComplexOverlay {
    pub block: ComplexBlock,
    pub format: Format,
    /// Own explanation. Only the separate format carries one; a merged
    /// overlay shares the host's explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// A placement of a building block inside a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BlockOccurrence {
    pub block: SimpleBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complex: Option<ComplexOverlay>,
}

impl BlockOccurrence {
    /// A bare reference with no explanation and no overlay.
    pub fn reference(block: SimpleBlock) -> Self {
        Self {
            block,
            explanation: None,
            complex: None,
        }
    }

    pub fn is_bare(&self) -> bool {
        self.explanation.is_none() && self.complex.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Block(BlockOccurrence),
    Verbatim(VerbatimSpan),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Paragraph {
    pub items: Vec<Item>,
    /// Set by the assembler for paragraphs that must stay bare references.
    /// The annotator never touches a designated paragraph.
    #[serde(default)]
    pub pure_reference: bool,
}

impl Paragraph {
    /// A designated pure-reference paragraph.
    pub fn pure(blocks: &[SimpleBlock]) -> Self {
        Self {
            items: blocks
                .iter()
                .map(|b| Item::Block(BlockOccurrence::reference(*b)))
                .collect(),
            pure_reference: true,
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockOccurrence> {
        self.items.iter().filter_map(|item| match item {
            Item::Block(occ) => Some(occ),
            Item::Verbatim(_) => None,
        })
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BlockOccurrence> {
        self.items.iter_mut().filter_map(|item| match item {
            Item::Block(occ) => Some(occ),
            Item::Verbatim(_) => None,
        })
    }

    pub fn verbatim_spans(&self) -> impl Iterator<Item = &VerbatimSpan> {
        self.items.iter().filter_map(|item| match item {
            Item::Verbatim(span) => Some(span),
            Item::Block(_) => None,
        })
    }

    pub fn complex_overlays(&self) -> impl Iterator<Item = &ComplexOverlay> {
        self.blocks().filter_map(|occ| occ.complex.as_ref())
    }

    /// Number of building-block references.
    pub fn reference_count(&self) -> usize {
        self.blocks().count()
    }

    /// Structurally pure: block references only, none explained or overlaid.
    pub fn is_pure_reference(&self) -> bool {
        !self.items.is_empty()
            && self.items.iter().all(|item| match item {
                Item::Block(occ) => occ.is_bare(),
                Item::Verbatim(_) => false,
            })
    }

    /// Exactly two bare building-block references and nothing else.
    pub fn is_simple_pair(&self) -> bool {
        self.is_pure_reference() && self.items.len() == 2
    }

    pub fn distinct_complex_count(&self) -> usize {
        let mut seen: Vec<ComplexBlock> = self.complex_overlays().map(|o| o.block).collect();
        seen.sort();
        seen.dedup();
        seen.len()
    }
}

/// The full paragraph layout of a prompt, before population.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PromptStructure {
    pub paragraphs: Vec<Paragraph>,
}

impl PromptStructure {
    pub fn new(paragraphs: Vec<Paragraph>) -> Self {
        Self { paragraphs }
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn complex_overlays(&self) -> impl Iterator<Item = &ComplexOverlay> {
        self.paragraphs.iter().flat_map(|p| p.complex_overlays())
    }

    pub fn verbatim_spans(&self) -> impl Iterator<Item = &VerbatimSpan> {
        self.paragraphs.iter().flat_map(|p| p.verbatim_spans())
    }

    pub fn count_simple(&self, block: SimpleBlock) -> usize {
        self.paragraphs
            .iter()
            .flat_map(|p| p.blocks())
            .filter(|occ| occ.block == block)
            .count()
    }

    pub fn count_complex(&self, block: ComplexBlock) -> usize {
        self.complex_overlays().filter(|o| o.block == block).count()
    }

    /// Number of complex overlays rendered in the merged format.
    pub fn merged_count(&self) -> usize {
        self.complex_overlays()
            .filter(|o| o.format == Format::Merged)
            .count()
    }
}
