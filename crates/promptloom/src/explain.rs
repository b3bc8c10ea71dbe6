//! Explanation source for block occurrences.
//!
//! The annotator asks an [`Explainer`] for the prose that accompanies every
//! block in a content paragraph. The default [`CatalogExplainer`] derives it
//! from catalog data; anything smarter (a language model, a template
//! engine) plugs in through the same trait or through [`FnExplainer`].

use crate::catalog::{BlockCatalog, ComplexBlock, SimpleBlock};
use crate::user_context::UserContext;
use std::fmt;

/// The block (or merged pair) an explanation is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Simple(SimpleBlock),
    Complex(ComplexBlock),
    Merged(SimpleBlock, ComplexBlock),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(s) => write!(f, "[{}]", s.id()),
            Self::Complex(c) => write!(f, "#{}#", c.name()),
            Self::Merged(s, c) => write!(f, "[{}#{}]", s.id(), c.token()),
        }
    }
}

/// What an explainer knows about the occurrence it is explaining.
#[derive(Debug, Clone, Copy)]
pub struct ExplainContext<'a> {
    pub catalog: &'a BlockCatalog,
    /// Zero-based index of the paragraph being annotated.
    pub paragraph: usize,
    pub user: Option<&'a UserContext>,
}

pub trait Explainer: Send + Sync {
    fn explain(&self, block: BlockRef, ctx: &ExplainContext<'_>) -> String;
}

/// Explanations taken from the catalog's definitions and examples.
///
/// Complex examples rotate with the paragraph index so two runs that place
/// a block in different paragraphs read differently.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogExplainer;

impl CatalogExplainer {
    fn simple(block: SimpleBlock, ctx: &ExplainContext<'_>) -> String {
        let Some(def) = ctx.catalog.simple(block) else {
            return String::new();
        };
        match (block, ctx.user) {
            (SimpleBlock::BackgroundInformation, Some(user)) => format!(
                "{} Right now the user is busy with this: {}",
                def.explanation,
                user.what_they_are_doing_for_current_task.trim()
            ),
            (SimpleBlock::UserPreferences, Some(user)) => format!(
                "{} Expect someone who comes across as {}.",
                def.explanation,
                user.user_personality.trim().trim_end_matches('.')
            ),
            _ => def.explanation.to_string(),
        }
    }

    fn complex(block: ComplexBlock, ctx: &ExplainContext<'_>) -> String {
        let Some(def) = ctx.catalog.complex(block) else {
            return String::new();
        };
        if def.examples.is_empty() {
            return def.definition.to_string();
        }
        def.examples[ctx.paragraph % def.examples.len()].to_string()
    }
}

impl Explainer for CatalogExplainer {
    fn explain(&self, block: BlockRef, ctx: &ExplainContext<'_>) -> String {
        match block {
            BlockRef::Simple(s) => Self::simple(s, ctx),
            BlockRef::Complex(c) => Self::complex(c, ctx),
            BlockRef::Merged(s, c) => {
                let simple = Self::simple(s, ctx);
                let complex = Self::complex(c, ctx);
                format!("{simple} {complex}").trim().to_string()
            }
        }
    }
}

/// Adapter turning a closure into an [`Explainer`].
pub struct FnExplainer<F>(F);

impl<F> FnExplainer<F>
where
    F: Fn(BlockRef, &ExplainContext<'_>) -> String + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Explainer for FnExplainer<F>
where
    F: Fn(BlockRef, &ExplainContext<'_>) -> String + Send + Sync,
{
    fn explain(&self, block: BlockRef, ctx: &ExplainContext<'_>) -> String {
        (self.0)(block, ctx)
    }
}

impl<F> fmt::Debug for FnExplainer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnExplainer")
    }
}
