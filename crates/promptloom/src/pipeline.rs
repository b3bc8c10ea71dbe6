//! Generate, validate, retry.
//!
//! [`Pipeline::run`] drives one request through assembly, annotation,
//! context enrichment, structural validation, population and output
//! validation. Recoverable failures start a fresh attempt with a seed
//! derived from the base seed; a failed relaxed population is retried once
//! with strict anchoring before the attempt is given up. Cancellation is
//! checked between stages, never inside one.

use crate::annotate::{Annotator, enrich_context};
use crate::assemble::{Assembler, check_literal};
use crate::catalog::BlockCatalog;
use crate::config::{PipelineConfig, PromptRequest};
use crate::error::{Error, Result};
use crate::explain::{CatalogExplainer, Explainer};
use crate::markup::render_markup;
use crate::populate::{Anchoring, PopulateOptions, Populator};
use crate::retry::RetryPolicy;
use crate::structure::PromptStructure;
use crate::user_context::UserContext;
use crate::validate::{validate_document, validate_structure};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Shared flag that abandons remaining work at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A finished prompt with everything needed to reproduce it.
#[derive(Debug, Clone, Serialize)]
pub struct PromptReport {
    /// RFC 3339 timestamp.
    pub generated_at: String,
    /// Seed of the successful attempt.
    pub seed: u64,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub anchoring: Anchoring,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    pub markup: String,
    pub structure: PromptStructure,
    pub document: String,
}

#[derive(Clone)]
pub struct Pipeline {
    catalog: Cow<'static, BlockCatalog>,
    config: PipelineConfig,
    explainer: Arc<dyn Explainer>,
    cancel: Option<CancelFlag>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Pipeline {
    /// A pipeline over the standard catalog with catalog explanations.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            catalog: Cow::Borrowed(BlockCatalog::standard()),
            config,
            explainer: Arc::new(CatalogExplainer),
            cancel: None,
        }
    }

    pub fn with_catalog(mut self, catalog: BlockCatalog) -> Self {
        self.catalog = Cow::Owned(catalog);
        self
    }

    pub fn with_explainer(mut self, explainer: impl Explainer + 'static) -> Self {
        self.explainer = Arc::new(explainer);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Generate one prompt for `request`.
    ///
    /// `user` supplies the persona name when the request has none, and is
    /// handed to the explainer.
    pub fn run(&self, request: &PromptRequest, user: Option<&UserContext>) -> Result<PromptReport> {
        request.check(&self.catalog)?;
        let persona = request
            .persona
            .clone()
            .or_else(|| user.map(|u| u.user_name.trim().to_string()));
        if let Some(name) = &persona {
            check_literal(name, "persona name", &self.catalog)?;
        }
        let options = PopulateOptions::default()
            .with_persona(persona.clone())
            .with_must_include(request.must_include.clone())
            .with_tool_names(request.tool_names.clone());

        let base = self.config.seed.unwrap_or_else(rand::random);
        let max_attempts = self.config.retry.max_attempts;
        info!(
            seed = base,
            max_attempts,
            fragments = request.inspiration.len(),
            "generating prompt"
        );

        let mut last_error = None;
        for attempt in 0..max_attempts {
            self.check_cancelled()?;
            let seed = RetryPolicy::seed_for_attempt(base, attempt);
            match self.attempt(request, user, &options, seed) {
                Ok((structure, document, anchoring)) => {
                    info!(
                        attempt = attempt + 1,
                        paragraphs = structure.len(),
                        chars = document.chars().count(),
                        "prompt generated"
                    );
                    return Ok(PromptReport {
                        generated_at: chrono::Utc::now().to_rfc3339(),
                        seed,
                        attempts: attempt + 1,
                        anchoring,
                        persona,
                        markup: render_markup(&structure),
                        structure,
                        document,
                    });
                }
                Err(e) if self.config.retry.should_retry(&e, attempt) => {
                    warn!(attempt = attempt + 1, error = %e, "attempt failed; retrying");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "giving up");
                    return Err(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::InvalidRequest("attempt budget is zero".into())))
    }

    fn attempt(
        &self,
        request: &PromptRequest,
        user: Option<&UserContext>,
        options: &PopulateOptions,
        seed: u64,
    ) -> Result<(PromptStructure, String, Anchoring)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let structure = Assembler::new(&self.catalog)
            .with_paragraphs(self.config.paragraphs.clone())
            .assemble(&request.inspiration, &mut rng)?;
        self.check_cancelled()?;

        let mut structure = Annotator::new(&self.catalog, self.explainer.as_ref())
            .with_user(user)
            .annotate(structure, &mut rng)?;
        if request.system_settings.iter().any(|s| !s.trim().is_empty()) {
            enrich_context(&mut structure, &request.system_settings)?;
        }
        self.check_cancelled()?;

        let (document, anchoring) = self.populate(&structure, options)?;
        Ok((structure, document, anchoring))
    }

    /// Validate `structure`, populate it and validate the document.
    ///
    /// A relaxed population that loses a span or leaks a tool name is
    /// retried once with strict anchoring when the policy allows it.
    pub fn populate(&self, structure: &PromptStructure, options: &PopulateOptions) -> Result<(String, Anchoring)> {
        let violations = validate_structure(structure, &self.catalog);
        if !violations.is_empty() {
            return Err(Error::ConstraintViolation(violations));
        }
        self.check_cancelled()?;

        let populator = Populator::new(&self.catalog, options);
        let (document, anchoring) = match populator.populate(structure) {
            Ok(document) => (document, options.anchoring),
            Err(e)
                if e.is_population_failure()
                    && self.config.retry.strict_fallback
                    && options.anchoring == Anchoring::Relaxed =>
            {
                debug!(error = %e, "relaxed population failed; retrying with strict anchoring");
                let strict = options.clone().with_anchoring(Anchoring::Strict);
                let document = Populator::new(&self.catalog, &strict).populate(structure)?;
                (document, Anchoring::Strict)
            }
            Err(e) => return Err(e),
        };

        let mut expect = populator.expectations(structure);
        expect.min_chars = self.config.min_chars;
        let violations = validate_document(&document, &expect);
        if !violations.is_empty() {
            return Err(Error::ConstraintViolation(violations));
        }
        Ok((document, anchoring))
    }
}
