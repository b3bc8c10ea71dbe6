//! Concurrent runs of independent requests.
//!
//! Each job runs the full pipeline on tokio's blocking pool. Outcomes are
//! returned by job index regardless of completion order. Cancelling the
//! shared flag stops every job at its next stage boundary.

use crate::config::PromptRequest;
use crate::error::{Error, Result};
use crate::pipeline::{CancelFlag, Pipeline, PromptReport};
use crate::user_context::UserContext;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// One request plus the user it is generated for.
#[derive(Debug, Clone, Default)]
pub struct BatchJob {
    pub request: PromptRequest,
    pub user: Option<UserContext>,
}

impl BatchJob {
    pub fn new(request: PromptRequest) -> Self {
        Self {
            request,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Option<UserContext>) -> Self {
        self.user = user;
        self
    }
}

/// Run every job concurrently and return their outcomes in job order.
///
/// With a base seed configured, job `i` uses `seed + i` so a batch is
/// reproducible as a whole.
pub async fn run_batch(pipeline: &Pipeline, jobs: Vec<BatchJob>, cancel: CancelFlag) -> Vec<Result<PromptReport>> {
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }
    info!("Batch: starting {total} jobs");

    let base_seed = pipeline.config().seed;
    let mut js: JoinSet<(usize, Result<PromptReport>)> = JoinSet::new();
    for (idx, job) in jobs.into_iter().enumerate() {
        let mut config = pipeline.config().clone();
        if let Some(seed) = base_seed {
            config.seed = Some(seed.wrapping_add(idx as u64));
        }
        let worker = pipeline.clone().with_config(config).with_cancel(cancel.clone());
        js.spawn_blocking(move || (idx, worker.run(&job.request, job.user.as_ref())));
    }

    let mut outcomes: Vec<Option<Result<PromptReport>>> = (0..total).map(|_| None).collect();
    let mut done = 0;
    while let Some(joined) = js.join_next().await {
        match joined {
            Ok((idx, outcome)) => {
                done += 1;
                match &outcome {
                    Ok(report) => info!("Batch: job {idx} done in {} attempt(s) ({done}/{total})", report.attempts),
                    Err(e) => warn!("Batch: job {idx} failed: {e} ({done}/{total})"),
                }
                outcomes[idx] = Some(outcome);
            }
            Err(e) => warn!("Batch: worker failed: {e}"),
        }
    }

    outcomes
        .into_iter()
        .enumerate()
        .map(|(idx, outcome)| outcome.unwrap_or_else(|| Err(Error::Worker(format!("job {idx} produced no result")))))
        .collect()
}
