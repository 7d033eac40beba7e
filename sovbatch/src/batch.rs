//! Orchestration for `sovbatch batch`: ready list in, run log and promotion out.
//!
//! The loop is sequential. Guards run before every plan and a guard failure
//! stops the batch; a plan that fails to apply is logged and tallied, and the
//! loop moves on.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::apply::{ApplyContext, ApplyPaths, apply_unguarded};
use crate::core::outcome::{ApplyOutcome, BatchTally};
use crate::core::ready_list::normalize_ready_list;
use crate::core::stamp::StampClock;
use crate::error::{PreconditionError, PreconditionKind};
use crate::io::applier::PlanApplier;
use crate::io::config::Settings;
use crate::io::guards::Preflight;
use crate::io::lock::BatchLock;
use crate::io::promotion::{Promotion, promote};
use crate::io::run_log::RunLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Promote the newest artifact once every plan has been attempted.
    pub promote: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { promote: true }
    }
}

/// One plan's result within a batch.
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub plan: String,
    pub outcome: ApplyOutcome,
    pub paths: ApplyPaths,
}

/// Promotion step state after a batch.
#[derive(Debug)]
pub enum PromotionState {
    /// No plans ran, or promotion was turned off.
    Skipped,
    Promoted(Promotion),
    /// The batch completed but promotion did not.
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct BatchSummary {
    pub tally: BatchTally,
    pub results: Vec<PlanResult>,
    /// `None` when the ready list was empty.
    pub run_log: Option<PathBuf>,
    pub promotion: PromotionState,
}

impl BatchSummary {
    fn empty() -> Self {
        Self {
            tally: BatchTally::default(),
            results: Vec::new(),
            run_log: None,
            promotion: PromotionState::Skipped,
        }
    }
}

/// Read and normalize the ready list. A missing file is a precondition failure.
pub fn load_ready_list(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(PreconditionError::new(
            PreconditionKind::MissingFile,
            format!("READY_LIST not found: {}", path.display()),
        )
        .into());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(normalize_ready_list(&raw))
}

/// Run every plan in the ready list, then promote.
///
/// Returns `Err` only for precondition failures (before or during the loop)
/// and for I/O errors on the run log. Per-plan failures are in the tally.
#[instrument(skip_all, fields(ready_list = %settings.ready_list.display()))]
pub fn run_batch<P: Preflight, A: PlanApplier>(
    settings: &Settings,
    preflight: &P,
    applier: &A,
    options: BatchOptions,
) -> Result<BatchSummary> {
    let plans = load_ready_list(&settings.ready_list)?;
    if plans.is_empty() {
        info!("ready list is empty, nothing to do");
        return Ok(BatchSummary::empty());
    }

    let ctx = ApplyContext::from_settings(settings)?;
    applier.ensure_available()?;
    let _lock = BatchLock::acquire(&settings.reports_dir)?;

    let mut clock = StampClock::new();
    let mut log = RunLog::create(&settings.reports_dir, &clock.next())?;
    info!(plans = plans.len(), run_log = %log.path().display(), "batch started");

    let mut tally = BatchTally::default();
    let mut results = Vec::with_capacity(plans.len());
    for plan in &plans {
        if let Err(err) = preflight.check() {
            warn!(plan = %plan, error = %err, "guard failed, aborting batch");
            log.record_abort(plan, &format!("{err:#}"))?;
            return Err(err.context(format!("batch aborted before {plan}")));
        }

        let applied = match apply_unguarded(&ctx, applier, &mut clock, plan) {
            Ok(applied) => applied,
            Err(err) => {
                warn!(plan = %plan, error = %err, "applier could not run, aborting batch");
                log.record_abort(plan, &format!("{err:#}"))?;
                return Err(err.context(format!("batch aborted at {plan}")));
            }
        };

        log.record_plan(plan, &applied.report)?;
        tally.record(applied.report.outcome);
        results.push(PlanResult {
            plan: plan.clone(),
            outcome: applied.report.outcome,
            paths: applied.paths,
        });
    }

    log.record_summary(&tally)?;
    info!(
        plans = tally.plans,
        ok = tally.ok,
        fail = tally.fail,
        "batch finished"
    );

    let promotion = if options.promote {
        match promote(&settings.reports_dir) {
            Ok(promotion) => PromotionState::Promoted(promotion),
            Err(err) => {
                warn!(error = %err, "promotion failed");
                PromotionState::Failed(err)
            }
        }
    } else {
        PromotionState::Skipped
    };

    Ok(BatchSummary {
        tally,
        results,
        run_log: Some(log.path().to_path_buf()),
        promotion,
    })
}
