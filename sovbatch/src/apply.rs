//! Single-plan apply: guards, fresh stamped outputs, one applier invocation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::artifact::{artifact_file_name, audit_file_name};
use crate::core::stamp::{Stamp, StampClock};
use crate::error::{PreconditionError, PreconditionKind};
use crate::io::applier::{ApplyReport, ApplyRequest, PlanApplier};
use crate::io::config::Settings;
use crate::io::guards::Preflight;

/// Inputs shared by every apply in a run, resolved and checked up front.
#[derive(Debug, Clone)]
pub struct ApplyContext {
    pub root: PathBuf,
    pub reports_dir: PathBuf,
    pub template: PathBuf,
    pub lock: PathBuf,
}

impl ApplyContext {
    /// Fails with a precondition error when `TPL` or `LOCK` is unset or missing.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            root: settings.root.clone(),
            reports_dir: settings.reports_dir.clone(),
            template: settings.require_template()?.to_path_buf(),
            lock: settings.require_lock()?.to_path_buf(),
        })
    }
}

/// Output locations for one apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPaths {
    pub stamp: Stamp,
    pub out_xlsm: PathBuf,
    pub audit_jsonl: PathBuf,
}

impl ApplyPaths {
    pub fn new(reports_dir: &Path, stamp: Stamp) -> Self {
        Self {
            out_xlsm: reports_dir.join(artifact_file_name(&stamp)),
            audit_jsonl: reports_dir.join(audit_file_name(&stamp)),
            stamp,
        }
    }

    fn taken(&self) -> bool {
        self.out_xlsm.exists() || self.audit_jsonl.exists()
    }
}

#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub paths: ApplyPaths,
    pub report: ApplyReport,
}

/// Next pair of output paths that do not exist yet.
pub fn fresh_paths(reports_dir: &Path, clock: &mut StampClock) -> ApplyPaths {
    loop {
        let paths = ApplyPaths::new(reports_dir, clock.next());
        if !paths.taken() {
            return paths;
        }
        debug!(stamp = %paths.stamp, "stamp already used, advancing");
    }
}

/// Fail with `MissingFile` unless `plan` names an existing file under the root.
pub fn require_plan(root: &Path, plan: &str) -> Result<()> {
    if plan.trim().is_empty() {
        return Err(PreconditionError::new(
            PreconditionKind::MissingSetting,
            "PLAN is not set (env or --plan)",
        )
        .into());
    }
    if !root.join(plan).is_file() {
        return Err(PreconditionError::new(
            PreconditionKind::MissingFile,
            format!("PLAN not found: {plan}"),
        )
        .into());
    }
    Ok(())
}

/// Run the guards, then apply `plan` into freshly stamped outputs.
///
/// A guard failure returns its precondition error before the applier is
/// started. An applier that runs but does not apply still returns `Ok`.
#[instrument(skip_all, fields(plan = %plan))]
pub fn apply_plan<P: Preflight, A: PlanApplier>(
    ctx: &ApplyContext,
    preflight: &P,
    applier: &A,
    clock: &mut StampClock,
    plan: &str,
) -> Result<ApplyResult> {
    preflight.check()?;
    apply_unguarded(ctx, applier, clock, plan)
}

pub(crate) fn apply_unguarded<A: PlanApplier>(
    ctx: &ApplyContext,
    applier: &A,
    clock: &mut StampClock,
    plan: &str,
) -> Result<ApplyResult> {
    fs::create_dir_all(&ctx.reports_dir)
        .with_context(|| format!("create directory {}", ctx.reports_dir.display()))?;
    let paths = fresh_paths(&ctx.reports_dir, clock);
    let request = ApplyRequest {
        workdir: ctx.root.clone(),
        plan: plan.to_string(),
        template: ctx.template.clone(),
        lock: ctx.lock.clone(),
        out_xlsm: paths.out_xlsm.clone(),
        audit_jsonl: paths.audit_jsonl.clone(),
    };
    let report = applier.apply(&request)?;
    info!(outcome = %report.outcome, stamp = %paths.stamp, "apply finished");
    Ok(ApplyResult { paths, report })
}
