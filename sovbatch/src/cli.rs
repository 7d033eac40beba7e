//! CLI command implementations.
//!
//! Stdout carries only results (`KEY=value` lines, the batch summary, the
//! status report). Diagnostics go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use sovbatch::apply::{ApplyContext, apply_plan, require_plan};
use sovbatch::batch::{BatchOptions, PromotionState, run_batch};
use sovbatch::core::stamp::StampClock;
use sovbatch::exit_codes;
use sovbatch::io::applier::{CommandApplier, PlanApplier};
use sovbatch::io::config::{CONFIG_FILE_NAME, Settings, load_config};
use sovbatch::io::guards::{ApplyGuards, Preflight};
use sovbatch::io::init::init_workspace;
use sovbatch::io::permissions::PermissionGuard;
use sovbatch::io::promotion;
use sovbatch::select::run_select;
use sovbatch::status::collect_status;

/// Paths given on the command line. They win over env and config.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub lock: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub ready_list: Option<PathBuf>,
}

/// Config file, then environment, then CLI flags.
pub fn load_settings(root: &Path, overrides: Overrides) -> Result<Settings> {
    let config_path = overrides
        .config
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    let mut cfg = load_config(&config_path)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    if let Some(dir) = overrides.reports_dir {
        cfg.reports_dir = dir;
    }
    if let Some(lock) = overrides.lock {
        cfg.lock = Some(lock);
    }
    if let Some(template) = overrides.template {
        cfg.template = Some(template);
    }
    if let Some(list) = overrides.ready_list {
        cfg.ready_list = Some(list);
    }
    debug!(config = %config_path.display(), "settings loaded");
    Settings::resolve(root, cfg)
}

pub fn init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, force)?;
    println!("CONFIG={}", paths.config_path.display());
    println!("REPORTS_DIR={}", paths.reports_dir.display());
    Ok(exit_codes::OK)
}

pub fn select(settings: &Settings) -> Result<i32> {
    let report = run_select(settings)?;
    println!("LOCK_SHA={}", report.lock_sha.as_deref().unwrap_or(""));
    println!("READY={}", report.ready.len());
    println!("FIXED_PLAN_HASH={}", report.fixed);
    for (reason, count) in &report.skipped {
        println!("SKIPPED {reason}={count}");
    }
    println!("WROTE={}", settings.ready_list.display());
    Ok(exit_codes::OK)
}

pub fn apply(settings: &Settings, plan: &str) -> Result<i32> {
    require_plan(&settings.root, plan)?;
    let ctx = ApplyContext::from_settings(settings)?;
    let applier = CommandApplier::from_settings(settings);
    applier.ensure_available()?;

    let result = apply_plan(
        &ctx,
        &ApplyGuards::from_settings(settings),
        &applier,
        &mut StampClock::new(),
        plan,
    )?;

    eprint!("{}", result.report.output);
    println!("OUT_XLSM={}", result.paths.out_xlsm.display());
    println!("AUDIT_JSONL={}", result.paths.audit_jsonl.display());
    if result.report.outcome.is_success() {
        Ok(exit_codes::OK)
    } else {
        eprintln!("sovbatch: apply: {}", result.report.outcome);
        Ok(exit_codes::FAILURE)
    }
}

pub fn batch(settings: &Settings, promote: bool) -> Result<i32> {
    let summary = run_batch(
        settings,
        &ApplyGuards::from_settings(settings),
        &CommandApplier::from_settings(settings),
        BatchOptions { promote },
    )?;

    let Some(run_log) = &summary.run_log else {
        println!("READY=0");
        return Ok(exit_codes::OK);
    };
    println!("RUN_LOG={}", run_log.display());
    println!("{}", summary.tally.summary_line());
    match summary.promotion {
        PromotionState::Skipped => Ok(exit_codes::OK),
        PromotionState::Promoted(promotion) => {
            println!("PROMOTED={}", promotion.record.source);
            Ok(exit_codes::OK)
        }
        PromotionState::Failed(err) => Err(err.context("batch completed, promotion failed")),
    }
}

pub fn promote(settings: &Settings) -> Result<i32> {
    let promotion = promotion::promote(&settings.reports_dir)?;
    println!("PROMOTED={}", promotion.record.source);
    println!("GOLD={}", promotion.gold.display());
    println!("LATEST={}", promotion.latest.display());
    Ok(exit_codes::OK)
}

pub fn status(settings: &Settings) -> Result<i32> {
    let report = collect_status(settings)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{report}")?;
    Ok(exit_codes::OK)
}

pub fn harden(settings: &Settings) -> Result<i32> {
    let guard = PermissionGuard::new(settings.hardened_files.clone(), settings.hardened_mode);
    let changed = guard.harden()?;
    for path in &changed {
        println!("HARDENED={}", path.display());
    }
    if changed.is_empty() {
        eprintln!("sovbatch: harden: all {} files already hardened", guard.files().len());
    }
    Ok(exit_codes::OK)
}

pub fn guard(settings: &Settings) -> Result<i32> {
    ApplyGuards::from_settings(settings).check()?;
    println!("GUARDS=ok");
    Ok(exit_codes::OK)
}
