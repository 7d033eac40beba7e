//! Structured per-invocation apply outcomes and batch tallies.
//!
//! The applier reports through free-form text. Classification happens once,
//! right after each invocation, so batch tallies aggregate enum values and
//! never re-scan the run log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker the applier prints after a successful apply.
pub const SUCCESS_MARKER: &str = "Writes applied:";
/// Marker the applier prints when lock validation rejects the plan.
pub const NO_GO_MARKER: &str = "NO-GO";
/// Marker the applier prints when a write targets a formula column.
pub const FORMULA_TARGET_MARKER: &str = "FORMULA COLUMN TARGET";
/// Prose markers matched case-insensitively.
pub const ABORT_MARKER: &str = "abort";
pub const MISMATCH_MARKER: &str = "mismatch";

/// Result of one applier invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Writes were applied and the artifact was saved.
    Applied,
    /// Lock validation rejected the plan.
    NoGo,
    /// The applier aborted.
    Aborted,
    /// A fingerprint mismatch (template sha, plan hash) was detected.
    Mismatch,
    /// A write targeted a formula column.
    FormulaTarget,
    /// Non-zero exit, timeout, or output without any known marker.
    Failed,
}

impl ApplyOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Applied
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::NoGo => "no_go",
            Self::Aborted => "aborted",
            Self::Mismatch => "mismatch",
            Self::FormulaTarget => "formula_target",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Line prefixes the applier uses to report output paths.
const PATH_LINE_PREFIXES: [&str; 2] = ["OUT:", "AUDIT:"];

/// Classify one invocation from its exit state and combined output.
///
/// Failure markers win over the success marker, so an output that reports
/// both is never counted as applied. A clean exit without the success marker
/// is `Failed`: the applier must positively confirm its writes. Path report
/// lines are not searched for markers.
pub fn classify_apply(exit_ok: bool, output: &str) -> ApplyOutcome {
    let messages: String = output
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            !PATH_LINE_PREFIXES.iter().any(|p| line.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n");
    let lower = messages.to_lowercase();
    if messages.contains(FORMULA_TARGET_MARKER) {
        return ApplyOutcome::FormulaTarget;
    }
    if messages.contains(NO_GO_MARKER) {
        return ApplyOutcome::NoGo;
    }
    if lower.contains(MISMATCH_MARKER) {
        return ApplyOutcome::Mismatch;
    }
    if lower.contains(ABORT_MARKER) {
        return ApplyOutcome::Aborted;
    }
    if exit_ok && messages.contains(SUCCESS_MARKER) {
        return ApplyOutcome::Applied;
    }
    ApplyOutcome::Failed
}

/// Aggregated counts for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub plans: usize,
    pub ok: usize,
    pub fail: usize,
}

impl BatchTally {
    pub fn record(&mut self, outcome: ApplyOutcome) {
        self.plans += 1;
        if outcome.is_success() {
            self.ok += 1;
        } else {
            self.fail += 1;
        }
    }

    /// Summary line written at the end of every run log.
    pub fn summary_line(&self) -> String {
        format!(
            "SUMMARY plans={} OK_count={} FAIL_count={}",
            self.plans, self.ok, self.fail
        )
    }
}
