//! Readiness checks for write-plan JSON documents.
//!
//! A plan is "ready" when every write is well-formed, targets a distinct,
//! non-formula A1 cell, carries a complete source and the required meta keys,
//! and the plan's template fingerprint agrees with the lock.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

static A1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{1,3})[1-9][0-9]*$").unwrap());

/// Meta keys every write must carry with a non-empty value.
pub const REQUIRED_META_KEYS: [&str; 5] = ["project", "option", "trade", "bucket_code", "line_id"];

/// Source keys every write must carry with a non-empty value.
pub const REQUIRED_SOURCE_KEYS: [&str; 3] = ["source_type", "source_path", "locator"];

/// Why a candidate plan was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Signatures,
    BadJson,
    NotDict,
    NoWrites,
    MissingTemplateSha,
    ShaMismatch,
    BadWriteObj,
    MissingCellOrSheet,
    InvalidCell,
    FormulaColTarget,
    DupCellInPlan,
    MissingSource,
    IncompleteSource,
    MissingMeta,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Signatures => "signatures",
            Self::BadJson => "bad_json",
            Self::NotDict => "not_dict",
            Self::NoWrites => "no_writes",
            Self::MissingTemplateSha => "missing_template_sha",
            Self::ShaMismatch => "sha_mismatch",
            Self::BadWriteObj => "bad_write_obj",
            Self::MissingCellOrSheet => "missing_cell_or_sheet",
            Self::InvalidCell => "invalid_cell",
            Self::FormulaColTarget => "formula_col_target",
            Self::DupCellInPlan => "dup_cell_in_plan",
            Self::MissingSource => "missing_source",
            Self::IncompleteSource => "incomplete_source",
            Self::MissingMeta => "missing_meta",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A plan that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyPlan {
    /// Fingerprint of the plan's `writes` array.
    pub plan_hash: String,
    /// True when the plan lacked `plan_hash` and must be rewritten with it.
    pub needs_hash: bool,
}

/// Template fingerprint recorded in a lock file, if any.
pub fn lock_fingerprint(lock: &Value) -> Option<String> {
    let obj = lock.as_object()?;
    ["template_sha256", "template_sha", "sha256", "sha"]
        .iter()
        .find_map(|key| non_empty_str(obj, key))
        .or_else(|| {
            obj.get("template")
                .and_then(Value::as_object)
                .and_then(|template| non_empty_str(template, "sha256"))
        })
        .map(str::to_string)
}

/// SHA-256 of the compact, key-sorted JSON rendering of `writes`.
///
/// `serde_json::Map` is ordered by key, so `to_string` already yields the
/// sorted form.
pub fn plan_hash(writes: &Value) -> String {
    let canonical = serde_json::to_string(writes).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Check a parsed plan against the lock fingerprint and formula columns.
pub fn check_plan(
    plan: &Value,
    lock_sha: Option<&str>,
    formula_columns: &[String],
) -> Result<ReadyPlan, SkipReason> {
    let obj = plan.as_object().ok_or(SkipReason::NotDict)?;

    let writes_value = obj.get("writes").ok_or(SkipReason::NoWrites)?;
    let writes = writes_value
        .as_array()
        .filter(|writes| !writes.is_empty())
        .ok_or(SkipReason::NoWrites)?;

    let plan_sha = non_empty_str(obj, "template_sha256")
        .or_else(|| non_empty_str(obj, "template_sha"))
        .ok_or(SkipReason::MissingTemplateSha)?;
    if let Some(lock_sha) = lock_sha {
        if plan_sha != lock_sha {
            return Err(SkipReason::ShaMismatch);
        }
    }

    let mut seen = HashSet::new();
    for write in writes {
        check_write(write, formula_columns, &mut seen)?;
    }

    let existing = non_empty_str(obj, "plan_hash");
    Ok(ReadyPlan {
        plan_hash: existing
            .map(str::to_string)
            .unwrap_or_else(|| plan_hash(writes_value)),
        needs_hash: existing.is_none(),
    })
}

fn check_write<'a>(
    write: &'a Value,
    formula_columns: &[String],
    seen: &mut HashSet<(&'a str, &'a str)>,
) -> Result<(), SkipReason> {
    let obj = write.as_object().ok_or(SkipReason::BadWriteObj)?;
    let (sheet, cell) = match (non_empty_str(obj, "sheet"), non_empty_str(obj, "cell")) {
        (Some(sheet), Some(cell)) => (sheet, cell),
        _ => return Err(SkipReason::MissingCellOrSheet),
    };

    let caps = A1_RE.captures(cell).ok_or(SkipReason::InvalidCell)?;
    let column = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    if formula_columns.iter().any(|c| c == column) {
        return Err(SkipReason::FormulaColTarget);
    }

    if !seen.insert((sheet, cell)) {
        return Err(SkipReason::DupCellInPlan);
    }

    match obj.get("source") {
        None | Some(Value::Null) => return Err(SkipReason::MissingSource),
        Some(Value::Object(source)) => {
            if !REQUIRED_SOURCE_KEYS
                .iter()
                .all(|key| has_value(source, key))
            {
                return Err(SkipReason::IncompleteSource);
            }
        }
        Some(_) => return Err(SkipReason::IncompleteSource),
    }

    let meta = obj
        .get("meta")
        .and_then(Value::as_object)
        .ok_or(SkipReason::MissingMeta)?;
    if !REQUIRED_META_KEYS.iter().all(|key| has_value(meta, key)) {
        return Err(SkipReason::MissingMeta);
    }
    Ok(())
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// Present, not null, and not an empty string.
fn has_value(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
