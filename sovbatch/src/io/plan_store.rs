//! Plan discovery on disk for `sovbatch select`.
//!
//! Scans a plans directory for `*.json` write-plans, runs the readiness checks
//! from [`crate::core::plan_check`], and rewrites ready plans that lack a
//! `plan_hash` into `<plans>/_batch_ready/`, mirroring their relative path.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::plan_check::{SkipReason, check_plan, lock_fingerprint};
use crate::io::fs::write_atomic;

/// Output directory for plans rewritten with a computed `plan_hash`.
pub const READY_DIR_NAME: &str = "_batch_ready";
const SIGNATURES_DIR_NAME: &str = "signatures";

/// Outcome of one selection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    /// Ready plan identifiers, sorted and unique.
    pub ready: Vec<String>,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Ready plans that were rewritten with a computed `plan_hash`.
    pub fixed: usize,
    pub lock_sha: Option<String>,
}

impl SelectionReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Template fingerprint from a lock file. The lock must be a JSON object.
pub fn read_lock_fingerprint(lock: &Path) -> Result<Option<String>> {
    let text = fs::read_to_string(lock).with_context(|| format!("read lock {}", lock.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parse lock {}", lock.display()))?;
    if !value.is_object() {
        return Err(anyhow!("lock is not a JSON object: {}", lock.display()));
    }
    Ok(lock_fingerprint(&value))
}

/// Scan `plans_dir` and classify every candidate plan.
///
/// Identifiers in the report are relative to `root` when the plan lives under
/// it, so the applier (which runs in `root`) resolves them the same way.
#[instrument(skip_all, fields(plans_dir = %plans_dir.display()))]
pub fn select_plans(
    root: &Path,
    plans_dir: &Path,
    lock_sha: Option<&str>,
    formula_columns: &[String],
) -> Result<SelectionReport> {
    let mut report = SelectionReport {
        lock_sha: lock_sha.map(str::to_string),
        ..SelectionReport::default()
    };
    let ready_dir = plans_dir.join(READY_DIR_NAME);

    for path in candidate_plans(plans_dir)? {
        let relative = path.strip_prefix(plans_dir).unwrap_or(&path);
        if relative
            .components()
            .any(|c| c == Component::Normal(OsStr::new(SIGNATURES_DIR_NAME)))
        {
            skip(&mut report, &path, SkipReason::Signatures);
            continue;
        }

        let mut plan: Value = match fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
        {
            Some(plan) => plan,
            None => {
                skip(&mut report, &path, SkipReason::BadJson);
                continue;
            }
        };

        let ready = match check_plan(&plan, lock_sha, formula_columns) {
            Ok(ready) => ready,
            Err(reason) => {
                skip(&mut report, &path, reason);
                continue;
            }
        };

        let listed = if ready.needs_hash {
            let Some(obj) = plan.as_object_mut() else {
                continue;
            };
            obj.insert("plan_hash".to_string(), Value::String(ready.plan_hash));
            let out = ready_dir.join(relative);
            let mut json = serde_json::to_string_pretty(&plan).context("serialize plan")?;
            json.push('\n');
            write_atomic(&out, json.as_bytes())?;
            debug!(plan = %path.display(), out = %out.display(), "wrote plan with plan_hash");
            report.fixed += 1;
            out
        } else {
            path
        };
        report.ready.push(plan_id(root, &listed));
    }

    report.ready.sort();
    report.ready.dedup();
    Ok(report)
}

fn skip(report: &mut SelectionReport, path: &Path, reason: SkipReason) {
    debug!(plan = %path.display(), %reason, "skipped");
    *report.skipped.entry(reason).or_default() += 1;
}

/// Every `*.json` file under `plans_dir`, sorted, excluding our own output.
fn candidate_plans(plans_dir: &Path) -> Result<Vec<PathBuf>> {
    if !plans_dir.is_dir() {
        warn!(plans_dir = %plans_dir.display(), "plans directory missing");
        return Ok(Vec::new());
    }
    let walker = WalkDir::new(plans_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == READY_DIR_NAME));

    let mut plans = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", plans_dir.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            plans.push(entry.into_path());
        }
    }
    plans.sort();
    Ok(plans)
}

fn plan_id(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHA: &str = "abc123";

    fn write_json(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, serde_json::to_string(value).expect("json")).expect("write");
    }

    fn good_plan(cell: &str) -> Value {
        json!({
            "template_sha256": SHA,
            "writes": [{
                "sheet": "SOV",
                "cell": cell,
                "value": 100,
                "source": {"source_type": "pdf", "source_path": "bid.pdf", "locator": "p1"},
                "meta": {"project": "P", "option": "A", "trade": "T", "bucket_code": "B", "line_id": "1"}
            }]
        })
    }

    fn formula_columns() -> Vec<String> {
        vec!["T".to_string()]
    }

    #[test]
    fn selects_ready_plans_and_counts_skips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let plans = root.join("reports");

        let mut hashed = good_plan("B2");
        hashed["plan_hash"] = json!("precomputed");
        write_json(&plans.join("a_hashed.json"), &hashed);
        write_json(&plans.join("b_formula.json"), &good_plan("T2"));
        write_json(&plans.join("signatures/sig.json"), &good_plan("B3"));
        fs::write(plans.join("c_broken.json"), "{not json").expect("write");
        let mut other = good_plan("B4");
        other["template_sha256"] = json!("other");
        write_json(&plans.join("d_other_template.json"), &other);

        let report = select_plans(root, &plans, Some(SHA), &formula_columns()).expect("select");

        assert_eq!(report.ready, vec!["reports/a_hashed.json".to_string()]);
        assert_eq!(report.fixed, 0);
        assert_eq!(report.skipped.get(&SkipReason::FormulaColTarget), Some(&1));
        assert_eq!(report.skipped.get(&SkipReason::Signatures), Some(&1));
        assert_eq!(report.skipped.get(&SkipReason::BadJson), Some(&1));
        assert_eq!(report.skipped.get(&SkipReason::ShaMismatch), Some(&1));
        assert_eq!(report.skipped_total(), 4);
    }

    #[test]
    fn missing_plan_hash_is_fixed_into_ready_dir_and_not_rescanned() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let plans = root.join("reports");
        write_json(&plans.join("nested/plan.json"), &good_plan("B2"));

        let first = select_plans(root, &plans, Some(SHA), &formula_columns()).expect("select");
        assert_eq!(
            first.ready,
            vec!["reports/_batch_ready/nested/plan.json".to_string()]
        );
        assert_eq!(first.fixed, 1);

        let fixed: Value = serde_json::from_str(
            &fs::read_to_string(plans.join("_batch_ready/nested/plan.json")).expect("read"),
        )
        .expect("json");
        let expected = crate::core::plan_check::plan_hash(&good_plan("B2")["writes"]);
        assert_eq!(fixed["plan_hash"], json!(expected));

        let second = select_plans(root, &plans, Some(SHA), &formula_columns()).expect("select");
        assert_eq!(second, first);
    }

    #[test]
    fn same_named_plans_in_different_dirs_are_both_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let plans = root.join("reports");
        write_json(&plans.join("a/plan.json"), &good_plan("B2"));
        write_json(&plans.join("b/plan.json"), &good_plan("C3"));

        let report = select_plans(root, &plans, Some(SHA), &formula_columns()).expect("select");

        assert_eq!(
            report.ready,
            vec![
                "reports/_batch_ready/a/plan.json".to_string(),
                "reports/_batch_ready/b/plan.json".to_string(),
            ]
        );
        assert_eq!(report.fixed, report.ready.len());
        for (dir, cell) in [("a", "B2"), ("b", "C3")] {
            let fixed: Value = serde_json::from_str(
                &fs::read_to_string(plans.join(READY_DIR_NAME).join(dir).join("plan.json"))
                    .expect("read"),
            )
            .expect("json");
            assert_eq!(fixed["writes"][0]["cell"], json!(cell));
        }
    }

    #[test]
    fn lock_must_be_an_object() {
        let temp = tempfile::tempdir().expect("tempdir");
        let lock = temp.path().join("lock.json");
        fs::write(&lock, "[1, 2]").expect("write");
        assert!(read_lock_fingerprint(&lock).is_err());

        fs::write(&lock, r#"{"template": {"sha256": "feed"}}"#).expect("write");
        assert_eq!(
            read_lock_fingerprint(&lock).expect("read"),
            Some("feed".to_string())
        );
    }

    #[test]
    fn missing_plans_dir_selects_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report =
            select_plans(temp.path(), &temp.path().join("absent"), None, &formula_columns())
                .expect("select");
        assert!(report.ready.is_empty());
        assert_eq!(report.skipped_total(), 0);
    }
}
