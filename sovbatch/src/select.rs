//! Orchestration for `sovbatch select`.

use anyhow::Result;
use tracing::info;

use crate::core::ready_list::render_ready_list;
use crate::io::config::Settings;
use crate::io::fs::write_atomic;
use crate::io::plan_store::{SelectionReport, read_lock_fingerprint, select_plans};

/// Scan the plans directory against the lock and write the ready list.
pub fn run_select(settings: &Settings) -> Result<SelectionReport> {
    let lock = settings.require_lock()?;
    let lock_sha = read_lock_fingerprint(lock)?;
    let report = select_plans(
        &settings.root,
        &settings.plans_dir,
        lock_sha.as_deref(),
        &settings.config.select.formula_columns,
    )?;
    write_atomic(
        &settings.ready_list,
        render_ready_list(&report.ready).as_bytes(),
    )?;
    info!(
        ready = report.ready.len(),
        skipped = report.skipped_total(),
        fixed = report.fixed,
        ready_list = %settings.ready_list.display(),
        "selection written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::BatchConfig;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn writes_sorted_ready_list_from_scan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("reports")).expect("mkdir");
        fs::write(root.join("lock.json"), r#"{"template_sha256": "s1"}"#).expect("write");
        let plan = |cell: &str| {
            json!({
                "template_sha256": "s1",
                "plan_hash": format!("h-{cell}"),
                "writes": [{
                    "sheet": "SOV", "cell": cell,
                    "source": {"source_type": "pdf", "source_path": "q.pdf", "locator": "p2"},
                    "meta": {"project": "P", "option": "A", "trade": "T", "bucket_code": "B", "line_id": "7"}
                }]
            })
            .to_string()
        };
        fs::write(root.join("reports/zeta.json"), plan("C3")).expect("write");
        fs::write(root.join("reports/alpha.json"), plan("C4")).expect("write");

        let cfg = BatchConfig {
            lock: Some(PathBuf::from("lock.json")),
            ..BatchConfig::default()
        };
        let settings = Settings::resolve(root, cfg).expect("settings");
        let report = run_select(&settings).expect("select");

        assert_eq!(report.lock_sha.as_deref(), Some("s1"));
        assert_eq!(
            fs::read_to_string(&settings.ready_list).expect("read"),
            "reports/alpha.json\nreports/zeta.json\n"
        );
    }
}
