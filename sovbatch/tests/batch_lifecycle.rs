//! Lifecycle tests: select, batch, promote, and status across successive runs.
//!
//! The applier and guards are scripted, so these tests exercise orchestration
//! and the reports directory without spawning processes.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use sovbatch::batch::{BatchOptions, PromotionState, run_batch};
use sovbatch::core::artifact::{GOLD_NAME, LATEST_NAME};
use sovbatch::core::outcome::ApplyOutcome;
use sovbatch::io::config::{BatchConfig, Settings};
use sovbatch::io::promotion::{latest_target, promote};
use sovbatch::select::run_select;
use sovbatch::status::collect_status;
use sovbatch::test_support::{ScriptedApplier, ScriptedPreflight};

fn settings(root: &Path) -> Settings {
    fs::create_dir_all(root.join("reports")).expect("mkdir");
    fs::write(root.join("tpl.xlsm"), "template").expect("write");
    fs::write(root.join("lock.json"), r#"{"template_sha256": "s1"}"#).expect("write");
    let cfg = BatchConfig {
        template: Some(PathBuf::from("tpl.xlsm")),
        lock: Some(PathBuf::from("lock.json")),
        ..BatchConfig::default()
    };
    Settings::resolve(root, cfg).expect("settings")
}

fn write_plan(root: &Path, name: &str, cell: &str) {
    let plan = json!({
        "template_sha256": "s1",
        "writes": [{
            "sheet": "SOV",
            "cell": cell,
            "source": {"source_type": "pdf", "source_path": "quote.pdf", "locator": "p1"},
            "meta": {"project": "P", "option": "A", "trade": "T", "bucket_code": "B", "line_id": "1"}
        }]
    });
    fs::write(root.join("reports").join(name), plan.to_string()).expect("write plan");
}

fn run(settings: &Settings, outcomes: Vec<ApplyOutcome>) -> sovbatch::batch::BatchSummary {
    let applier = ScriptedApplier::new(outcomes);
    let summary = run_batch(
        settings,
        &ScriptedPreflight::passing(),
        &applier,
        BatchOptions::default(),
    )
    .expect("batch");
    applier.assert_drained();
    summary
}

#[test]
fn select_then_batch_then_second_batch_moves_gold() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = settings(temp.path());
    write_plan(temp.path(), "p1.json", "B2");
    write_plan(temp.path(), "p2.json", "T9");
    write_plan(temp.path(), "p3.json", "C3");

    let selection = run_select(&settings).expect("select");
    assert_eq!(selection.ready.len(), 2);
    assert_eq!(selection.fixed, 2);

    let first = run(&settings, vec![ApplyOutcome::Applied, ApplyOutcome::NoGo]);
    assert_eq!(
        first.tally.summary_line(),
        "SUMMARY plans=2 OK_count=1 FAIL_count=1"
    );
    let PromotionState::Promoted(first_promotion) = first.promotion else {
        panic!("expected promotion");
    };
    let gold = settings.reports_dir.join(GOLD_NAME);
    assert_eq!(
        fs::read_to_string(&gold).expect("gold"),
        "reports/_batch_ready/p1.json"
    );

    let second = run(&settings, vec![ApplyOutcome::Failed, ApplyOutcome::Applied]);
    let PromotionState::Promoted(second_promotion) = second.promotion else {
        panic!("expected promotion");
    };
    assert!(second_promotion.record.stamp > first_promotion.record.stamp);
    assert_eq!(
        fs::read_to_string(&gold).expect("gold"),
        "reports/_batch_ready/p3.json"
    );
    assert_eq!(
        latest_target(&settings.reports_dir),
        Some(PathBuf::from(&second_promotion.record.source))
    );
    assert_ne!(first.run_log, second.run_log);

    let status = collect_status(&settings).expect("status");
    assert_eq!(status.artifacts, 2);
    assert_eq!(status.ready_count, Some(2));
    assert_eq!(
        status.run_summary.as_deref(),
        Some("SUMMARY plans=2 OK_count=1 FAIL_count=1")
    );
    assert_eq!(status.gold_matches_record, Some(true));
}

#[test]
fn repromote_without_new_artifact_is_stable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = settings(temp.path());
    fs::write(&settings.ready_list, "P1\n").expect("write");
    run(&settings, vec![ApplyOutcome::Applied]);

    let gold_before = fs::read(settings.reports_dir.join(GOLD_NAME)).expect("gold");
    let target_before = latest_target(&settings.reports_dir);
    let again = promote(&settings.reports_dir).expect("promote");

    assert_eq!(
        fs::read(settings.reports_dir.join(GOLD_NAME)).expect("gold"),
        gold_before
    );
    assert_eq!(latest_target(&settings.reports_dir), target_before);
    assert_eq!(
        fs::read_to_string(settings.reports_dir.join(LATEST_NAME)).expect("latest"),
        "P1"
    );
    assert_eq!(Some(PathBuf::from(&again.record.source)), target_before);
}

#[test]
fn duplicate_and_blank_ready_entries_run_once_each() {
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = settings(temp.path());
    fs::write(&settings.ready_list, "  b \n\na\nb\n\t\na\n").expect("write");

    let summary = run(&settings, vec![ApplyOutcome::Applied, ApplyOutcome::Applied]);

    let plans: Vec<_> = summary.results.iter().map(|r| r.plan.as_str()).collect();
    assert_eq!(plans, ["a", "b"]);
    assert_eq!(summary.tally.plans, 2);
}
