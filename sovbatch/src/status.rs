//! `sovbatch status`: a read-only view of the reports directory.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::artifact::GOLD_NAME;
use crate::core::ready_list::normalize_ready_list;
use crate::io::config::Settings;
use crate::io::fs::file_sha256;
use crate::io::promotion::{
    PromotionRecord, count_artifacts, find_newest_artifact, latest_target, read_record,
};
use crate::io::run_log::{latest_run_log, read_summary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub ready_list: PathBuf,
    /// Normalized entry count; `None` when the file is missing.
    pub ready_count: Option<usize>,
    pub artifacts: usize,
    pub newest_artifact: Option<String>,
    pub run_log: Option<PathBuf>,
    pub run_summary: Option<String>,
    pub gold_present: bool,
    pub latest_target: Option<PathBuf>,
    pub record: Option<PromotionRecord>,
    /// Whether GOLD's hash equals the record's; `None` without both.
    pub gold_matches_record: Option<bool>,
}

pub fn collect_status(settings: &Settings) -> Result<StatusReport> {
    let reports = &settings.reports_dir;
    let ready_count = if settings.ready_list.is_file() {
        let raw = fs::read_to_string(&settings.ready_list)
            .with_context(|| format!("read {}", settings.ready_list.display()))?;
        Some(normalize_ready_list(&raw).len())
    } else {
        None
    };

    let run_log = latest_run_log(reports)?;
    let run_summary = match &run_log {
        Some(path) => read_summary(path)?,
        None => None,
    };

    let gold = reports.join(GOLD_NAME);
    let gold_present = gold.is_file();
    let record = read_record(reports)?;
    let gold_matches_record = match (&record, gold_present) {
        (Some(record), true) => Some(file_sha256(&gold)? == record.sha256),
        _ => None,
    };

    Ok(StatusReport {
        ready_list: settings.ready_list.clone(),
        ready_count,
        artifacts: count_artifacts(reports)?,
        newest_artifact: find_newest_artifact(reports)?.map(|a| a.file_name),
        run_log,
        run_summary,
        gold_present,
        latest_target: latest_target(reports),
        record,
        gold_matches_record,
    })
}

fn or_none<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ready = match self.ready_count {
            Some(n) => n.to_string(),
            None => "missing".to_string(),
        };
        writeln!(f, "ready_list: {} ({ready})", self.ready_list.display())?;
        writeln!(f, "artifacts: {}", self.artifacts)?;
        writeln!(f, "newest: {}", or_none(self.newest_artifact.as_deref()))?;
        writeln!(
            f,
            "run_log: {}",
            or_none(self.run_log.as_ref().map(|p| p.display()))
        )?;
        writeln!(f, "summary: {}", or_none(self.run_summary.as_deref()))?;
        writeln!(
            f,
            "gold: {}",
            match self.gold_matches_record {
                Some(true) => "present, matches record",
                Some(false) => "present, DIFFERS from record",
                None if self.gold_present => "present, no record",
                None => "absent",
            }
        )?;
        write!(
            f,
            "latest: {}",
            or_none(self.latest_target.as_ref().map(|p| p.display()))
        )
    }
}
