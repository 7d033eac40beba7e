//! Per-run batch log (`BATCH_RUN_<stamp>.log`).
//!
//! The log is append-only and flushed after every entry, so an interrupted
//! run still leaves every completed plan on disk.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::artifact::{parse_run_log_name, run_log_file_name};
use crate::core::outcome::BatchTally;
use crate::core::stamp::Stamp;
use crate::io::applier::ApplyReport;

pub const SEPARATOR: &str =
    "============================================================";
pub const PLAN_PREFIX: &str = "PLAN: ";
pub const SUMMARY_PREFIX: &str = "SUMMARY ";

#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Create a new log in `dir`. Never reuses an existing file.
    pub fn create(dir: &Path, stamp: &Stamp) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
        let path = dir.join(run_log_file_name(stamp));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("create run log {}", path.display()))?;
        debug!(path = %path.display(), "run log created");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame one plan's invocation: separator, `PLAN: <id>`, output, outcome.
    pub fn record_plan(&mut self, plan: &str, report: &ApplyReport) -> Result<()> {
        let mut entry = format!("{SEPARATOR}\n{PLAN_PREFIX}{plan}\n");
        entry.push_str(&report.output);
        if !report.output.is_empty() && !report.output.ends_with('\n') {
            entry.push('\n');
        }
        entry.push_str(&format!(
            "OUTCOME: {} exit={}\n",
            report.outcome,
            report
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));
        self.append(&entry)
    }

    /// Frame a guard or launch failure that stopped the batch at `plan`.
    pub fn record_abort(&mut self, plan: &str, reason: &str) -> Result<()> {
        self.append(&format!(
            "{SEPARATOR}\n{PLAN_PREFIX}{plan}\nABORTED: {reason}\n"
        ))
    }

    pub fn record_summary(&mut self, tally: &BatchTally) -> Result<()> {
        self.append(&format!("{SEPARATOR}\n{}\n", tally.summary_line()))
    }

    fn append(&mut self, text: &str) -> Result<()> {
        self.file
            .write_all(text.as_bytes())
            .and_then(|()| self.file.flush())
            .with_context(|| format!("append run log {}", self.path.display()))
    }
}

/// Newest run log in `dir`, by stamp.
pub fn latest_run_log(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut newest: Option<(Stamp, PathBuf)> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let name = entry.file_name();
        let Some(stamp) = parse_run_log_name(&name.to_string_lossy()) else {
            continue;
        };
        if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
            newest = Some((stamp, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Last summary line of a run log, if the run got that far.
pub fn read_summary(path: &Path) -> Result<Option<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(text
        .lines()
        .rev()
        .find(|line| line.starts_with(SUMMARY_PREFIX))
        .map(str::to_string))
}
