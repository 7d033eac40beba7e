//! Promote the newest applied artifact to the GOLD copy and the LATEST link.
//!
//! Promotion is re-derived from a directory scan every time, so running it
//! twice without a new artifact leaves GOLD, LATEST and the record unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::artifact::{
    ArtifactName, GOLD_NAME, LATEST_NAME, PROMOTION_RECORD_NAME, newest_artifact,
    parse_artifact_name,
};
use crate::io::fs::{copy_atomic, file_sha256, write_atomic};

/// Which artifact GOLD and LATEST currently stand for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    /// File name of the promoted artifact, relative to the reports directory.
    pub source: String,
    pub stamp: String,
    /// SHA-256 of the artifact (and therefore of GOLD).
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct Promotion {
    pub record: PromotionRecord,
    pub gold: PathBuf,
    pub latest: PathBuf,
}

/// Scan `reports_dir` for the newest `APPLIED_HARDENED_<stamp>.xlsm`.
pub fn find_newest_artifact(reports_dir: &Path) -> Result<Option<ArtifactName>> {
    Ok(newest_artifact(list_names(reports_dir)?))
}

/// Count of applied artifacts (aliases excluded).
pub fn count_artifacts(reports_dir: &Path) -> Result<usize> {
    Ok(list_names(reports_dir)?
        .iter()
        .filter(|name| parse_artifact_name(name).is_some())
        .count())
}

fn list_names(reports_dir: &Path) -> Result<Vec<String>> {
    if !reports_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in
        fs::read_dir(reports_dir).with_context(|| format!("read {}", reports_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.file_type().context("stat entry")?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Publish the newest artifact as GOLD (copy) and LATEST (symlink).
///
/// Fails with "nothing to promote" when no artifact exists.
#[instrument(skip_all, fields(reports_dir = %reports_dir.display()))]
pub fn promote(reports_dir: &Path) -> Result<Promotion> {
    let newest = find_newest_artifact(reports_dir)?.ok_or_else(|| {
        anyhow!(
            "nothing to promote: no APPLIED_HARDENED_<stamp>.xlsm in {}",
            reports_dir.display()
        )
    })?;
    let source = reports_dir.join(&newest.file_name);
    debug!(source = %newest.file_name, "promoting");

    let gold = reports_dir.join(GOLD_NAME);
    copy_atomic(&source, &gold).context("snapshot GOLD")?;

    let latest = reports_dir.join(LATEST_NAME);
    point_latest(&latest, &newest.file_name).context("repoint LATEST")?;

    let record = PromotionRecord {
        source: newest.file_name.clone(),
        stamp: newest.stamp.to_string(),
        sha256: file_sha256(&gold)?,
    };
    let mut json = serde_json::to_string_pretty(&record).context("serialize promotion record")?;
    json.push('\n');
    write_atomic(&reports_dir.join(PROMOTION_RECORD_NAME), json.as_bytes())?;

    info!(source = %record.source, sha256 = %record.sha256, "promoted");
    Ok(Promotion {
        record,
        gold,
        latest,
    })
}

/// Read the promotion record, if one was written.
pub fn read_record(reports_dir: &Path) -> Result<Option<PromotionRecord>> {
    let path = reports_dir.join(PROMOTION_RECORD_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let record =
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(record))
}

/// Target of the LATEST link, if it is a symlink.
pub fn latest_target(reports_dir: &Path) -> Option<PathBuf> {
    fs::read_link(reports_dir.join(LATEST_NAME)).ok()
}

// The link target is the bare file name so the reports directory can move.
#[cfg(unix)]
fn point_latest(latest: &Path, target_name: &str) -> Result<()> {
    let tmp = crate::io::fs::tmp_sibling(latest);
    if fs::symlink_metadata(&tmp).is_ok() {
        fs::remove_file(&tmp).with_context(|| format!("remove stale {}", tmp.display()))?;
    }
    std::os::unix::fs::symlink(target_name, &tmp)
        .with_context(|| format!("symlink {} -> {}", tmp.display(), target_name))?;
    fs::rename(&tmp, latest).with_context(|| format!("replace {}", latest.display()))?;
    Ok(())
}

// Symlinks need extra privileges on Windows; LATEST becomes a second copy.
#[cfg(not(unix))]
fn point_latest(latest: &Path, target_name: &str) -> Result<()> {
    let source = latest
        .parent()
        .map(|dir| dir.join(target_name))
        .ok_or_else(|| anyhow!("LATEST has no parent directory"))?;
    copy_atomic(&source, latest)
}
