//! Scaffolding for a new pipeline workspace (`sovbatch init`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::io::config::{
    BatchConfig, CONFIG_FILE_NAME, DEFAULT_REPORTS_DIR, DEFAULT_SCHEMA_DIR, write_config,
};
use crate::io::fs::write_atomic;

/// Canonical paths of a workspace rooted at `root`.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub reports_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            reports_dir: root.join(DEFAULT_REPORTS_DIR),
            schema_dir: root.join(DEFAULT_SCHEMA_DIR),
            config_path: root.join(CONFIG_FILE_NAME),
            gitignore_path: root.join(".gitignore"),
            root,
        }
    }
}

/// Generated files that must never be committed.
const IGNORED_LINES: [&str; 5] = [
    "reports/.sovbatch.lock",
    "reports/APPLIED_HARDENED_*",
    "reports/BATCH_READY.txt",
    "reports/BATCH_RUN_*.log",
    "reports/_batch_ready/",
];

/// Create the reports and schema directories, a default config and the
/// `.gitignore` entries.
///
/// Refuses to replace an existing `sovbatch.toml` unless `force` is set.
/// Existing `.gitignore` lines are kept.
pub fn init_workspace(root: &Path, force: bool) -> Result<WorkspacePaths> {
    let paths = WorkspacePaths::new(root);
    if paths.config_path.exists() && !force {
        return Err(anyhow!(
            "init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    create_dir(&paths.reports_dir)?;
    create_dir(&paths.schema_dir)?;

    let config = BatchConfig {
        lock: Some(PathBuf::from(DEFAULT_SCHEMA_DIR).join("lock.json")),
        ..BatchConfig::default()
    };
    write_config(&paths.config_path, &config)?;
    ensure_gitignore(&paths.gitignore_path)?;

    info!(root = %paths.root.display(), "workspace initialized");
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn ensure_gitignore(path: &Path) -> Result<()> {
    let existing = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
    } else {
        String::new()
    };

    let mut out = existing.clone();
    let mut missing = IGNORED_LINES
        .iter()
        .filter(|line| !existing.lines().any(|l| l.trim() == **line))
        .peekable();
    if missing.peek().is_none() {
        debug!(path = %path.display(), "gitignore already complete");
        return Ok(());
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for line in missing {
        out.push_str(line);
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), false).expect("init");

        assert!(paths.reports_dir.is_dir());
        assert!(paths.schema_dir.is_dir());
        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg.lock, Some(PathBuf::from("schema/lock.json")));

        let gitignore = fs::read_to_string(&paths.gitignore_path).expect("read");
        for line in IGNORED_LINES {
            assert!(gitignore.lines().any(|l| l == line), "missing {line}");
        }
    }

    #[test]
    fn init_without_force_refuses_existing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_workspace(temp.path(), false).expect("init");
        let err = init_workspace(temp.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn force_rewrites_config_and_keeps_user_gitignore_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = WorkspacePaths::new(temp.path());
        fs::write(&paths.gitignore_path, "target/").expect("write");
        fs::write(&paths.config_path, "reports_dir = \"elsewhere\"\n").expect("write");

        init_workspace(temp.path(), true).expect("init");
        init_workspace(temp.path(), true).expect("re-init");

        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg.reports_dir, PathBuf::from(DEFAULT_REPORTS_DIR));
        let gitignore = fs::read_to_string(&paths.gitignore_path).expect("read");
        assert!(gitignore.starts_with("target/\n"));
        assert_eq!(
            gitignore.lines().filter(|l| *l == "reports/BATCH_RUN_*.log").count(),
            1
        );
    }
}
