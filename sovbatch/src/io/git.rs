//! Git adapter and the clean-worktree guard.
//!
//! Every apply must start from a committed tree, so we keep a small, explicit
//! wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::error::{PreconditionError, PreconditionKind};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True if the workdir is inside a git work tree.
    pub fn is_work_tree(&self) -> Result<bool> {
        let output = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    /// Status entries in porcelain format.
    ///
    /// Tracked changes are always listed. Untracked files are listed only when
    /// `include_untracked` is set, minus anything under `untracked_excludes`
    /// (paths relative to the workdir).
    pub fn status_porcelain(
        &self,
        include_untracked: bool,
        untracked_excludes: &[PathBuf],
    ) -> Result<Vec<StatusEntry>> {
        let mut entries = self.status_entries(&["status", "--porcelain=v1", "-uno"])?;
        if include_untracked {
            let excludes: Vec<String> = untracked_excludes
                .iter()
                .map(|p| format!(":(exclude){}", p.display()))
                .collect();
            let mut args = vec!["status", "--porcelain=v1", "-uall", "--", ":/"];
            args.extend(excludes.iter().map(String::as_str));
            entries.extend(
                self.status_entries(&args)?
                    .into_iter()
                    .filter(|e| e.code == "??"),
            );
        }
        Ok(entries)
    }

    fn status_entries(&self, args: &[&str]) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(args)?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Refuses to proceed unless the work tree has no uncommitted changes.
#[derive(Debug, Clone)]
pub struct GitCleanGuard {
    git: Git,
    include_untracked: bool,
    untracked_excludes: Vec<PathBuf>,
}

impl GitCleanGuard {
    pub fn new(workdir: impl Into<PathBuf>, include_untracked: bool) -> Self {
        Self {
            git: Git::new(workdir),
            include_untracked,
            untracked_excludes: Vec::new(),
        }
    }

    /// Leave untracked files under `dir` (relative to the workdir) out of the check.
    pub fn exclude_untracked(mut self, dir: impl Into<PathBuf>) -> Self {
        self.untracked_excludes.push(dir.into());
        self
    }

    /// Fail with `NotARepository` or `DirtyWorktree` (listing every changed path).
    #[instrument(skip_all, fields(workdir = %self.git.workdir().display()))]
    pub fn check(&self) -> Result<()> {
        if !self.git.is_work_tree()? {
            warn!("not a git repository");
            return Err(PreconditionError::new(
                PreconditionKind::NotARepository,
                format!("{} is not a git repository", self.git.workdir().display()),
            )
            .into());
        }
        let entries = self
            .git
            .status_porcelain(self.include_untracked, &self.untracked_excludes)?;
        if entries.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(changed = entries.len(), "worktree not clean");
        let mut msg = String::from("uncommitted changes:");
        for entry in entries {
            msg.push_str(&format!("\n{} {}", entry.code, entry.path));
        }
        Err(PreconditionError::new(PreconditionKind::DirtyWorktree, msg).into())
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
