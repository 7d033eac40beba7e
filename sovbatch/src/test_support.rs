//! Test-only helpers: a throwaway git repository and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::outcome::ApplyOutcome;
use crate::error::{PreconditionError, PreconditionKind};
use crate::io::applier::{ApplyReport, ApplyRequest, PlanApplier};
use crate::io::git::Git;
use crate::io::guards::Preflight;

/// A git repository in a temp dir with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        fs::write(repo.path().join("README.md"), "hi\n").context("write README")?;
        repo.commit_all("chore: init")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stage everything and commit it.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        let git = Git::new(self.path());
        git.add_all()?;
        git.commit_staged(message)?;
        Ok(())
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .status()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !status.success() {
            return Err(anyhow!("git {} failed", args.join(" ")));
        }
        Ok(())
    }
}

/// Write `name` under `dir` and set its permission bits.
#[cfg(unix)]
pub fn write_with_mode(dir: &Path, name: &str, mode: u32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, "#!/usr/bin/env python3\n").expect("write file");
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
    path
}

/// Applier that returns queued outcomes instead of spawning a process.
///
/// An `Applied` outcome also writes the artifact and audit files, with the
/// plan id as the artifact contents.
#[derive(Debug, Default)]
pub struct ScriptedApplier {
    outcomes: RefCell<VecDeque<ApplyOutcome>>,
    requests: RefCell<Vec<ApplyRequest>>,
}

impl ScriptedApplier {
    pub fn new(outcomes: Vec<ApplyOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<ApplyRequest> {
        self.requests.borrow().clone()
    }

    pub fn assert_drained(&self) {
        assert!(
            self.outcomes.borrow().is_empty(),
            "unused scripted outcomes: {:?}",
            self.outcomes.borrow()
        );
    }
}

impl PlanApplier for ScriptedApplier {
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyReport> {
        self.requests.borrow_mut().push(request.clone());
        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected apply for {}", request.plan))?;

        let output = match outcome {
            ApplyOutcome::Applied => {
                fs::write(&request.out_xlsm, &request.plan).context("write artifact")?;
                fs::write(&request.audit_jsonl, "{}\n").context("write audit")?;
                "Writes applied: 1\n"
            }
            ApplyOutcome::NoGo => "NO-GO (scripted)\n",
            ApplyOutcome::Aborted => "Aborted (scripted)\n",
            ApplyOutcome::Mismatch => "template sha mismatch (scripted)\n",
            ApplyOutcome::FormulaTarget => "FORMULA COLUMN TARGET (scripted)\n",
            ApplyOutcome::Failed => "Traceback (scripted)\n",
        };
        Ok(ApplyReport {
            outcome,
            exit_code: Some(if outcome.is_success() { 0 } else { 2 }),
            output: output.to_string(),
        })
    }
}

/// Preflight that passes until a chosen call, which fails with `kind`.
#[derive(Debug)]
pub struct ScriptedPreflight {
    fail_on: Option<(usize, PreconditionKind)>,
    calls: Cell<usize>,
}

impl ScriptedPreflight {
    pub fn passing() -> Self {
        Self {
            fail_on: None,
            calls: Cell::new(0),
        }
    }

    /// Fail on the `call`-th check (1-based).
    pub fn failing_on(call: usize, kind: PreconditionKind) -> Self {
        Self {
            fail_on: Some((call, kind)),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Preflight for ScriptedPreflight {
    fn check(&self) -> Result<()> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        match self.fail_on {
            Some((n, kind)) if n == call => {
                Err(PreconditionError::new(kind, "scripted failure").into())
            }
            _ => Ok(()),
        }
    }
}
