//! Plan applier abstraction.
//!
//! The [`PlanApplier`] trait decouples the apply wrapper and batch loop from
//! the external applier program. Tests use scripted appliers that return
//! predetermined outputs without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::outcome::{ApplyOutcome, classify_apply};
use crate::error::{PreconditionError, PreconditionKind};
use crate::io::config::Settings;
use crate::io::process::run_command;

/// Environment switch the hardened applier requires before it will write.
pub const HARDENED_APPLY_ENV: &str = "TCL_HARDENED_APPLY";

/// Parameters for one applier invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    /// Working directory for the applier process (the project root).
    pub workdir: PathBuf,
    /// Plan identifier, passed through verbatim.
    pub plan: String,
    pub template: PathBuf,
    pub lock: PathBuf,
    /// Fresh, uniquely stamped artifact path.
    pub out_xlsm: PathBuf,
    /// Fresh, uniquely stamped audit-log path.
    pub audit_jsonl: PathBuf,
}

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Abstraction over applier backends.
pub trait PlanApplier {
    /// Precondition check run once before any plan is applied.
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    /// Fail only when the applier could not be run at all. A run that reports
    /// failure is an `Ok` report with a non-applied outcome.
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyReport>;
}

/// Applier that spawns `<program> [script] [extra_args] --plan ... --audit-jsonl ...`.
#[derive(Debug, Clone)]
pub struct CommandApplier {
    program: String,
    script: Option<PathBuf>,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl CommandApplier {
    pub fn from_settings(settings: &Settings) -> Self {
        let apply = &settings.config.apply;
        Self {
            program: apply.program.clone(),
            script: apply.script.as_deref().map(|p| settings.root.join(p)),
            extra_args: apply.extra_args.clone(),
            timeout: apply.timeout_secs.map(Duration::from_secs),
            output_limit_bytes: apply.output_limit_bytes,
        }
    }

    pub fn new(program: impl Into<String>, script: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script,
            extra_args: Vec::new(),
            timeout: None,
            output_limit_bytes: 1_000_000,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, request: &ApplyRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.args(&self.extra_args)
            .arg("--plan")
            .arg(&request.plan)
            .arg("--template")
            .arg(&request.template)
            .arg("--lock")
            .arg(&request.lock)
            .arg("--out-xlsm")
            .arg(&request.out_xlsm)
            .arg("--audit-jsonl")
            .arg(&request.audit_jsonl)
            .env(HARDENED_APPLY_ENV, "1")
            .current_dir(&request.workdir);
        cmd
    }
}

impl PlanApplier for CommandApplier {
    /// Fail with `MissingApplier` unless the configured script exists.
    fn ensure_available(&self) -> Result<()> {
        if let Some(script) = &self.script {
            if !script.is_file() {
                return Err(PreconditionError::new(
                    PreconditionKind::MissingApplier,
                    format!("applier script not found: {}", script.display()),
                )
                .into());
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(plan = %request.plan))]
    fn apply(&self, request: &ApplyRequest) -> Result<ApplyReport> {
        self.ensure_available()?;
        info!(program = %self.program, "starting applier");

        let output = match run_command(self.command(request), self.timeout, self.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err) => {
                let not_found = err
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound);
                if not_found {
                    return Err(PreconditionError::new(
                        PreconditionKind::MissingApplier,
                        format!("applier program not found: {}", self.program),
                    )
                    .into());
                }
                return Err(err).with_context(|| format!("run applier {}", self.program));
            }
        };

        let text = output.combined_text();
        let outcome = classify_apply(output.success(), &text);
        if outcome.is_success() {
            debug!("applier completed");
        } else {
            warn!(%outcome, exit_code = ?output.status.code(), timed_out = output.timed_out, "applier did not apply");
        }
        Ok(ApplyReport {
            outcome,
            exit_code: output.status.code(),
            output: text,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::precondition_of;
    use std::fs;

    fn request(root: &std::path::Path) -> ApplyRequest {
        ApplyRequest {
            workdir: root.to_path_buf(),
            plan: "reports/plan_a.json".to_string(),
            template: root.join("tpl.xlsm"),
            lock: root.join("schema/lock.json"),
            out_xlsm: root.join("reports/out.xlsm"),
            audit_jsonl: root.join("reports/out.audit.jsonl"),
        }
    }

    fn script(root: &std::path::Path, body: &str) -> PathBuf {
        let path = root.join("fake_apply.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        path
    }

    #[test]
    fn passes_named_arguments_and_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = script(
            temp.path(),
            "echo \"args: $*\"\necho \"env: $TCL_HARDENED_APPLY\"\necho 'Writes applied: 2'",
        );
        let applier = CommandApplier::new("sh", Some(path));
        let report = applier.apply(&request(temp.path())).expect("apply");

        assert_eq!(report.outcome, ApplyOutcome::Applied);
        assert_eq!(report.exit_code, Some(0));
        assert!(report.output.contains("--plan reports/plan_a.json --template"));
        assert!(report.output.contains("--audit-jsonl"));
        assert!(report.output.contains("env: 1"));
    }

    #[test]
    fn failing_applier_is_an_ok_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = script(temp.path(), "echo 'NO-GO (plan validation failed)'\nexit 2");
        let report = CommandApplier::new("sh", Some(path))
            .apply(&request(temp.path()))
            .expect("apply");
        assert_eq!(report.outcome, ApplyOutcome::NoGo);
        assert_eq!(report.exit_code, Some(2));
    }

    #[test]
    fn missing_script_is_a_precondition() {
        let temp = tempfile::tempdir().expect("tempdir");
        let applier = CommandApplier::new("sh", Some(temp.path().join("absent.py")));
        let err = applier.apply(&request(temp.path())).unwrap_err();
        assert_eq!(
            precondition_of(&err).map(|p| p.kind),
            Some(PreconditionKind::MissingApplier)
        );
    }

    #[test]
    fn missing_program_is_a_precondition() {
        let temp = tempfile::tempdir().expect("tempdir");
        let applier = CommandApplier::new("sovbatch-no-such-program", None);
        let err = applier.apply(&request(temp.path())).unwrap_err();
        assert_eq!(
            precondition_of(&err).map(|p| p.kind),
            Some(PreconditionKind::MissingApplier)
        );
    }

    #[test]
    fn timeout_is_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = script(temp.path(), "exec sleep 5");
        let report = CommandApplier::new("sh", Some(path))
            .with_timeout(Duration::from_millis(100))
            .apply(&request(temp.path()))
            .expect("apply");
        assert_eq!(report.outcome, ApplyOutcome::Failed);
    }
}
