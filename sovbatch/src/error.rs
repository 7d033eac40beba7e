//! Precondition failures that map to exit code 2.
//!
//! Everything else travels as a plain `anyhow::Error` and exits with 1. A
//! [`PreconditionError`] survives `.context(...)` wrapping, so callers recover
//! it with `err.downcast_ref::<PreconditionError>()`.

use std::fmt;

use crate::exit_codes;

/// Category of a failed precondition. Each has a short tag for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionKind {
    /// The working directory is not inside a git work tree.
    NotARepository,
    /// Tracked files have uncommitted changes.
    DirtyWorktree,
    /// A hardened file's mode deviates from the required value.
    HardeningViolation,
    /// A required input file (template, lock, plan, hardened file) is missing.
    MissingFile,
    /// The applier program or script cannot be found.
    MissingApplier,
    /// A required setting (`LOCK`, `TPL`, `PLAN`) was not provided.
    MissingSetting,
    /// Another batch holds the reports-directory lock.
    BatchLocked,
}

impl PreconditionKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::NotARepository => "not-a-repo",
            Self::DirtyWorktree => "dirty-tree",
            Self::HardeningViolation => "hardening",
            Self::MissingFile => "missing-file",
            Self::MissingApplier => "missing-applier",
            Self::MissingSetting => "missing-setting",
            Self::BatchLocked => "batch-locked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionError {
    pub kind: PreconditionKind,
    pub detail: String,
}

impl PreconditionError {
    pub fn new(kind: PreconditionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.tag(), self.detail)
    }
}

impl std::error::Error for PreconditionError {}

/// Precondition carried by `err`, if any.
pub fn precondition_of(err: &anyhow::Error) -> Option<&PreconditionError> {
    err.downcast_ref::<PreconditionError>()
}

/// Exit code for an error returned by a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if precondition_of(err).is_some() {
        exit_codes::PRECONDITION
    } else {
        exit_codes::FAILURE
    }
}
