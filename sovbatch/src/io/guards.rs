//! Preflight guards run before every apply.
//!
//! The [`Preflight`] trait decouples the batch loop from the concrete guards.
//! Tests use scripted preflights that fail on a chosen call without touching
//! git or file modes.

use anyhow::Result;
use tracing::instrument;

use crate::io::config::Settings;
use crate::io::git::GitCleanGuard;
use crate::io::permissions::PermissionGuard;

/// A check that must pass immediately before each apply.
pub trait Preflight {
    fn check(&self) -> Result<()>;
}

/// Git-clean check followed by the permission-hardening check.
#[derive(Debug, Clone)]
pub struct ApplyGuards {
    git: GitCleanGuard,
    permissions: PermissionGuard,
}

impl ApplyGuards {
    pub fn new(git: GitCleanGuard, permissions: PermissionGuard) -> Self {
        Self { git, permissions }
    }

    /// Guards for `settings`. Untracked files under the reports directory are
    /// generated by sovbatch itself and never make the tree dirty.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut git = GitCleanGuard::new(&settings.root, settings.config.git.include_untracked);
        if let Ok(reports) = settings.reports_dir.strip_prefix(&settings.root)
            && !reports.as_os_str().is_empty()
        {
            git = git.exclude_untracked(reports);
        }
        Self::new(
            git,
            PermissionGuard::new(settings.hardened_files.clone(), settings.hardened_mode),
        )
    }
}

impl Preflight for ApplyGuards {
    #[instrument(skip_all)]
    fn check(&self) -> Result<()> {
        self.git.check()?;
        self.permissions.check()
    }
}
