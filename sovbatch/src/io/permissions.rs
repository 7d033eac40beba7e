//! Permission hardening for the applier's sensitive files.
//!
//! The guard is fail-fast: the first missing or mismatching file aborts the
//! check and the remaining files are not inspected.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::error::{PreconditionError, PreconditionKind};

/// Read+execute for owner, group and other; no write bits.
pub const HARDENED_MODE: u32 = 0o555;

#[derive(Debug, Clone)]
pub struct PermissionGuard {
    files: Vec<PathBuf>,
    mode: u32,
}

impl PermissionGuard {
    pub fn new(files: Vec<PathBuf>, mode: u32) -> Self {
        Self { files, mode }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    #[instrument(skip_all, fields(files = self.files.len(), mode = %format!("{:o}", self.mode)))]
    pub fn check(&self) -> Result<()> {
        for file in &self.files {
            let actual = file_mode(file)?;
            if actual != self.mode {
                warn!(file = %file.display(), actual = %format!("{actual:o}"), "hardening violation");
                return Err(PreconditionError::new(
                    PreconditionKind::HardeningViolation,
                    format!(
                        "{} has mode {:o}, expected {:o}",
                        file.display(),
                        actual,
                        self.mode
                    ),
                )
                .into());
            }
            debug!(file = %file.display(), "hardened");
        }
        Ok(())
    }

    /// Set every file to the required mode. Returns the files that changed.
    #[instrument(skip_all)]
    pub fn harden(&self) -> Result<Vec<PathBuf>> {
        let mut changed = Vec::new();
        for file in &self.files {
            let actual = file_mode(file)?;
            if actual == self.mode {
                continue;
            }
            set_mode(file, self.mode)?;
            info!(file = %file.display(), from = %format!("{actual:o}"), to = %format!("{:o}", self.mode), "hardened file");
            changed.push(file.clone());
        }
        Ok(changed)
    }
}

/// Permission bits (`mode & 0o777`) of an existing file.
pub fn file_mode(path: &Path) -> Result<u32> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PreconditionError::new(
                PreconditionKind::MissingFile,
                format!("hardened file not found: {}", path.display()),
            )
            .into());
        }
        Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
    };
    Ok(mode_bits(&meta.permissions()))
}

#[cfg(unix)]
fn mode_bits(perms: &fs::Permissions) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    perms.mode() & 0o777
}

// Only the read-only flag is visible off unix; report it as 555 vs 755.
#[cfg(not(unix))]
fn mode_bits(perms: &fs::Permissions) -> u32 {
    if perms.readonly() { 0o555 } else { 0o755 }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod {:o} {}", mode, path.display()))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms).with_context(|| format!("set permissions {}", path.display()))
}
