//! Single-writer lock on the reports directory.
//!
//! Held for the whole batch. The lock is an OS advisory lock, so a crashed
//! run never leaves a stale lock behind; the file itself may linger.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{PreconditionError, PreconditionKind};

pub const LOCK_FILE_NAME: &str = ".sovbatch.lock";

#[derive(Debug)]
pub struct BatchLock {
    file: File,
    path: PathBuf,
}

impl BatchLock {
    /// Take the lock in `reports_dir`, failing with `BatchLocked` if another
    /// batch holds it.
    pub fn acquire(reports_dir: &Path) -> Result<Self> {
        fs::create_dir_all(reports_dir)
            .with_context(|| format!("create directory {}", reports_dir.display()))?;
        let path = reports_dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;

        if let Err(err) = FileExt::try_lock_exclusive(&file) {
            if err.kind() == fs2::lock_contended_error().kind() {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                warn!(path = %path.display(), holder = %holder.trim(), "batch lock held");
                return Err(PreconditionError::new(
                    PreconditionKind::BatchLocked,
                    format!(
                        "another batch is running ({}): {}",
                        holder.trim(),
                        path.display()
                    ),
                )
                .into());
            }
            return Err(err).with_context(|| format!("lock {}", path.display()));
        }

        file.set_len(0)
            .and_then(|()| writeln!(file, "pid={}", std::process::id()))
            .with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "batch lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BatchLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %err, "failed to release batch lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::precondition_of;

    #[test]
    fn second_holder_is_refused_until_release() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = BatchLock::acquire(temp.path()).expect("first");
        assert!(first.path().ends_with(LOCK_FILE_NAME));

        let err = BatchLock::acquire(temp.path()).unwrap_err();
        assert_eq!(
            precondition_of(&err).map(|p| p.kind),
            Some(PreconditionKind::BatchLocked)
        );

        drop(first);
        BatchLock::acquire(temp.path()).expect("after release");
    }
}
