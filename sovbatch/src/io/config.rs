//! Configuration stored in `sovbatch.toml`, with environment overrides.
//!
//! Resolution order: built-in defaults, then the TOML file (if present), then
//! environment variables (`REPORTS_DIR`, `READY_LIST`, `LOCK`, `TPL`), then
//! CLI flags applied by the caller.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::artifact::READY_LIST_NAME;
use crate::error::{PreconditionError, PreconditionKind};
use crate::io::fs::write_atomic;

pub const CONFIG_FILE_NAME: &str = "sovbatch.toml";
pub const DEFAULT_REPORTS_DIR: &str = "reports";
pub const DEFAULT_SCHEMA_DIR: &str = "schema";

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
/// Relative paths are resolved against the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory holding ready lists, run logs, artifacts and aliases.
    pub reports_dir: PathBuf,

    /// Ready-list file. Defaults to `<reports_dir>/BATCH_READY.txt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_list: Option<PathBuf>,

    /// Directory scanned by `sovbatch select`. Defaults to `reports_dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plans_dir: Option<PathBuf>,

    /// Lock/schema file shared by selection and apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<PathBuf>,

    /// Spreadsheet template every plan is applied to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,

    pub apply: ApplyConfig,
    pub hardening: HardeningConfig,
    pub git: GitConfig,
    pub select: SelectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplyConfig {
    /// Interpreter or executable that runs the applier.
    pub program: String,

    /// Applier script passed as the first argument. Must exist before any apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,

    /// Extra arguments placed before the named plan arguments.
    pub extra_args: Vec<String>,

    /// Kill the applier after this many seconds. Unset means wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Keep at most this many bytes of applier stdout and of stderr.
    pub output_limit_bytes: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: Some(PathBuf::from("apply_write_plan.py")),
            extra_args: Vec::new(),
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HardeningConfig {
    /// Files that must carry exactly `mode`.
    pub files: Vec<PathBuf>,

    /// Required permission bits, as an octal string.
    pub mode: String,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            files: [
                "apply_write_plan.py",
                "sov_write_plan.py",
                "sov_write_api.py",
                "sov_write_safe_map.py",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            mode: "555".to_string(),
        }
    }
}

impl HardeningConfig {
    pub fn mode_bits(&self) -> Result<u32> {
        let bits = u32::from_str_radix(self.mode.trim(), 8)
            .with_context(|| format!("hardening.mode '{}' is not octal", self.mode))?;
        if bits > 0o777 {
            return Err(anyhow!("hardening.mode '{}' exceeds 777", self.mode));
        }
        Ok(bits)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    /// Count untracked files as dirt.
    pub include_untracked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectConfig {
    /// Column letters holding formulas; plans writing there are skipped.
    pub formula_columns: Vec<String>,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            formula_columns: vec!["T".to_string()],
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            ready_list: None,
            plans_dir: None,
            lock: None,
            template: None,
            apply: ApplyConfig::default(),
            hardening: HardeningConfig::default(),
            git: GitConfig::default(),
            select: SelectConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reports_dir.as_os_str().is_empty() {
            return Err(anyhow!("reports_dir must not be empty"));
        }
        if self.apply.program.trim().is_empty() {
            return Err(anyhow!("apply.program must not be empty"));
        }
        if self.apply.output_limit_bytes == 0 {
            return Err(anyhow!("apply.output_limit_bytes must be > 0"));
        }
        if self.apply.timeout_secs == Some(0) {
            return Err(anyhow!("apply.timeout_secs must be > 0 when set"));
        }
        self.hardening.mode_bits()?;
        if self
            .select
            .formula_columns
            .iter()
            .any(|col| col.is_empty() || !col.chars().all(|c| c.is_ascii_uppercase()))
        {
            return Err(anyhow!("select.formula_columns must be uppercase column letters"));
        }
        Ok(())
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    ///
    /// `READY_LIST` is only defaulted from `REPORTS_DIR` later, at resolve time,
    /// so overriding the reports directory alone moves the ready list too.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = get("REPORTS_DIR") {
            self.reports_dir = PathBuf::from(dir);
        }
        if let Some(list) = get("READY_LIST") {
            self.ready_list = Some(PathBuf::from(list));
        }
        if let Some(lock) = get("LOCK") {
            self.lock = Some(PathBuf::from(lock));
        }
        if let Some(template) = get("TPL") {
            self.template = Some(PathBuf::from(template));
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BatchConfig::default()`.
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = BatchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BatchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk.
pub fn write_config(path: &Path, cfg: &BatchConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

/// Config with every path resolved against the project root.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub reports_dir: PathBuf,
    pub ready_list: PathBuf,
    pub plans_dir: PathBuf,
    pub lock: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub hardened_files: Vec<PathBuf>,
    pub hardened_mode: u32,
    pub config: BatchConfig,
}

impl Settings {
    pub fn resolve(root: &Path, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let at_root = |p: &Path| root.join(p);
        let reports_dir = at_root(&config.reports_dir);
        let ready_list = config
            .ready_list
            .as_deref()
            .map(at_root)
            .unwrap_or_else(|| reports_dir.join(READY_LIST_NAME));
        let plans_dir = config
            .plans_dir
            .as_deref()
            .map(at_root)
            .unwrap_or_else(|| reports_dir.clone());
        Ok(Self {
            root: root.to_path_buf(),
            ready_list,
            plans_dir,
            lock: config.lock.as_deref().map(at_root),
            template: config.template.as_deref().map(at_root),
            hardened_files: config.hardening.files.iter().map(|p| at_root(p)).collect(),
            hardened_mode: config.hardening.mode_bits()?,
            reports_dir,
            config,
        })
    }

    /// Lock path, which must be set and exist.
    pub fn require_lock(&self) -> Result<&Path> {
        require_existing(self.lock.as_deref(), "LOCK")
    }

    /// Template path, which must be set and exist.
    pub fn require_template(&self) -> Result<&Path> {
        require_existing(self.template.as_deref(), "TPL")
    }
}

fn require_existing<'a>(path: Option<&'a Path>, name: &str) -> Result<&'a Path> {
    let path = path.ok_or_else(|| {
        PreconditionError::new(
            PreconditionKind::MissingSetting,
            format!("{name} is not set (env or config)"),
        )
    })?;
    if !path.is_file() {
        return Err(PreconditionError::new(
            PreconditionKind::MissingFile,
            format!("{name} not found: {}", path.display()),
        )
        .into());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::precondition_of;
    use std::collections::HashMap;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, BatchConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let cfg = BatchConfig {
            lock: Some(PathBuf::from("schema/lock.json")),
            ..BatchConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "reports_dir = \"out\"\n[apply]\ntimeout_secs = 30\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.reports_dir, PathBuf::from("out"));
        assert_eq!(cfg.apply.timeout_secs, Some(30));
        assert_eq!(cfg.apply.program, "python3");
        assert_eq!(cfg.hardening.mode, "555");
    }

    #[test]
    fn rejects_non_octal_mode() {
        let cfg = BatchConfig {
            hardening: HardeningConfig {
                files: Vec::new(),
                mode: "589".to_string(),
            },
            ..BatchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_and_ready_list_follows_reports_dir() {
        let env: HashMap<&str, &str> = [
            ("REPORTS_DIR", "custom"),
            ("LOCK", "schema/lock.json"),
            ("TPL", ""),
        ]
        .into_iter()
        .collect();
        let mut cfg = BatchConfig::default();
        cfg.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.reports_dir, PathBuf::from("custom"));
        assert_eq!(cfg.template, None);

        let settings = Settings::resolve(Path::new("/proj"), cfg).expect("resolve");
        assert_eq!(settings.ready_list, PathBuf::from("/proj/custom/BATCH_READY.txt"));
        assert_eq!(settings.plans_dir, PathBuf::from("/proj/custom"));
        assert_eq!(settings.lock, Some(PathBuf::from("/proj/schema/lock.json")));
        assert_eq!(settings.hardened_mode, 0o555);
    }

    #[test]
    fn require_lock_reports_unset_and_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = Settings::resolve(temp.path(), BatchConfig::default()).expect("resolve");
        let err = settings.require_lock().unwrap_err();
        assert_eq!(
            precondition_of(&err).map(|p| p.kind),
            Some(PreconditionKind::MissingSetting)
        );

        let cfg = BatchConfig {
            template: Some(PathBuf::from("tpl.xlsm")),
            ..BatchConfig::default()
        };
        let settings = Settings::resolve(temp.path(), cfg).expect("resolve");
        let err = settings.require_template().unwrap_err();
        assert_eq!(
            precondition_of(&err).map(|p| p.kind),
            Some(PreconditionKind::MissingFile)
        );
    }
}
