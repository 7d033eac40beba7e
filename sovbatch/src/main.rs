//! `sovbatch`: guarded batch apply with GOLD/LATEST promotion.
//!
//! Selects ready write plans, applies each one through the external applier
//! behind a git-clean and permission-hardening check, logs every invocation,
//! and promotes the newest artifact.

mod cli;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sovbatch::error::{exit_code_for, precondition_of};
use sovbatch::logging;

#[derive(Parser)]
#[command(
    name = "sovbatch",
    version,
    about = "Guarded batch apply of write plans with GOLD/LATEST promotion"
)]
struct Cli {
    /// Project root (default: current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: <root>/sovbatch.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reports directory; overrides REPORTS_DIR and the config file.
    #[arg(long, global = true)]
    reports_dir: Option<PathBuf>,

    /// Lock/schema file; overrides LOCK and the config file.
    #[arg(long, global = true)]
    lock: Option<PathBuf>,

    /// Template file; overrides TPL and the config file.
    #[arg(long, global = true)]
    template: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create reports/, schema/, sovbatch.toml and .gitignore entries.
    Init {
        /// Overwrite an existing sovbatch.toml.
        #[arg(short, long)]
        force: bool,
    },
    /// Scan plans against the lock and write the ready list.
    Select,
    /// Apply one plan behind both guards.
    Apply {
        /// Plan to apply (default: PLAN).
        #[arg(long)]
        plan: Option<String>,
    },
    /// Apply every plan in the ready list, then promote.
    Batch {
        /// Ready-list file; overrides READY_LIST and the config file.
        #[arg(long)]
        ready_list: Option<PathBuf>,
        /// Skip promotion after the batch.
        #[arg(long)]
        no_promote: bool,
    },
    /// Publish the newest artifact as GOLD and LATEST.
    Promote,
    /// Show ready list, artifacts, last run and promotion state.
    Status,
    /// Set every hardened file to the required mode.
    Harden,
    /// Run the git-clean and permission checks without applying.
    Guard,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            match precondition_of(&err) {
                Some(pre) => eprintln!("sovbatch: {pre}"),
                None => eprintln!("sovbatch: error: {err:#}"),
            }
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let overrides = cli::Overrides {
        config: cli.config,
        reports_dir: cli.reports_dir,
        lock: cli.lock,
        template: cli.template,
        ready_list: None,
    };
    match cli.command {
        Command::Init { force } => cli::init(&root, force),
        Command::Select => cli::select(&cli::load_settings(&root, overrides)?),
        Command::Apply { plan } => {
            let plan = plan
                .or_else(|| std::env::var("PLAN").ok())
                .unwrap_or_default();
            cli::apply(&cli::load_settings(&root, overrides)?, &plan)
        }
        Command::Batch {
            ready_list,
            no_promote,
        } => {
            let overrides = cli::Overrides {
                ready_list,
                ..overrides
            };
            cli::batch(&cli::load_settings(&root, overrides)?, !no_promote)
        }
        Command::Promote => cli::promote(&cli::load_settings(&root, overrides)?),
        Command::Status => cli::status(&cli::load_settings(&root, overrides)?),
        Command::Harden => cli::harden(&cli::load_settings(&root, overrides)?),
        Command::Guard => cli::guard(&cli::load_settings(&root, overrides)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_batch_flags() {
        let cli = Cli::parse_from(["sovbatch", "batch", "--no-promote", "--ready-list", "r.txt"]);
        match cli.command {
            Command::Batch {
                ready_list,
                no_promote,
            } => {
                assert!(no_promote);
                assert_eq!(ready_list, Some(PathBuf::from("r.txt")));
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["sovbatch", "apply", "--plan", "p.json", "--lock", "l.json"]);
        assert_eq!(cli.lock, Some(PathBuf::from("l.json")));
        assert!(matches!(cli.command, Command::Apply { plan: Some(ref p) } if p == "p.json"));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["sovbatch", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }
}
