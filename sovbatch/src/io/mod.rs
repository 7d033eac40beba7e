//! I/O helpers for sovbatch commands.

pub mod applier;
pub mod config;
pub mod fs;
pub mod git;
pub mod guards;
pub mod init;
pub mod lock;
pub mod permissions;
pub mod plan_store;
pub mod process;
pub mod promotion;
pub mod run_log;
