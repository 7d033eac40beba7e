//! Guarded batch apply with GOLD/LATEST promotion.
//!
//! `sovbatch` drives an external plan applier over a ready list of write
//! plans. Every apply is preceded by a git-clean check and a permission
//! hardening check; every invocation is framed into a stamped run log; the
//! newest applied artifact is then promoted to a frozen GOLD copy and a
//! LATEST link.
//!
//! - **[`core`]**: pure logic (ready-list normalization, stamps, artifact
//!   names, outcome classification, plan readiness checks). No I/O.
//! - **[`io`]**: side effects (config, git, file modes, child processes,
//!   run logs, promotion, the batch lock).
//!
//! Orchestration modules ([`select`], [`apply`], [`batch`], [`status`])
//! combine the two to implement CLI commands.

pub mod apply;
pub mod batch;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod select;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
