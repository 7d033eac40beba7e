//! Stable exit codes for sovbatch CLI commands.

/// Command succeeded (including a batch with zero ready plans).
pub const OK: i32 = 0;
/// Generic failure: I/O errors, nothing to promote, a failed single apply.
pub const FAILURE: i32 = 1;
/// Precondition or guard failure: dirty repo, missing file, hardening violation.
pub const PRECONDITION: i32 = 2;
