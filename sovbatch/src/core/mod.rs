//! Deterministic, pure logic shared by the batch pipeline.
//!
//! Core modules must be free of filesystem and process side effects. They
//! operate on in-memory values and return deterministic outputs suitable for
//! tests.

pub mod artifact;
pub mod outcome;
pub mod plan_check;
pub mod ready_list;
pub mod stamp;
