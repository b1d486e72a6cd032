//! Execution control
//!
//! Orders the preparation steps with type-state enforcement and performs the
//! final exec.

pub mod executor;
pub mod preexec;
