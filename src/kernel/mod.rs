//! Thin wrappers around kernel primitives.
//!
//! Dependency direction: session -> credentials -> rlimit

pub mod credentials;
pub mod rlimit;
pub mod session;
