//! Utilities
//!
//! Environment directory loading and the environment overlay.

pub mod envdir;
