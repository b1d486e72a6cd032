//! chpst: prepare a controlled execution environment and exec into a program
//!
//! One binary answers to several names. Whatever the name, the work is the
//! same: parse flags into an [`Invocation`], walk a fixed preparation chain,
//! then replace the process image with the target.
//!
//! # Architecture
//!
//! ## Front End ([`cli`])
//! - [`cli::personality`]: Name-selected personalities and their registry
//! - [`cli::grammar`]: Flag grammars (clap) for each personality
//! - [`cli::diag`]: Usage/fatal diagnostics and the stderr logger
//!
//! ## Execution Control ([`exec`])
//! - [`exec::executor`]: Launch orchestration
//! - [`exec::preexec`]: Type-state enforced preparation ordering
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::session`]: setsid and standard stream closing
//! - [`kernel::credentials`]: Account resolution, UID/GID export, privilege drop
//! - [`kernel::rlimit`]: Soft resource limits with host probing
//!
//! ## Coordination ([`safety`])
//! - [`safety::lock`]: Advisory locks inherited by the exec target
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Launch configuration, limit tables and errors
//!
//! ## Utilities ([`utils`])
//! - [`utils::envdir`]: Environment directories and the environment overlay
//!
//! # Preparation Order
//!
//! 1. New session
//! 2. Environment directory
//! 3. Identity export, then identity change
//! 4. Soft limits
//! 5. Lock
//! 6. Stream closing
//! 7. exec

// Front End
pub mod cli;

// Execution Control
pub mod exec;

// Kernel Primitives
pub mod kernel;

// Coordination
pub mod safety;

// Configuration
pub mod config;

// Utilities
pub mod utils;

pub use config::types::*;
