//! Configuration
//!
//! Types shared between flag parsing and the preparation chain.

pub mod types;
