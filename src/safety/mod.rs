//! Cross-process coordination
//!
//! Advisory locks shared between independent launches.

pub mod lock;
