//! Account resolution and UID/GID transitions.
//!
//! CRITICAL: the group identity MUST be set BEFORE the user identity.

mod export;
mod resolve;
mod transition;

pub use export::export_identity;
pub use resolve::{resolve_identity, ResolvedIdentity};
pub use transition::apply_identity;
