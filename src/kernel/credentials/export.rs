//! Identity export for programs that perform their own transition.

use super::resolve::ResolvedIdentity;
use crate::utils::envdir::PreparedEnv;

/// Write the identity into the prepared environment as decimal `GID` and `UID`.
pub fn export_identity(identity: &ResolvedIdentity, env: &mut PreparedEnv) {
    env.set("GID", identity.gid.as_raw().to_string());
    env.set("UID", identity.uid.as_raw().to_string());
    log::debug!("Exported UID={} GID={}", identity.uid, identity.gid);
}
