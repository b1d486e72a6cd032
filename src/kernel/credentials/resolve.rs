//! Account name to numeric identity resolution.

use crate::config::types::{IdentityRequest, LaunchError, Result};
use nix::unistd::{Gid, Group, Uid, User};

/// Numeric identity derived from an account (and optional group) name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub uid: Uid,
    pub gid: Gid,
}

/// Resolve `account` or `account:group` to a uid/gid pair.
///
/// The account supplies the uid and its primary gid; an explicit group
/// replaces the gid. Lookup errors are reported the same way as a missing
/// entry, naming the token the caller gave.
pub fn resolve_identity(request: &IdentityRequest) -> Result<ResolvedIdentity> {
    let (account, group) = split_token(request);

    let unknown = || {
        if group.is_some() {
            LaunchError::UnknownUserGroup {
                spec: request.token.clone(),
            }
        } else {
            LaunchError::UnknownAccount {
                account: request.token.clone(),
            }
        }
    };

    let user = lookup_user(account).ok_or_else(unknown)?;
    let gid = match group {
        Some(name) => lookup_group(name).ok_or_else(unknown)?,
        None => user.gid,
    };

    log::debug!(
        "Resolved {} to uid={} gid={}",
        request.token,
        user.uid,
        gid
    );
    Ok(ResolvedIdentity { uid: user.uid, gid })
}

fn split_token(request: &IdentityRequest) -> (&str, Option<&str>) {
    if !request.allow_group {
        return (&request.token, None);
    }
    match request.token.split_once(':') {
        Some((account, group)) => (account, Some(group)),
        None => (&request.token, None),
    }
}

fn lookup_user(name: &str) -> Option<User> {
    match User::from_name(name) {
        Ok(user) => user,
        Err(e) => {
            log::debug!("getpwnam({}) failed: {}", name, e);
            None
        }
    }
}

fn lookup_group(name: &str) -> Option<Gid> {
    match Group::from_name(name) {
        Ok(group) => group.map(|g| g.gid),
        Err(e) => {
            log::debug!("getgrnam({}) failed: {}", name, e);
            None
        }
    }
}
