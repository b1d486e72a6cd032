//! UID/GID transitions to a resolved identity.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid. Once the uid is
//! dropped the process no longer has the privilege to change its groups.

use super::resolve::ResolvedIdentity;
use crate::config::types::{LaunchError, PrivilegeStep, Result};
use nix::unistd::{Gid, Uid};

/// 4-step transition: setgroups -> setresgid -> setresuid -> verify.
///
/// Every failure is returned immediately; the caller must not continue
/// with a half-applied identity.
pub fn apply_identity(identity: &ResolvedIdentity) -> Result<()> {
    set_groups(identity.gid)?;
    // CRITICAL: GID before UID
    set_gid(identity.gid)?;
    set_uid(identity.uid)?;
    verify_transition(identity)?;

    log::info!("Transitioned to UID={}, GID={}", identity.uid, identity.gid);
    Ok(())
}

/// Reduce the supplementary groups to the target group alone.
fn set_groups(gid: Gid) -> Result<()> {
    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "redox")))]
    {
        nix::unistd::setgroups(&[gid]).map_err(|source| LaunchError::Privilege {
            step: PrivilegeStep::SetGroups,
            source,
        })?;
        log::debug!("Set supplementary groups to [{}]", gid);
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "redox"))]
    {
        log::debug!("setgroups unavailable on this platform; keeping groups for {}", gid);
    }

    Ok(())
}

/// MUST be called BEFORE set_uid.
fn set_gid(gid: Gid) -> Result<()> {
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    let result = nix::unistd::setresgid(gid, gid, gid);

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )))]
    let result = nix::unistd::setgid(gid);

    result.map_err(|source| LaunchError::Privilege {
        step: PrivilegeStep::SetGid,
        source,
    })?;
    log::debug!("Set GID to {}", gid);
    Ok(())
}

/// MUST be called AFTER set_gid.
fn set_uid(uid: Uid) -> Result<()> {
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    let result = nix::unistd::setresuid(uid, uid, uid);

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )))]
    let result = nix::unistd::setuid(uid);

    result.map_err(|source| LaunchError::Privilege {
        step: PrivilegeStep::SetUid,
        source,
    })?;
    log::debug!("Set UID to {}", uid);
    Ok(())
}

fn verify_transition(expected: &ResolvedIdentity) -> Result<()> {
    use nix::unistd::{getegid, geteuid, getgid, getuid};

    let (real_uid, effective_uid) = (getuid(), geteuid());
    if real_uid != expected.uid || effective_uid != expected.uid {
        return Err(LaunchError::IdentityMismatch {
            detail: format!(
                "expected uid {}, got real={}, effective={}",
                expected.uid, real_uid, effective_uid
            ),
        });
    }

    let (real_gid, effective_gid) = (getgid(), getegid());
    if real_gid != expected.gid || effective_gid != expected.gid {
        return Err(LaunchError::IdentityMismatch {
            detail: format!(
                "expected gid {}, got real={}, effective={}",
                expected.gid, real_gid, effective_gid
            ),
        });
    }

    Ok(())
}
