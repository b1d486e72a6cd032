//! Soft resource limits.
//!
//! Each limit kind maps to one or more candidate kernel resources, tried in
//! order. The host is probed once at startup; a kind with no answering
//! resource is unsupported and its requests are skipped.

use crate::config::types::{LaunchError, LimitKind, LimitTable, LimitValue, Result};
use nix::sys::resource::{getrlimit, setrlimit, Resource};

pub use libc::rlim_t;

/// A kernel resource together with its conventional name.
pub type Candidate = (Resource, &'static str);

const DATA: &[Candidate] = &[(Resource::RLIMIT_DATA, "RLIMIT_DATA")];
const STACK: &[Candidate] = &[(Resource::RLIMIT_STACK, "RLIMIT_STACK")];
const ADDRESS_SPACE: &[Candidate] = &[
    #[cfg(target_os = "freebsd")]
    (Resource::RLIMIT_VMEM, "RLIMIT_VMEM"),
    #[cfg(not(any(target_os = "freebsd", target_os = "netbsd", target_os = "openbsd")))]
    (Resource::RLIMIT_AS, "RLIMIT_AS"),
];
const OPEN_FILES: &[Candidate] = &[(Resource::RLIMIT_NOFILE, "RLIMIT_NOFILE")];
const FILE_SIZE: &[Candidate] = &[(Resource::RLIMIT_FSIZE, "RLIMIT_FSIZE")];
const CORE: &[Candidate] = &[(Resource::RLIMIT_CORE, "RLIMIT_CORE")];
const CPU_TIME: &[Candidate] = &[(Resource::RLIMIT_CPU, "RLIMIT_CPU")];

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "macos",
    target_os = "ios"
))]
mod bsd_like {
    use super::Candidate;
    use nix::sys::resource::Resource;

    pub const MEMLOCK: &[Candidate] = &[(Resource::RLIMIT_MEMLOCK, "RLIMIT_MEMLOCK")];
    pub const PROCESSES: &[Candidate] = &[(Resource::RLIMIT_NPROC, "RLIMIT_NPROC")];
    pub const RESIDENT: &[Candidate] = &[(Resource::RLIMIT_RSS, "RLIMIT_RSS")];
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "macos",
    target_os = "ios"
)))]
mod bsd_like {
    use super::Candidate;

    pub const MEMLOCK: &[Candidate] = &[];
    pub const PROCESSES: &[Candidate] = &[];
    pub const RESIDENT: &[Candidate] = &[];
}

/// Candidate resources for a kind, preferred first.
pub fn candidates(kind: LimitKind) -> &'static [Candidate] {
    match kind {
        LimitKind::Data => DATA,
        LimitKind::Stack => STACK,
        LimitKind::MemLock => bsd_like::MEMLOCK,
        LimitKind::AddressSpace => ADDRESS_SPACE,
        LimitKind::OpenFiles => OPEN_FILES,
        LimitKind::Processes => bsd_like::PROCESSES,
        LimitKind::FileSize => FILE_SIZE,
        LimitKind::Core => CORE,
        LimitKind::Resident => bsd_like::RESIDENT,
        LimitKind::CpuTime => CPU_TIME,
    }
}

/// Warning text for a kind the host cannot limit.
pub fn unsupported_message(kind: LimitKind) -> String {
    let names: Vec<&str> = match kind {
        LimitKind::AddressSpace => vec!["RLIMIT_VMEM", "RLIMIT_AS"],
        LimitKind::OpenFiles => vec!["RLIMIT_NOFILE", "RLIMIT_OFILE"],
        LimitKind::Data => vec!["RLIMIT_DATA"],
        LimitKind::Stack => vec!["RLIMIT_STACK"],
        LimitKind::MemLock => vec!["RLIMIT_MEMLOCK"],
        LimitKind::Processes => vec!["RLIMIT_NPROC"],
        LimitKind::FileSize => vec!["RLIMIT_FSIZE"],
        LimitKind::Core => vec!["RLIMIT_CORE"],
        LimitKind::Resident => vec!["RLIMIT_RSS"],
        LimitKind::CpuTime => vec!["RLIMIT_CPU"],
    };
    match names.as_slice() {
        [primary, alternate] => format!(
            "system does neither support {} nor {}",
            primary, alternate
        ),
        _ => format!("system does not support {}", names.join("/")),
    }
}

/// Which resource answers for each limit kind on this host.
#[derive(Clone, Debug)]
pub struct HostLimits {
    resolved: [Option<Candidate>; 10],
}

impl HostLimits {
    /// Ask the kernel about every kind once.
    pub fn probe() -> Self {
        let mut resolved = [None; 10];
        for kind in LimitKind::ALL {
            resolved[kind.index()] = candidates(kind)
                .iter()
                .copied()
                .find(|(resource, _)| getrlimit(*resource).is_ok());
            if resolved[kind.index()].is_none() {
                log::debug!("No resource limit available for {:?}", kind);
            }
        }
        Self { resolved }
    }

    pub fn resource_for(&self, kind: LimitKind) -> Option<Candidate> {
        self.resolved[kind.index()]
    }
}

/// Soft limit to install for a request, never above the hard ceiling.
pub fn target_soft(value: LimitValue, hard: rlim_t) -> rlim_t {
    match value {
        LimitValue::Max => hard,
        LimitValue::Value(requested) => match rlim_t::try_from(requested) {
            Ok(requested) if requested <= hard => requested,
            _ => hard,
        },
    }
}

/// Set the soft limit of one resource. The hard limit is left unchanged.
pub fn apply_limit(resource: Resource, name: &'static str, value: LimitValue) -> Result<rlim_t> {
    let (soft, hard) = getrlimit(resource).map_err(|source| LaunchError::Limit {
        op: "getrlimit",
        resource: name,
        source,
    })?;

    let target = target_soft(value, hard);
    setrlimit(resource, target, hard).map_err(|source| LaunchError::Limit {
        op: "setrlimit",
        resource: name,
        source,
    })?;

    log::debug!("Set {} soft limit {} -> {} (hard={})", name, soft, target, hard);
    Ok(target)
}

/// Apply every requested kind in the fixed order.
///
/// Unsupported kinds are skipped; with `verbose` a warning names each one.
pub fn apply_limits(table: &LimitTable, host: &HostLimits, verbose: bool) -> Result<()> {
    for (kind, value) in table.requested() {
        match host.resource_for(kind) {
            Some((resource, name)) => {
                apply_limit(resource, name, value)?;
            }
            None => {
                if verbose {
                    log::warn!("{}", unsupported_message(kind));
                }
            }
        }
    }
    Ok(())
}
