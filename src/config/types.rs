//! Core types and structures for the launch chain
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for malformed flags or missing positional arguments.
pub const EXIT_USAGE: i32 = 100;

/// Exit status for every operational failure.
pub const EXIT_FATAL: i32 = 111;

/// An account to resolve, as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityRequest {
    /// Raw token, either `account` or `account:group`
    pub token: String,
    /// Whether `account:group` splitting applies to this token
    pub allow_group: bool,
}

impl IdentityRequest {
    /// Token that may carry an explicit `:group` suffix.
    pub fn with_group(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            allow_group: true,
        }
    }

    /// Token naming a single account, taken verbatim.
    pub fn account_only(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            allow_group: false,
        }
    }
}

/// The ten resource limit kinds a launch can adjust.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimitKind {
    Data,
    Stack,
    MemLock,
    AddressSpace,
    OpenFiles,
    Processes,
    FileSize,
    Core,
    Resident,
    CpuTime,
}

impl LimitKind {
    pub const ALL: [LimitKind; 10] = [
        LimitKind::Data,
        LimitKind::Stack,
        LimitKind::MemLock,
        LimitKind::AddressSpace,
        LimitKind::OpenFiles,
        LimitKind::Processes,
        LimitKind::FileSize,
        LimitKind::Core,
        LimitKind::Resident,
        LimitKind::CpuTime,
    ];

    /// Kinds covered by the combined memory flag (`-m`).
    pub const MEMORY: [LimitKind; 4] = [
        LimitKind::Data,
        LimitKind::Stack,
        LimitKind::MemLock,
        LimitKind::AddressSpace,
    ];

    pub fn index(self) -> usize {
        match self {
            LimitKind::Data => 0,
            LimitKind::Stack => 1,
            LimitKind::MemLock => 2,
            LimitKind::AddressSpace => 3,
            LimitKind::OpenFiles => 4,
            LimitKind::Processes => 5,
            LimitKind::FileSize => 6,
            LimitKind::Core => 7,
            LimitKind::Resident => 8,
            LimitKind::CpuTime => 9,
        }
    }
}

/// Requested soft limit for one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitValue {
    /// Raise the soft limit to the current hard ceiling
    Max,
    /// Explicit byte/count/seconds value, capped at the hard ceiling
    Value(u64),
}

/// Per-kind limit requests. Absent entries leave the inherited limit alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LimitTable {
    values: [Option<LimitValue>; 10],
}

impl LimitTable {
    pub fn set(&mut self, kind: LimitKind, value: LimitValue) {
        self.values[kind.index()] = Some(value);
    }

    pub fn get(&self, kind: LimitKind) -> Option<LimitValue> {
        self.values[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Requested kinds in the fixed application order.
    pub fn requested(&self) -> impl Iterator<Item = (LimitKind, LimitValue)> + '_ {
        LimitKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|value| (kind, value)))
    }
}

/// Advisory lock request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockSpec {
    pub path: PathBuf,
    /// Wait for the holder to release instead of failing on contention
    pub blocking: bool,
    /// Exit 0 instead of failing when the lock cannot be taken
    pub fire_and_forget: bool,
}

/// Which standard streams to close right before exec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamClosing {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

/// Standard stream selector used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub fn fd(self) -> i32 {
        match self {
            StdStream::Stdin => 0,
            StdStream::Stdout => 1,
            StdStream::Stderr => 2,
        }
    }
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        })
    }
}

/// Accumulated configuration for one invocation.
///
/// Built once by flag parsing and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Identity to apply to the process (`-u`, `setuidgid`)
    pub apply_identity: Option<IdentityRequest>,
    /// Identity to export as `UID`/`GID` (`-U`, `envuidgid`)
    pub export_identity: Option<IdentityRequest>,
    /// Directory whose files become environment variables (`-e`, `envdir`)
    pub env_dir: Option<PathBuf>,
    pub limits: LimitTable,
    pub lock: Option<LockSpec>,
    /// Start a new session before anything else (`-P`, `pgrphack`)
    pub detach: bool,
    pub close: StreamClosing,
    pub verbose: bool,
}

/// A parsed command line: what to prepare and what to exec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub config: LaunchConfig,
    /// Target program followed by its arguments, passed through unchanged
    pub command: Vec<OsString>,
}

/// Identity-setting step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivilegeStep {
    SetGroups,
    SetGid,
    SetUid,
}

impl fmt::Display for PrivilegeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrivilegeStep::SetGroups => "setgroups",
            PrivilegeStep::SetGid => "setgid",
            PrivilegeStep::SetUid => "setuid",
        })
    }
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("{detail}")]
    Usage { detail: String },

    #[error("unknown account: {account}")]
    UnknownAccount { account: String },

    #[error("unknown user/group: {spec}")]
    UnknownUserGroup { spec: String },

    #[error("unable to {step}: {source}")]
    Privilege {
        step: PrivilegeStep,
        source: nix::Error,
    },

    #[error("identity verification failed: {detail}")]
    IdentityMismatch { detail: String },

    #[error("unable to {op}({resource}): {source}")]
    Limit {
        op: &'static str,
        resource: &'static str,
        source: nix::Error,
    },

    #[error("{action}: {}: {source}", .path.display())]
    Lock {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{action}: {}: {source}", .dir.display())]
    EnvDir {
        action: &'static str,
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to read {}/{}: {source}", .dir.display(), .entry.to_string_lossy())]
    EnvEntry {
        dir: PathBuf,
        entry: OsString,
        source: std::io::Error,
    },

    #[error("invalid variable name {}/{}", .dir.display(), .entry.to_string_lossy())]
    EnvName { dir: PathBuf, entry: OsString },

    #[error("unable to close {stream}: {source}")]
    Stream {
        stream: StdStream,
        source: nix::Error,
    },

    #[error("unable to run: {}: {source}", .program.to_string_lossy())]
    Exec {
        program: OsString,
        source: std::io::Error,
    },

    /// Fire-and-forget mode turned a failure into a clean exit.
    #[error("yielding: {0}")]
    Yielded(#[source] Box<LaunchError>),
}

impl LaunchError {
    pub fn usage(detail: impl Into<String>) -> Self {
        LaunchError::Usage {
            detail: detail.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Usage { .. } => EXIT_USAGE,
            LaunchError::Yielded(_) => 0,
            _ => EXIT_FATAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
