//! Pre-Exec Ordering Enforcement
//!
//! The preparation sequence is FIXED and must not drift:
//! 1. setsid() when detaching
//! 2. environment directory loading
//! 3. identity export (UID/GID variables), then identity application
//!    (setgroups, setresgid, setresuid)
//! 4. soft resource limits
//! 5. advisory lock acquisition
//! 6. standard stream closing
//! 7. exec target
//!
//! Each step consumes the prior state and returns exactly one next state on
//! success. Only `Launch<ExecReady>` can exec, so an out-of-order chain does
//! not compile:
//!
//! ```compile_fail
//! use chpst::exec::preexec::{Fresh, Launch};
//!
//! let launch = Launch::<Fresh>::new(false);
//! // Fresh has no exec method.
//! launch.exec(&["true".into()]);
//! ```
//!
//! ```compile_fail
//! use chpst::exec::preexec::{Fresh, Launch};
//! use chpst::{LimitTable, StreamClosing};
//! use chpst::kernel::rlimit::HostLimits;
//!
//! let launch = Launch::<Fresh>::new(false).detach(false);
//! // Limits cannot be applied before the identity step.
//! launch.apply_limits(&LimitTable::default(), &HostLimits::probe());
//! ```
//!
//! ```compile_fail
//! use chpst::exec::preexec::{Fresh, Launch};
//!
//! let launch = Launch::<Fresh>::new(false);
//! let detached = launch.detach(false);
//! // `launch` was consumed by the first transition.
//! launch.detach(true);
//! ```

use crate::config::types::{
    IdentityRequest, LaunchError, LimitTable, LockSpec, Result, StreamClosing,
};
use crate::kernel::credentials::{apply_identity, export_identity, resolve_identity};
use crate::kernel::rlimit::{apply_limits, HostLimits};
use crate::kernel::session;
use crate::safety::lock::{self, LockHandle};
use crate::utils::envdir::{load_env_dir, PreparedEnv};
use std::convert::Infallible;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// Type-state marker: nothing prepared yet
pub struct Fresh;

/// Type-state marker: session handling done
pub struct Detached;

/// Type-state marker: environment directory loaded
pub struct EnvPrepared;

/// Type-state marker: identity exported and/or applied
pub struct IdentitySet;

/// Type-state marker: soft limits applied
pub struct Limited;

/// Type-state marker: advisory lock held (if requested)
pub struct Locked;

/// Type-state marker: ready for exec (all steps passed)
pub struct ExecReady;

/// A launch in progress with type-state tracking
/// The type parameter S tracks which preparation step we're at
pub struct Launch<S> {
    /// Emit warnings for host-unsupported limits
    pub verbose: bool,
    /// Environment changes handed to the exec target
    pub env: PreparedEnv,
    /// Held until exec, then inherited by the target
    lock: Option<LockHandle>,
    /// Type-state marker (zero-sized)
    _state: PhantomData<S>,
}

impl<S> Launch<S> {
    fn advance<T>(self) -> Launch<T> {
        Launch {
            verbose: self.verbose,
            env: self.env,
            lock: self.lock,
            _state: PhantomData,
        }
    }

    pub fn lock(&self) -> Option<&LockHandle> {
        self.lock.as_ref()
    }
}

impl Launch<Fresh> {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            env: PreparedEnv::default(),
            lock: None,
            _state: PhantomData,
        }
    }

    /// Step 1: optionally move into a new session.
    pub fn detach(self, detach: bool) -> Launch<Detached> {
        if detach {
            session::detach();
        }
        self.advance()
    }
}

impl Launch<Detached> {
    /// Step 2: materialize an environment directory into the overlay.
    pub fn load_env_dir(mut self, dir: Option<&Path>) -> Result<Launch<EnvPrepared>> {
        if let Some(dir) = dir {
            let entries = load_env_dir(dir)?;
            log::info!("Loaded {} entries from {}", entries.len(), dir.display());
            for entry in entries {
                self.env.apply(entry);
            }
        }
        Ok(self.advance())
    }
}

impl Launch<EnvPrepared> {
    /// Step 3: export first (it needs no privilege), then apply.
    pub fn set_identity(
        mut self,
        export: Option<&IdentityRequest>,
        apply: Option<&IdentityRequest>,
    ) -> Result<Launch<IdentitySet>> {
        if let Some(request) = export {
            let identity = resolve_identity(request)?;
            export_identity(&identity, &mut self.env);
        }
        if let Some(request) = apply {
            let identity = resolve_identity(request)?;
            apply_identity(&identity)?;
        }
        Ok(self.advance())
    }
}

impl Launch<IdentitySet> {
    /// Step 4: soft limits, after the identity change so they bind the
    /// target user.
    pub fn apply_limits(self, limits: &LimitTable, host: &HostLimits) -> Result<Launch<Limited>> {
        apply_limits(limits, host, self.verbose)?;
        Ok(self.advance())
    }
}

impl Launch<Limited> {
    /// Step 5: take the advisory lock and keep it open across exec.
    pub fn acquire_lock(mut self, spec: Option<&LockSpec>) -> Result<Launch<Locked>> {
        if let Some(spec) = spec {
            self.lock = Some(lock::acquire(spec)?);
        }
        Ok(self.advance())
    }
}

impl Launch<Locked> {
    /// Step 6: close standard streams. Nothing may open files after this.
    pub fn close_streams(self, closing: StreamClosing) -> Result<Launch<ExecReady>> {
        session::close_streams(closing)?;
        Ok(self.advance())
    }
}

impl Launch<ExecReady> {
    /// Replace the process image with `command`.
    /// This is the ONLY legal way to exec the target. It returns only on
    /// failure.
    pub fn exec(self, command: &[OsString]) -> Result<Infallible> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| LaunchError::usage("missing program to run"))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        self.env.apply_to(&mut cmd);

        log::info!("Executing {:?}", command);
        let source = cmd.exec();
        Err(LaunchError::Exec {
            program: program.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod typestate_tests {
    use super::*;
    use crate::config::types::{LimitKind, LimitValue};

    #[test]
    fn test_typestate_chain_without_requests() {
        let ready = Launch::<Fresh>::new(false)
            .detach(false)
            .load_env_dir(None)
            .and_then(|l| l.set_identity(None, None))
            .and_then(|l| l.apply_limits(&LimitTable::default(), &HostLimits::probe()))
            .and_then(|l| l.acquire_lock(None))
            .and_then(|l| l.close_streams(StreamClosing::default()))
            .expect("empty chain must succeed");

        assert!(ready.env.is_empty());
        assert!(ready.lock().is_none());
    }

    #[test]
    fn test_chain_carries_env_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("lk");
        let spec = LockSpec {
            path: lock_path.clone(),
            blocking: false,
            fire_and_forget: false,
        };
        let me = nix::unistd::User::from_uid(nix::unistd::getuid())
            .unwrap()
            .unwrap();
        let mut limits = LimitTable::default();
        limits.set(LimitKind::CpuTime, LimitValue::Max);

        let locked = Launch::<Fresh>::new(true)
            .detach(false)
            .load_env_dir(None)
            .and_then(|l| l.set_identity(Some(&IdentityRequest::account_only(me.name)), None))
            .and_then(|l| l.apply_limits(&limits, &HostLimits::probe()))
            .and_then(|l| l.acquire_lock(Some(&spec)))
            .expect("chain must succeed");

        assert_eq!(
            locked.env.get("UID"),
            Some(Some(std::ffi::OsStr::new(&me.uid.to_string())))
        );
        assert_eq!(locked.lock().map(|h| h.path()), Some(lock_path.as_path()));
    }

    #[test]
    fn test_unknown_identity_stops_the_chain() {
        let result = Launch::<Fresh>::new(false)
            .detach(false)
            .load_env_dir(None)
            .and_then(|l| {
                l.set_identity(Some(&IdentityRequest::account_only("no-such-account-4711")), None)
            });
        assert!(matches!(result, Err(LaunchError::UnknownAccount { .. })));
    }

    #[test]
    fn test_exec_of_missing_program_reports_it() {
        let ready = Launch::<Fresh>::new(false)
            .detach(false)
            .load_env_dir(None)
            .and_then(|l| l.set_identity(None, None))
            .and_then(|l| l.apply_limits(&LimitTable::default(), &HostLimits::probe()))
            .and_then(|l| l.acquire_lock(None))
            .and_then(|l| l.close_streams(StreamClosing::default()))
            .unwrap();

        let err = ready
            .exec(&[OsString::from("/nonexistent/chpst-target")])
            .unwrap_err();
        assert!(matches!(err, LaunchError::Exec { .. }));
        assert!(err.to_string().starts_with("unable to run: /nonexistent/chpst-target"));
    }
}
