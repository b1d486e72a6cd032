//! Launch orchestration
//!
//! Drives one parsed invocation through the type-state preparation chain
//! and into exec.

use crate::config::types::{Invocation, LaunchError, Result};
use crate::exec::preexec::{Fresh, Launch};
use crate::kernel::rlimit::HostLimits;
use std::convert::Infallible;

/// Prepare the process as configured and exec the target.
///
/// Returns only on failure. A failed exec under a fire-and-forget lock is
/// reported as a yield, like losing the lock itself.
pub fn launch(invocation: &Invocation) -> Result<Infallible> {
    let config = &invocation.config;
    if invocation.command.is_empty() {
        return Err(LaunchError::usage("missing program to run"));
    }

    let host = HostLimits::probe();
    let ready = Launch::<Fresh>::new(config.verbose)
        .detach(config.detach)
        .load_env_dir(config.env_dir.as_deref())?
        .set_identity(config.export_identity.as_ref(), config.apply_identity.as_ref())?
        .apply_limits(&config.limits, &host)?
        .acquire_lock(config.lock.as_ref())?
        .close_streams(config.close)?;

    let yields = config.lock.as_ref().is_some_and(|lock| lock.fire_and_forget);
    match ready.exec(&invocation.command) {
        Err(e @ LaunchError::Exec { .. }) if yields => Err(LaunchError::Yielded(Box::new(e))),
        other => other,
    }
}
