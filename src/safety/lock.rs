//! Advisory lock acquisition for a launch
//!
//! The lock descriptor is made inheritable and kept open, so the lock stays
//! held by whatever program ends up occupying this process after exec.

use crate::config::types::{LaunchError, LockSpec, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// An open, exclusively locked lock file. Never explicitly released.
#[derive(Debug)]
pub struct LockHandle {
    file: File,
    path: PathBuf,
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

/// Open (creating if absent) and exclusively lock `spec.path`.
///
/// Any failure is fatal, or a clean yield when `spec.fire_and_forget` is set.
pub fn acquire(spec: &LockSpec) -> Result<LockHandle> {
    match try_acquire(spec) {
        Ok(handle) => {
            log::info!(
                "Acquired {} lock on {}",
                if spec.blocking { "blocking" } else { "non-blocking" },
                spec.path.display()
            );
            Ok(handle)
        }
        Err(e) if spec.fire_and_forget => {
            log::debug!("Lock unavailable, yielding: {}", e);
            Err(LaunchError::Yielded(Box::new(e)))
        }
        Err(e) => Err(e),
    }
}

fn try_acquire(spec: &LockSpec) -> Result<LockHandle> {
    let lock_error = |action: &'static str| {
        move |source: std::io::Error| LaunchError::Lock {
            action,
            path: spec.path.clone(),
            source,
        }
    };

    // Open without truncating; the file content is never touched.
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o600)
        .open(&spec.path)
        .map_err(lock_error("unable to open lock"))?;

    let locked = if spec.blocking {
        file.lock_exclusive()
    } else {
        file.try_lock_exclusive()
    };
    locked.map_err(lock_error("unable to lock"))?;

    keep_across_exec(&file).map_err(lock_error("unable to lock"))?;

    Ok(LockHandle {
        file,
        path: spec.path.clone(),
    })
}

/// Clear FD_CLOEXEC so the descriptor, and with it the lock, survives exec.
fn keep_across_exec(file: &File) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file` and stays open for the duration of both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above; only the close-on-exec bit is changed.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
