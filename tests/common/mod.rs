//! Shared helpers for binary-level tests.
//!
//! The binary picks its personality from argv[0], so every personality is
//! reached through a symlink in a scratch directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const NAMES: [&str; 7] = [
    "chpst",
    "setuidgid",
    "envuidgid",
    "envdir",
    "pgrphack",
    "setlock",
    "softlimit",
];

pub struct Toolbox {
    dir: TempDir,
}

impl Toolbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("scratch dir");
        let binary = env!("CARGO_BIN_EXE_chpst");
        for name in NAMES {
            std::os::unix::fs::symlink(binary, dir.path().join(name)).expect("symlink");
            let marked = format!("d{}", name);
            std::os::unix::fs::symlink(binary, dir.path().join(marked)).expect("symlink");
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Scratch path next to the symlinks for lock files and env dirs.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn command(&self, name: &str) -> Command {
        Command::new(self.dir.path().join(name))
    }

    pub fn run(&self, name: &str, args: &[&str]) -> Output {
        self.command(name).args(args).output().expect("spawn")
    }
}

pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn current_user() -> nix::unistd::User {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .expect("passwd lookup")
        .expect("current user has a passwd entry")
}

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}
