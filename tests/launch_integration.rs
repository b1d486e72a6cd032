//! Binary-level tests for locking and resource limits.

mod common;

use common::{stderr_of, stdout_of, Toolbox};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::thread;
use std::time::{Duration, Instant};

fn hold_lock(path: &Path) -> File {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.lock_exclusive().unwrap();
    file
}

fn lock_is_free(path: &Path) -> bool {
    let file = OpenOptions::new().append(true).open(path).unwrap();
    let free = file.try_lock_exclusive().is_ok();
    if free {
        file.unlock().unwrap();
    }
    free
}

#[test]
fn setlock_creates_missing_lock_file() {
    let tools = Toolbox::new();
    let lock = tools.scratch("lk");
    let output = tools.run("setlock", &[lock.to_str().unwrap(), "true"]);
    assert!(output.status.success(), "{}", stderr_of(&output));
    assert!(lock.is_file());
}

#[test]
fn contended_lock_fails_or_yields() {
    let tools = Toolbox::new();
    let lock = tools.scratch("lk");
    let lock_arg = lock.to_str().unwrap();
    let _held = hold_lock(&lock);

    let output = tools.run("setlock", &["-n", lock_arg, "true"]);
    assert_eq!(output.status.code(), Some(111));
    assert!(stderr_of(&output).starts_with("setlock: fatal: "));

    let output = tools.run("setlock", &["-n", "-x", lock_arg, "true"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr_of(&output).is_empty());

    let output = tools.run("chpst", &["-L", lock_arg, "true"]);
    assert_eq!(output.status.code(), Some(111));
}

#[test]
fn fire_and_forget_covers_unrunnable_target() {
    let tools = Toolbox::new();
    let lock = tools.scratch("lk");
    let output = tools.run("setlock", &["-x", lock.to_str().unwrap(), "/nonexistent/chpst-target"]);
    assert_eq!(output.status.code(), Some(0));

    let output = tools.run("setlock", &[lock.to_str().unwrap(), "/nonexistent/chpst-target"]);
    assert_eq!(output.status.code(), Some(111));
}

#[test]
fn blocking_lock_waits_for_holder() {
    let tools = Toolbox::new();
    let lock = tools.scratch("lk");
    let held = hold_lock(&lock);

    let mut child = tools
        .command("chpst")
        .args(["-l", lock.to_str().unwrap(), "true"])
        .spawn()
        .unwrap();
    thread::sleep(Duration::from_millis(300));
    assert!(child.try_wait().unwrap().is_none(), "launch did not wait");

    held.unlock().unwrap();
    let status = child.wait().unwrap();
    assert!(status.success());
}

#[test]
fn lock_is_held_by_the_target() {
    let tools = Toolbox::new();
    let lock = tools.scratch("lk");

    let mut child = tools
        .command("setlock")
        .args([lock.to_str().unwrap(), "sh", "-c", "read line"])
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !lock.exists() || lock_is_free(&lock) {
        assert!(Instant::now() < deadline, "lock never taken");
        thread::sleep(Duration::from_millis(20));
    }

    child.stdin.take().unwrap().write_all(b"go\n").unwrap();
    assert!(child.wait().unwrap().success());
    assert!(lock_is_free(&lock));
}

#[test]
fn second_launch_loses_to_the_holder() {
    let tools = Toolbox::new();
    let lock = tools.scratch("lk");
    let lock_arg = lock.to_str().unwrap();

    let mut holder = tools
        .command("setlock")
        .args(["-n", lock_arg, "sh", "-c", "read line"])
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !lock.exists() || lock_is_free(&lock) {
        assert!(Instant::now() < deadline, "lock never taken");
        thread::sleep(Duration::from_millis(20));
    }

    let output = tools.run("setlock", &["-n", lock_arg, "echo", "ran"]);
    assert_eq!(output.status.code(), Some(111));
    assert!(stdout_of(&output).is_empty());
    assert!(stderr_of(&output).starts_with("setlock: fatal: "));

    let output = tools.run("setlock", &["-n", "-x", lock_arg, "echo", "ran"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_of(&output).is_empty());

    let output = tools.run("chpst", &["-L", lock_arg, "echo", "ran"]);
    assert_eq!(output.status.code(), Some(111));
    assert!(stdout_of(&output).is_empty());

    holder.stdin.take().unwrap().write_all(b"go\n").unwrap();
    assert!(holder.wait().unwrap().success());

    let output = tools.run("setlock", &["-n", lock_arg, "echo", "ran"]);
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "ran\n");
}

#[cfg(target_os = "linux")]
mod limits {
    use super::*;
    use nix::sys::resource::{setrlimit, Resource};
    use std::os::unix::process::CommandExt;

    /// (soft, hard) of one row of /proc/self/limits.
    fn limit_row(limits: &str, label: &str) -> (String, String) {
        let row = limits
            .lines()
            .find(|line| line.starts_with(label))
            .unwrap_or_else(|| panic!("no row {:?} in {}", label, limits));
        let mut values = row[label.len()..].split_whitespace();
        (
            values.next().unwrap().to_string(),
            values.next().unwrap().to_string(),
        )
    }

    #[test]
    fn softlimit_sets_open_files() {
        let tools = Toolbox::new();
        let output = tools.run("softlimit", &["-o", "100", "cat", "/proc/self/limits"]);
        assert!(output.status.success(), "{}", stderr_of(&output));
        let (soft, _) = limit_row(&stdout_of(&output), "Max open files");
        assert_eq!(soft, "100");
    }

    #[test]
    fn requests_are_capped_at_hard_limit() {
        let tools = Toolbox::new();
        let mut command = tools.command("chpst");
        command.args(["-o", "999999999", "cat", "/proc/self/limits"]);
        // SAFETY: setrlimit is async-signal-safe.
        unsafe {
            command.pre_exec(|| {
                setrlimit(Resource::RLIMIT_NOFILE, 256, 512).map_err(std::io::Error::from)
            });
        }
        let output = command.output().unwrap();
        assert!(output.status.success(), "{}", stderr_of(&output));
        let (soft, hard) = limit_row(&stdout_of(&output), "Max open files");
        assert_eq!(soft, "512");
        assert_eq!(hard, "512");
    }

    #[test]
    fn equals_raises_soft_to_hard() {
        let tools = Toolbox::new();
        let mut command = tools.command("softlimit");
        command.args(["-c", "=", "cat", "/proc/self/limits"]);
        // SAFETY: setrlimit is async-signal-safe.
        unsafe {
            command.pre_exec(|| {
                setrlimit(Resource::RLIMIT_CORE, 0, 4096).map_err(std::io::Error::from)
            });
        }
        let output = command.output().unwrap();
        assert!(output.status.success(), "{}", stderr_of(&output));
        let (soft, hard) = limit_row(&stdout_of(&output), "Max core file size");
        assert_eq!(soft, "4096");
        assert_eq!(hard, "4096");
    }

    #[test]
    fn memory_flag_covers_data_and_stack() {
        let tools = Toolbox::new();
        let output = tools.run(
            "softlimit",
            &["-m", "300000000", "-s", "8000000", "cat", "/proc/self/limits"],
        );
        assert!(output.status.success(), "{}", stderr_of(&output));
        let limits = stdout_of(&output);
        let (data, _) = limit_row(&limits, "Max data size");
        let (stack, _) = limit_row(&limits, "Max stack size");
        let (address, _) = limit_row(&limits, "Max address space");
        assert_eq!(data, "300000000");
        assert_eq!(address, "300000000");
        assert_eq!(stack, "8000000");
    }
}
