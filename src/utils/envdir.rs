//! Environment directory loading and the prepared exec environment
//!
//! Each regular file in the directory becomes one variable: the name is the
//! file name, the value is the first line with trailing blanks removed and
//! NUL bytes turned into newlines. A file whose value ends up empty removes
//! the variable instead of setting it.

use crate::config::types::{LaunchError, Result};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::Command;

/// Upper bound on bytes read from a single entry (Linux MAX_ARG_STRLEN).
pub const MAX_VALUE_BYTES: u64 = 128 * 1024;

/// One variable derived from a directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvEntry {
    pub name: OsString,
    /// `None` removes the variable from the exec environment
    pub value: Option<OsString>,
}

/// Changes layered over the inherited environment of the exec target.
///
/// The preparing process never mutates its own environment; the overlay is
/// handed to the exec call instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedEnv {
    changes: BTreeMap<OsString, Option<OsString>>,
}

impl PreparedEnv {
    pub fn set(&mut self, name: impl Into<OsString>, value: impl Into<OsString>) {
        self.changes.insert(name.into(), Some(value.into()));
    }

    pub fn unset(&mut self, name: impl Into<OsString>) {
        self.changes.insert(name.into(), None);
    }

    pub fn apply(&mut self, entry: EnvEntry) {
        match entry.value {
            Some(value) => self.set(entry.name, value),
            None => self.unset(entry.name),
        }
    }

    /// `None` if untouched, `Some(None)` if removed, `Some(Some(v))` if set.
    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<Option<&OsStr>> {
        self.changes
            .get(name.as_ref())
            .map(|value| value.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Merge the overlay into a base environment.
    pub fn resolve<I>(&self, base: I) -> BTreeMap<OsString, OsString>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut env: BTreeMap<OsString, OsString> = base.into_iter().collect();
        for (name, value) in &self.changes {
            match value {
                Some(value) => {
                    env.insert(name.clone(), value.clone());
                }
                None => {
                    env.remove(name);
                }
            }
        }
        env
    }

    /// Install the overlay on a command that inherits the current environment.
    pub fn apply_to(&self, command: &mut Command) {
        for (name, value) in &self.changes {
            match value {
                Some(value) => {
                    command.env(name, value);
                }
                None => {
                    command.env_remove(name);
                }
            }
        }
    }
}

/// Read every variable file in `dir`.
///
/// The working directory is switched into `dir` for the scan and restored
/// before returning successfully. On error it is left as is.
pub fn load_env_dir(dir: &Path) -> Result<Vec<EnvEntry>> {
    let start = File::open(".").map_err(|source| LaunchError::EnvDir {
        action: "unable to open current working directory",
        dir: Path::new(".").to_path_buf(),
        source,
    })?;

    std::env::set_current_dir(dir).map_err(|source| LaunchError::EnvDir {
        action: "unable to switch to directory",
        dir: dir.to_path_buf(),
        source,
    })?;

    let entries = fs::read_dir(".").map_err(|source| LaunchError::EnvDir {
        action: "unable to open directory",
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut loaded = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LaunchError::EnvDir {
            action: "unable to read directory",
            dir: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        if name.as_bytes().first() == Some(&b'.') {
            continue;
        }

        let entry_error = |source: std::io::Error| LaunchError::EnvEntry {
            dir: dir.to_path_buf(),
            entry: name.clone(),
            source,
        };

        // Follows symlinks, so a link to a regular file counts as regular.
        let metadata = fs::metadata(&name).map_err(entry_error)?;
        if !metadata.is_file() {
            log::debug!(
                "Skipping non-regular entry {}/{}",
                dir.display(),
                name.to_string_lossy()
            );
            continue;
        }
        if name.as_bytes().contains(&b'=') {
            return Err(LaunchError::EnvName {
                dir: dir.to_path_buf(),
                entry: name.clone(),
            });
        }

        let raw = read_prefix(&name).map_err(entry_error)?;
        let value = decode_value(&raw).map(OsString::from_vec);
        match &value {
            Some(v) => log::debug!("envdir: {}={}", name.to_string_lossy(), v.to_string_lossy()),
            None => log::debug!("envdir: unset {}", name.to_string_lossy()),
        }
        loaded.push(EnvEntry { name, value });
    }

    restore_cwd(&start)?;
    Ok(loaded)
}

fn read_prefix(name: &OsStr) -> std::io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    File::open(name)?
        .take(MAX_VALUE_BYTES)
        .read_to_end(&mut raw)?;
    Ok(raw)
}

fn restore_cwd(start: &File) -> Result<()> {
    // SAFETY: fchdir only reads the descriptor, which `start` keeps open.
    let rc = unsafe { libc::fchdir(start.as_raw_fd()) };
    if rc != 0 {
        return Err(LaunchError::EnvDir {
            action: "unable to switch to starting directory",
            dir: Path::new(".").to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Turn raw file content into a variable value.
///
/// Truncate at the first newline, strip trailing spaces and tabs, then map
/// NUL to newline. Empty results mean "unset".
pub fn decode_value(raw: &[u8]) -> Option<Vec<u8>> {
    let line = match raw.iter().position(|&b| b == b'\n') {
        Some(end) => &raw[..end],
        None => raw,
    };
    let kept = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |last| last + 1);
    if kept == 0 {
        return None;
    }
    Some(
        line[..kept]
            .iter()
            .map(|&b| if b == 0 { b'\n' } else { b })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // load_env_dir changes the process-wide working directory.
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    fn write(dir: &Path, name: &str, content: &[u8]) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn load(dir: &Path) -> Result<PreparedEnv> {
        let mut env = PreparedEnv::default();
        for entry in load_env_dir(dir)? {
            env.apply(entry);
        }
        Ok(env)
    }

    #[test]
    fn decode_truncates_and_strips() {
        assert_eq!(decode_value(b"bar\n"), Some(b"bar".to_vec()));
        assert_eq!(decode_value(b"bar \t\nsecond line"), Some(b"bar".to_vec()));
        assert_eq!(decode_value(b"  leading kept"), Some(b"  leading kept".to_vec()));
        assert_eq!(decode_value(b"a\0b"), Some(b"a\nb".to_vec()));
    }

    #[test]
    fn decode_blank_content_unsets() {
        assert_eq!(decode_value(b""), None);
        assert_eq!(decode_value(b"\n"), None);
        assert_eq!(decode_value(b" \t \nignored"), None);
    }

    #[test]
    fn loads_directory_into_overlay() {
        let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "FOO", b"bar\n");
        write(dir.path(), "EMPTY", b" \n");
        write(dir.path(), "MULTI", b"a\0b");
        write(dir.path(), ".hidden", b"nope");
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let before = std::env::current_dir().unwrap();
        let env = load(dir.path()).unwrap();
        assert_eq!(std::env::current_dir().unwrap(), before);

        assert_eq!(env.get("FOO"), Some(Some(OsStr::new("bar"))));
        assert_eq!(env.get("EMPTY"), Some(None));
        assert_eq!(env.get("MULTI"), Some(Some(OsStr::new("a\nb"))));
        assert_eq!(env.get(".hidden"), None);
        assert_eq!(env.get("subdir"), None);

        let resolved = env.resolve(vec![
            (OsString::from("EMPTY"), OsString::from("inherited")),
            (OsString::from("KEEP"), OsString::from("yes")),
        ]);
        assert!(!resolved.contains_key(OsStr::new("EMPTY")));
        assert_eq!(resolved.get(OsStr::new("KEEP")), Some(&OsString::from("yes")));
        assert_eq!(resolved.get(OsStr::new("FOO")), Some(&OsString::from("bar")));
    }

    #[test]
    fn missing_directory_is_fatal() {
        let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let err = load_env_dir(&missing).unwrap_err();
        assert!(matches!(err, LaunchError::EnvDir { action: "unable to switch to directory", .. }));
        assert!(err.to_string().contains("absent"));
        assert_eq!(err.exit_code(), 111);
    }

    #[test]
    fn equals_sign_in_name_is_rejected() {
        let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A=B", b"value");

        let before = std::env::current_dir().unwrap();
        let err = load_env_dir(dir.path()).unwrap_err();
        std::env::set_current_dir(before).unwrap();
        assert!(matches!(err, LaunchError::EnvName { .. }));
    }

    #[test]
    fn apply_to_installs_overlay_on_command() {
        let mut env = PreparedEnv::default();
        env.set("FOO", "bar");
        env.unset("HOME");
        let mut command = Command::new("true");
        env.apply_to(&mut command);

        let envs: Vec<_> = command.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("FOO"), Some(OsStr::new("bar")))));
        assert!(envs.contains(&(OsStr::new("HOME"), None)));
    }
}
