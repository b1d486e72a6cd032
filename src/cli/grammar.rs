//! Flag grammars of the personalities.
//!
//! Every grammar stops option processing at the first operand; the operand
//! and everything after it is passed through untouched. Parse failures of
//! any kind are usage errors.

use crate::config::types::{
    IdentityRequest, Invocation, LaunchConfig, LaunchError, LimitKind, LimitTable, LimitValue,
    LockSpec, Result, StreamClosing,
};
use clap::{ArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

fn usage_error(err: clap::Error) -> LaunchError {
    let rendered = err.to_string();
    LaunchError::usage(rendered.lines().next().unwrap_or("invalid arguments").to_string())
}

fn parse_with_matches<T: Parser>(args: &[OsString]) -> Result<(T, ArgMatches)> {
    let matches = T::command()
        .try_get_matches_from(args)
        .map_err(usage_error)?;
    let parsed = T::from_arg_matches(&matches).map_err(usage_error)?;
    Ok((parsed, matches))
}

/// Unsigned decimal count. Values too large for 64 bits saturate; they are
/// capped at the hard limit later anyway.
fn parse_count(value: &str) -> std::result::Result<u64, String> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid number: {:?}", value));
    }
    Ok(value.parse::<u64>().unwrap_or(u64::MAX))
}

/// A count, or `=` for "raise to the hard limit".
fn parse_limit(value: &str) -> std::result::Result<LimitValue, String> {
    if value == "=" {
        Ok(LimitValue::Max)
    } else {
        parse_count(value).map(LimitValue::Value)
    }
}

/// Split `operands` into a leading argument and the child command.
fn leading_operand(mut operands: Vec<OsString>, what: &str) -> Result<(OsString, Vec<OsString>)> {
    if operands.is_empty() {
        return Err(LaunchError::usage(format!("missing {}", what)));
    }
    let first = operands.remove(0);
    if operands.is_empty() {
        return Err(LaunchError::usage("missing program to run"));
    }
    Ok((first, operands))
}

/// `setuidgid account child...` and `envuidgid account child...`
#[derive(Parser, Debug)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct AccountArgs {
    #[arg(value_name = "ACCOUNT CHILD", required = true, trailing_var_arg = true)]
    pub operands: Vec<OsString>,
}

impl AccountArgs {
    pub fn parse_args(args: &[OsString]) -> Result<(IdentityRequest, Vec<OsString>)> {
        let (parsed, _) = parse_with_matches::<Self>(args)?;
        let (account, command) = leading_operand(parsed.operands, "account")?;
        let account = IdentityRequest::account_only(account.to_string_lossy().into_owned());
        Ok((account, command))
    }
}

/// `envdir dir child...`
#[derive(Parser, Debug)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct EnvDirArgs {
    #[arg(value_name = "DIR CHILD", required = true, trailing_var_arg = true)]
    pub operands: Vec<OsString>,
}

impl EnvDirArgs {
    pub fn into_invocation(args: &[OsString]) -> Result<Invocation> {
        let (parsed, _) = parse_with_matches::<Self>(args)?;
        let (dir, command) = leading_operand(parsed.operands, "directory")?;
        Ok(Invocation {
            config: LaunchConfig {
                env_dir: Some(PathBuf::from(dir)),
                ..LaunchConfig::default()
            },
            command,
        })
    }
}

/// `pgrphack child...`
#[derive(Parser, Debug)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct PgrpHackArgs {
    #[arg(value_name = "CHILD", required = true, trailing_var_arg = true)]
    pub command: Vec<OsString>,
}

impl PgrpHackArgs {
    pub fn into_invocation(args: &[OsString]) -> Result<Invocation> {
        let (parsed, _) = parse_with_matches::<Self>(args)?;
        Ok(Invocation {
            config: LaunchConfig {
                detach: true,
                ..LaunchConfig::default()
            },
            command: parsed.command,
        })
    }
}

/// `setlock [-nNxX] file program [arg...]`
#[derive(Parser, Debug)]
#[command(
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
pub struct SetLockArgs {
    /// Fail immediately if the lock is held
    #[arg(short = 'n', overrides_with = "blocking")]
    pub nonblocking: bool,
    /// Wait for the lock (default)
    #[arg(short = 'N', overrides_with = "nonblocking")]
    pub blocking: bool,
    /// Exit 0 instead of failing when the lock cannot be taken
    #[arg(short = 'x', overrides_with = "hard_failure")]
    pub fire_and_forget: bool,
    /// Fail hard when the lock cannot be taken (default)
    #[arg(short = 'X', overrides_with = "fire_and_forget")]
    pub hard_failure: bool,
    #[arg(value_name = "FILE PROGRAM", required = true, trailing_var_arg = true)]
    pub operands: Vec<OsString>,
}

impl SetLockArgs {
    pub fn into_invocation(args: &[OsString]) -> Result<Invocation> {
        let (parsed, _) = parse_with_matches::<Self>(args)?;
        let (file, command) = leading_operand(parsed.operands, "lock file")?;
        Ok(Invocation {
            config: LaunchConfig {
                lock: Some(LockSpec {
                    path: PathBuf::from(file),
                    blocking: !parsed.nonblocking,
                    fire_and_forget: parsed.fire_and_forget,
                }),
                ..LaunchConfig::default()
            },
            command,
        })
    }
}

/// `softlimit [-acdflmoprst n] child...`
#[derive(Parser, Debug)]
#[command(
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
pub struct SoftLimitArgs {
    /// Address space in bytes
    #[arg(short = 'a', value_parser = parse_limit)]
    pub all: Option<LimitValue>,
    /// Core file size in bytes
    #[arg(short = 'c', value_parser = parse_limit)]
    pub core: Option<LimitValue>,
    /// Data segment in bytes
    #[arg(short = 'd', value_parser = parse_limit)]
    pub data: Option<LimitValue>,
    /// File size in bytes
    #[arg(short = 'f', value_parser = parse_limit)]
    pub file: Option<LimitValue>,
    /// Locked memory in bytes
    #[arg(short = 'l', value_parser = parse_limit)]
    pub lock: Option<LimitValue>,
    /// Data, stack, locked memory and address space at once
    #[arg(short = 'm', value_parser = parse_limit)]
    pub mem: Option<LimitValue>,
    /// Open file descriptors
    #[arg(short = 'o', value_parser = parse_limit)]
    pub open: Option<LimitValue>,
    /// Processes per user
    #[arg(short = 'p', value_parser = parse_limit)]
    pub processes: Option<LimitValue>,
    /// Resident set size in bytes
    #[arg(short = 'r', value_parser = parse_limit)]
    pub resident: Option<LimitValue>,
    /// Stack size in bytes
    #[arg(short = 's', value_parser = parse_limit)]
    pub stack: Option<LimitValue>,
    /// CPU seconds
    #[arg(short = 't', value_parser = parse_limit)]
    pub cpu: Option<LimitValue>,
    #[arg(value_name = "CHILD", required = true, trailing_var_arg = true)]
    pub command: Vec<OsString>,
}

/// Position of the last occurrence of an argument, if present.
fn last_index(matches: &ArgMatches, id: &str) -> Option<usize> {
    matches.indices_of(id).and_then(|indices| indices.last())
}

impl SoftLimitArgs {
    pub fn into_invocation(args: &[OsString]) -> Result<Invocation> {
        let (parsed, matches) = parse_with_matches::<Self>(args)?;
        let mut limits = LimitTable::default();

        // -m and the specific memory flags override each other left to right.
        let mem = parsed.mem.map(|v| (v, last_index(&matches, "mem")));
        let memory_flags = [
            (LimitKind::Data, parsed.data, "data"),
            (LimitKind::Stack, parsed.stack, "stack"),
            (LimitKind::MemLock, parsed.lock, "lock"),
            (LimitKind::AddressSpace, parsed.all, "all"),
        ];
        for (kind, specific, id) in memory_flags {
            let specific = specific.map(|v| (v, last_index(&matches, id)));
            let chosen = match (specific, mem) {
                (Some((v, at)), Some((m, mem_at))) => Some(if at > mem_at { v } else { m }),
                (Some((v, _)), None) => Some(v),
                (None, Some((m, _))) => Some(m),
                (None, None) => None,
            };
            if let Some(value) = chosen {
                limits.set(kind, value);
            }
        }

        let others = [
            (LimitKind::OpenFiles, parsed.open),
            (LimitKind::Processes, parsed.processes),
            (LimitKind::FileSize, parsed.file),
            (LimitKind::Core, parsed.core),
            (LimitKind::Resident, parsed.resident),
            (LimitKind::CpuTime, parsed.cpu),
        ];
        for (kind, value) in others {
            if let Some(value) = value {
                limits.set(kind, value);
            }
        }

        Ok(Invocation {
            config: LaunchConfig {
                limits,
                ..LaunchConfig::default()
            },
            command: parsed.command,
        })
    }
}

/// `chpst [-vP012V] [-u user[:group]] [-U user[:group]] [-e dir]
/// [-l|-L lock] [-m n] [-o n] [-p n] [-f n] [-c n] [-r n] [-t n] prog`
#[derive(Parser, Debug)]
#[command(
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
pub struct ChpstArgs {
    /// Run as this account (optionally with an explicit group)
    #[arg(short = 'u', value_name = "USER[:GROUP]")]
    pub set_user: Option<String>,
    /// Export UID/GID of this account instead of switching to it
    #[arg(short = 'U', value_name = "USER[:GROUP]")]
    pub env_user: Option<String>,
    /// Load environment variables from this directory
    #[arg(short = 'e', value_name = "DIR")]
    pub env_dir: Option<PathBuf>,
    /// Data, stack, locked memory and address space in bytes
    #[arg(short = 'm', value_parser = parse_count)]
    pub mem: Option<u64>,
    #[arg(short = 'o', value_parser = parse_count)]
    pub open: Option<u64>,
    #[arg(short = 'p', value_parser = parse_count)]
    pub processes: Option<u64>,
    #[arg(short = 'f', value_parser = parse_count)]
    pub file: Option<u64>,
    #[arg(short = 'c', value_parser = parse_count)]
    pub core: Option<u64>,
    #[arg(short = 'r', value_parser = parse_count)]
    pub resident: Option<u64>,
    #[arg(short = 't', value_parser = parse_count)]
    pub cpu: Option<u64>,
    /// Lock file, waiting for the holder
    #[arg(short = 'l', value_name = "LOCK", action = clap::ArgAction::Append, conflicts_with = "lock_nowait")]
    pub lock_wait: Vec<PathBuf>,
    /// Lock file, failing if it is held
    #[arg(short = 'L', value_name = "LOCK", action = clap::ArgAction::Append)]
    pub lock_nowait: Vec<PathBuf>,
    #[arg(short = 'v')]
    pub verbose: bool,
    /// Start a new session
    #[arg(short = 'P')]
    pub detach: bool,
    #[arg(short = '0')]
    pub close_stdin: bool,
    #[arg(short = '1')]
    pub close_stdout: bool,
    #[arg(short = '2')]
    pub close_stderr: bool,
    /// Print version and exit with usage status
    #[arg(short = 'V')]
    pub version: bool,
    #[arg(value_name = "PROG", required_unless_present = "version", trailing_var_arg = true)]
    pub command: Vec<OsString>,
}

impl ChpstArgs {
    pub fn into_invocation(args: &[OsString]) -> Result<(Invocation, bool)> {
        let (parsed, _) = parse_with_matches::<Self>(args)?;

        if parsed.lock_wait.len() + parsed.lock_nowait.len() > 1 {
            return Err(LaunchError::usage("only one lock may be given"));
        }
        let lock = match (parsed.lock_wait.into_iter().next(), parsed.lock_nowait.into_iter().next()) {
            (Some(path), _) => Some(LockSpec {
                path,
                blocking: true,
                fire_and_forget: false,
            }),
            (None, Some(path)) => Some(LockSpec {
                path,
                blocking: false,
                fire_and_forget: false,
            }),
            (None, None) => None,
        };

        let mut limits = LimitTable::default();
        if let Some(mem) = parsed.mem {
            for kind in LimitKind::MEMORY {
                limits.set(kind, LimitValue::Value(mem));
            }
        }
        let counts = [
            (LimitKind::OpenFiles, parsed.open),
            (LimitKind::Processes, parsed.processes),
            (LimitKind::FileSize, parsed.file),
            (LimitKind::Core, parsed.core),
            (LimitKind::Resident, parsed.resident),
            (LimitKind::CpuTime, parsed.cpu),
        ];
        for (kind, value) in counts {
            if let Some(value) = value {
                limits.set(kind, LimitValue::Value(value));
            }
        }

        let invocation = Invocation {
            config: LaunchConfig {
                apply_identity: parsed.set_user.map(IdentityRequest::with_group),
                export_identity: parsed.env_user.map(IdentityRequest::with_group),
                env_dir: parsed.env_dir,
                limits,
                lock,
                detach: parsed.detach,
                close: StreamClosing {
                    stdin: parsed.close_stdin,
                    stdout: parsed.close_stdout,
                    stderr: parsed.close_stderr,
                },
                verbose: parsed.verbose,
            },
            command: parsed.command,
        };
        Ok((invocation, parsed.version))
    }
}
