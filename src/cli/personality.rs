//! Personality registry
//!
//! The binary behaves like a different tool depending on the name it was
//! invoked under. Each personality owns a grammar and turns it into the same
//! `Invocation`; everything after parsing is shared.

use crate::cli::grammar::{
    AccountArgs, ChpstArgs, EnvDirArgs, PgrpHackArgs, SetLockArgs, SoftLimitArgs,
};
use crate::config::types::{Invocation, LaunchConfig, LaunchError, Result};
use crate::exec::executor;
use std::convert::Infallible;
use std::ffi::OsString;

/// Result of parsing: either a launch or a request to print the version.
#[derive(Debug)]
pub enum Parsed {
    Launch(Invocation),
    Version,
}

pub trait Personality {
    /// Name used as the prefix of every diagnostic.
    fn name(&self) -> &'static str;

    /// Argument synopsis printed after `usage: <name>`.
    fn synopsis(&self) -> &'static str;

    fn parse(&self, args: &[OsString]) -> Result<Parsed>;

    /// Checks that cannot be expressed in the grammar.
    fn validate(&self, invocation: &Invocation) -> Result<()> {
        if invocation.command.is_empty() {
            return Err(LaunchError::usage("missing program to run"));
        }
        Ok(())
    }

    fn run(&self, invocation: &Invocation) -> Result<Infallible> {
        executor::launch(invocation)
    }
}

/// `setuidgid account child`
pub struct SetUidGid;

impl Personality for SetUidGid {
    fn name(&self) -> &'static str {
        "setuidgid"
    }

    fn synopsis(&self) -> &'static str {
        "account child"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        let (account, command) = AccountArgs::parse_args(args)?;
        Ok(Parsed::Launch(Invocation {
            config: LaunchConfig {
                apply_identity: Some(account),
                ..LaunchConfig::default()
            },
            command,
        }))
    }
}

/// `envuidgid account child`
pub struct EnvUidGid;

impl Personality for EnvUidGid {
    fn name(&self) -> &'static str {
        "envuidgid"
    }

    fn synopsis(&self) -> &'static str {
        "account child"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        let (account, command) = AccountArgs::parse_args(args)?;
        Ok(Parsed::Launch(Invocation {
            config: LaunchConfig {
                export_identity: Some(account),
                ..LaunchConfig::default()
            },
            command,
        }))
    }
}

/// `envdir dir child`
pub struct EnvDir;

impl Personality for EnvDir {
    fn name(&self) -> &'static str {
        "envdir"
    }

    fn synopsis(&self) -> &'static str {
        "dir child"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        EnvDirArgs::into_invocation(args).map(Parsed::Launch)
    }
}

/// `pgrphack child`
pub struct PgrpHack;

impl Personality for PgrpHack {
    fn name(&self) -> &'static str {
        "pgrphack"
    }

    fn synopsis(&self) -> &'static str {
        "child"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        PgrpHackArgs::into_invocation(args).map(Parsed::Launch)
    }
}

/// `setlock [-nNxX] file program [arg ...]`
pub struct SetLock;

impl Personality for SetLock {
    fn name(&self) -> &'static str {
        "setlock"
    }

    fn synopsis(&self) -> &'static str {
        "[ -nNxX ] file program [ arg ... ]"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        SetLockArgs::into_invocation(args).map(Parsed::Launch)
    }
}

/// `softlimit [-acdflmoprst n] child`
pub struct SoftLimit;

impl Personality for SoftLimit {
    fn name(&self) -> &'static str {
        "softlimit"
    }

    fn synopsis(&self) -> &'static str {
        "[-a allbytes] [-c corebytes] [-d databytes] [-f filebytes] [-l lockbytes] \
         [-m membytes] [-o openfiles] [-p processes] [-r residentbytes] [-s stackbytes] \
         [-t cpusecs] child"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        SoftLimitArgs::into_invocation(args).map(Parsed::Launch)
    }
}

/// The combined front end, used for every unrecognized name.
pub struct Chpst;

impl Personality for Chpst {
    fn name(&self) -> &'static str {
        "chpst"
    }

    fn synopsis(&self) -> &'static str {
        "[-vP012] [-u user[:group]] [-U user[:group]] [-e dir] [-l|-L lock] \
         [-m n] [-o n] [-p n] [-f n] [-c n] prog"
    }

    fn parse(&self, args: &[OsString]) -> Result<Parsed> {
        let (invocation, version) = ChpstArgs::into_invocation(args)?;
        if version {
            return Ok(Parsed::Version);
        }
        Ok(Parsed::Launch(invocation))
    }
}

/// Personality for an invocation name (already stripped of its marker).
pub fn personality_for(name: &str) -> Box<dyn Personality> {
    match name {
        "setuidgid" => Box::new(SetUidGid),
        "envuidgid" => Box::new(EnvUidGid),
        "envdir" => Box::new(EnvDir),
        "pgrphack" => Box::new(PgrpHack),
        "setlock" => Box::new(SetLock),
        "softlimit" => Box::new(SoftLimit),
        _ => Box::new(Chpst),
    }
}
