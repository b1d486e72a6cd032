//! Command-line front end.
//!
//! One binary, several personalities chosen by the name it runs under.

pub mod diag;
pub mod grammar;
pub mod personality;

use crate::config::types::LaunchError;
use personality::{personality_for, Parsed};
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Personality name from argv[0]: the basename with one leading `d` removed.
pub fn invocation_name(argv0: &OsStr) -> String {
    let base = Path::new(argv0)
        .file_name()
        .unwrap_or(argv0)
        .to_string_lossy();
    base.strip_prefix('d').unwrap_or(base.as_ref()).to_string()
}

/// Parse the process arguments, prepare and exec. Never returns.
pub fn run() -> ! {
    let args: Vec<OsString> = std::env::args_os().collect();
    let argv0 = args.first().cloned().unwrap_or_default();
    let personality = personality_for(&invocation_name(&argv0));
    let name = personality.name();
    diag::init_logging(name);

    let invocation = match personality.parse(&args) {
        Ok(Parsed::Launch(invocation)) => invocation,
        Ok(Parsed::Version) => {
            eprintln!("{}", diag::version_line(name));
            diag::usage(name, personality.synopsis(), None)
        }
        Err(LaunchError::Usage { detail }) => {
            diag::usage(name, personality.synopsis(), Some(&detail))
        }
        Err(err) => diag::fatal(name, &err),
    };
    diag::set_verbose(invocation.config.verbose);

    if let Err(err) = personality.validate(&invocation) {
        match err {
            LaunchError::Usage { detail } => {
                diag::usage(name, personality.synopsis(), Some(&detail))
            }
            err => diag::fatal(name, &err),
        }
    }

    match personality.run(&invocation) {
        Ok(never) => match never {},
        Err(LaunchError::Usage { detail }) => {
            diag::usage(name, personality.synopsis(), Some(&detail))
        }
        Err(LaunchError::Yielded(cause)) => {
            log::debug!("{}", cause);
            std::process::exit(0)
        }
        Err(err) => diag::fatal(name, &err),
    }
}
