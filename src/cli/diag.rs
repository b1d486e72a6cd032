//! Diagnostics on stderr.
//!
//! Every line is prefixed with the active personality's name. Usage lines
//! exit 100, fatal lines exit 111.

use crate::config::types::{LaunchError, EXIT_FATAL, EXIT_USAGE};
use log::{Level, LevelFilter};
use std::io::Write;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn level_word(level: Level) -> &'static str {
    match level {
        Level::Error => "fatal",
        Level::Warn => "warning",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

/// Install the stderr logger. Warnings only until `set_verbose` is called;
/// `RUST_LOG` is not read.
pub fn init_logging(name: &'static str) {
    let result = env_logger::Builder::new()
        .filter_level(LevelFilter::Debug)
        .target(env_logger::Target::Stderr)
        .format(move |buf, record| {
            writeln!(buf, "{}: {}: {}", name, level_word(record.level()), record.args())
        })
        .try_init();
    if result.is_ok() {
        log::set_max_level(LevelFilter::Warn);
    }
}

pub fn set_verbose(verbose: bool) {
    if verbose {
        log::set_max_level(LevelFilter::Debug);
    }
}

pub fn usage_line(name: &str, synopsis: &str) -> String {
    format!("usage: {} {}", name, synopsis)
}

pub fn fatal_line(name: &str, err: &LaunchError) -> String {
    format!("{}: fatal: {}", name, err)
}

pub fn version_line(name: &str) -> String {
    format!("{}: version {}", name, VERSION)
}

/// Print the usage line and exit 100.
pub fn usage(name: &str, synopsis: &str, detail: Option<&str>) -> ! {
    if let Some(detail) = detail {
        log::debug!("{}", detail);
    }
    eprintln!("{}", usage_line(name, synopsis));
    std::process::exit(EXIT_USAGE)
}

/// Print a fatal diagnostic and exit 111.
pub fn fatal(name: &str, err: &LaunchError) -> ! {
    eprintln!("{}", fatal_line(name, err));
    std::process::exit(EXIT_FATAL)
}
