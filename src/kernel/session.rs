//! Session detachment and standard stream closing.

use crate::config::types::{LaunchError, Result, StdStream, StreamClosing};

/// Start a new session and process group.
///
/// Fails harmlessly when the caller already leads a process group; the
/// launch continues either way.
pub fn detach() {
    match nix::unistd::setsid() {
        Ok(sid) => log::debug!("Started new session {}", sid),
        Err(e) => log::debug!("setsid failed, keeping current session: {}", e),
    }
}

/// Close the selected standard streams, stdin first.
pub fn close_streams(closing: StreamClosing) -> Result<()> {
    let selected = [
        (closing.stdin, StdStream::Stdin),
        (closing.stdout, StdStream::Stdout),
        (closing.stderr, StdStream::Stderr),
    ];
    for (_, stream) in selected.into_iter().filter(|(close, _)| *close) {
        nix::unistd::close(stream.fd())
            .map_err(|source| LaunchError::Stream { stream, source })?;
        log::debug!("Closed {}", stream);
    }
    Ok(())
}
