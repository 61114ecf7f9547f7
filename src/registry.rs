//! Host process listing and termination.
//!
//! Both operations work on arbitrary host processes, not only on ones the
//! interpreter started, and keep no state of their own.

use crate::command::exit_code_of;
use crate::config::ListingCommand;
use crate::error::{Result, ShellError};
use log::{debug, info};
use std::io::{self, Write};
use std::process::{Command, Stdio};

/// Run the host listing command and copy its output into `out` verbatim.
pub fn list_processes(listing: &ListingCommand, out: &mut dyn Write) -> Result<()> {
    debug!("listing processes with `{}`", listing.program);
    let subprocess_failed = |cause| ShellError::SubprocessFailed { cause };

    let mut child = Command::new(&listing.program)
        .args(&listing.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(subprocess_failed)?;

    let copied = match child.stdout.take() {
        Some(mut stdout) => io::copy(&mut stdout, out).map(|_| ()),
        None => Ok(()),
    };
    // reap the child even when copying failed
    let status = child.wait().map_err(subprocess_failed)?;
    copied.map_err(subprocess_failed)?;

    if status.success() {
        Ok(())
    } else {
        Err(ShellError::SubprocessFailed {
            cause: io::Error::other(format!(
                "`{}` exited with status {}",
                listing.program,
                exit_code_of(status)
            )),
        })
    }
}

/// Parse a user supplied process id. Only positive ids are accepted, so the
/// signal can never reach a whole process group.
pub fn parse_pid(value: &str) -> Result<i32> {
    match value.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(ShellError::InvalidProcessId {
            value: value.to_string(),
        }),
    }
}

/// Send a termination signal to `pid`.
#[cfg(unix)]
pub fn terminate(pid: i32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => {
            info!("sent SIGTERM to {pid}");
            Ok(())
        }
        Err(Errno::ESRCH) => Err(ShellError::ProcessNotFound { pid }),
        Err(errno) => Err(ShellError::TerminationFailed {
            pid,
            cause: io::Error::from(errno),
        }),
    }
}

#[cfg(not(unix))]
pub fn terminate(pid: i32) -> Result<()> {
    info!("terminating {pid} with taskkill");
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|cause| ShellError::TerminationFailed { pid, cause })?;
    // taskkill reports 128 for an unknown pid
    match status.code() {
        Some(0) => Ok(()),
        Some(128) => Err(ShellError::ProcessNotFound { pid }),
        _ => Err(ShellError::TerminationFailed {
            pid,
            cause: io::Error::other(format!("taskkill exited with {status}")),
        }),
    }
}
