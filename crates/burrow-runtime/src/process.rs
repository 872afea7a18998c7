//! The contained command.
//!
//! The namespace init runs the user's command as its child, with the
//! standard streams inherited, and keeps running until it exits so the
//! mounts it holds can be released afterwards.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ChildExit;
use nix::sys::signal::{SigSet, Signal};

/// Runs `argv` to completion with inherited stdin, stdout and stderr.
///
/// # Errors
///
/// Returns an error if `argv` is empty or the program cannot be started.
pub fn run_command(argv: &[String]) -> Result<ChildExit> {
    let (program, args) = argv.split_first().ok_or_else(|| BurrowError::Config {
        message: "no command to run".into(),
    })?;
    tracing::info!(cmd = ?argv, "starting contained command");

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| BurrowError::Io {
            path: program.into(),
            source: e,
        })?;
    Ok(child_exit(status))
}

fn child_exit(status: ExitStatus) -> ChildExit {
    status.code().map_or_else(
        || ChildExit::Signaled(status.signal().unwrap_or_default()),
        ChildExit::Code,
    )
}

/// Blocks until SIGINT or SIGTERM is delivered to this process.
///
/// # Errors
///
/// Returns an error if the signals cannot be blocked or waited for.
pub fn wait_for_termination() -> Result<Signal> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals
        .thread_block()
        .map_err(|e| BurrowError::syscall("sigprocmask", e))?;
    let signal = signals
        .wait()
        .map_err(|e| BurrowError::syscall("sigwait", e))?;
    tracing::info!(?signal, "termination requested");
    Ok(signal)
}
