//! Linux namespace management for container isolation.
//!
//! A container process is created with a single `clone(2)` that places it
//! in every requested namespace at once; it then re-executes a binary from
//! inside them. Namespace membership cannot be changed afterwards.

pub mod mount;
pub mod user;
pub mod uts;

use std::ffi::{CStr, CString};
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use burrow_common::constants::CLONE_STACK_SIZE;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ChildExit, IdMaps, NamespaceSet};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sched::CloneFlags;
use nix::sys::prctl::set_pdeathsig;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{Gid, Pid, Uid, execv, pipe2, setgid, setuid};

/// Clone flags for a namespace set.
#[must_use]
pub fn clone_flags(namespaces: NamespaceSet) -> CloneFlags {
    let mut flags = CloneFlags::empty();
    flags.set(CloneFlags::CLONE_NEWPID, namespaces.pid);
    flags.set(CloneFlags::CLONE_NEWNS, namespaces.mount);
    flags.set(CloneFlags::CLONE_NEWUTS, namespaces.uts);
    flags.set(CloneFlags::CLONE_NEWIPC, namespaces.ipc);
    flags.set(CloneFlags::CLONE_NEWUSER, namespaces.user);
    flags
}

/// A child created inside new namespaces.
///
/// Holds the write end of the handshake pipe until the child is reaped; the
/// child treats a hang-up on it as the launcher having died.
#[derive(Debug)]
pub struct NamespacedChild {
    pid: Pid,
    _ready: Option<std::fs::File>,
}

impl NamespacedChild {
    /// Host PID of the child.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Blocks until the child terminates.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails for a reason other than `EINTR`.
    pub fn wait(self) -> Result<ChildExit> {
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ChildExit::Code(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ChildExit::Signaled(signal as i32));
                }
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(BurrowError::syscall(format!("waitpid({})", self.pid), e));
                }
            }
        }
    }

    fn abort(self) {
        if let Err(e) = kill(self.pid, Signal::SIGKILL) {
            tracing::warn!(pid = %self.pid, error = %e, "failed to kill namespaced child");
        }
        if let Err(e) = self.wait() {
            tracing::warn!(error = %e, "failed to reap namespaced child");
        }
    }
}

/// Clones a child into `namespaces` and has it execute `exe` with `argv`.
///
/// When `id_maps` is given, the child waits on a pipe until the maps have
/// been written from this side, then switches to UID/GID 0 inside its user
/// namespace before exec. If writing the maps fails the child is killed and
/// reaped, and the error is returned.
///
/// # Errors
///
/// Returns an error if an argument contains a NUL byte, if `clone(2)` is
/// refused (commonly for lack of privilege to create user namespaces), or
/// if the ID maps cannot be written.
pub fn spawn_in_namespaces(
    exe: &Path,
    argv: &[String],
    namespaces: NamespaceSet,
    id_maps: Option<&IdMaps>,
) -> Result<NamespacedChild> {
    let nul_err = |what: &str| BurrowError::Config {
        message: format!("{what} contains a NUL byte"),
    };
    let exe_c =
        CString::new(exe.as_os_str().as_bytes()).map_err(|_| nul_err("executable path"))?;
    let argv_c = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| nul_err("argument"))?;

    let (ready_rx, ready_tx) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| BurrowError::syscall("pipe2", e))?;
    let (rx_fd, tx_fd) = (ready_rx.as_raw_fd(), ready_tx.as_raw_fd());
    let become_root = namespaces.user;

    let mut stack = vec![0u8; CLONE_STACK_SIZE];
    let child_main = Box::new(|| child_entry(rx_fd, tx_fd, become_root, &exe_c, &argv_c));
    let flags = clone_flags(namespaces);

    // SAFETY: the callback runs in a copy of this single-threaded process
    // and only calls async-signal-safe functions (close, read, setgid,
    // setuid, prctl, poll, execv) on data prepared before the clone.
    let pid = unsafe {
        nix::sched::clone(child_main, &mut stack, flags, Some(Signal::SIGCHLD as i32))
    }
    .map_err(|e| clone_error(flags, e))?;
    drop(ready_rx);
    tracing::info!(%pid, ?flags, "cloned child into new namespaces");
    let mut child = NamespacedChild { pid, _ready: None };

    if let Some(maps) = id_maps {
        if let Err(e) = user::write_id_maps(pid, maps) {
            child.abort();
            return Err(e);
        }
    }

    let mut ready = std::fs::File::from(ready_tx);
    if let Err(e) = ready.write_all(b"1") {
        child.abort();
        return Err(BurrowError::Io {
            path: "ready pipe".into(),
            source: e,
        });
    }
    child._ready = Some(ready);
    Ok(child)
}

/// `EPERM` means the caller may not create these namespaces; anything else
/// is reported as the failed syscall.
fn clone_error(flags: CloneFlags, errno: Errno) -> BurrowError {
    if errno == Errno::EPERM {
        BurrowError::PermissionDenied {
            message: format!("clone({flags:?}) refused: {errno}"),
        }
    } else {
        BurrowError::syscall(format!("clone({flags:?})"), errno)
    }
}

fn child_entry(
    ready: RawFd,
    unused: RawFd,
    become_root: bool,
    exe: &CStr,
    argv: &[CString],
) -> isize {
    let mut byte = [0u8; 1];
    // SAFETY: both descriptors are this process's copies of the pipe ends;
    // the buffer is valid for one byte.
    let n = unsafe {
        let _ = libc::close(unused);
        libc::read(ready, byte.as_mut_ptr().cast(), 1)
    };
    if n != 1 {
        return 1;
    }
    if become_root && (setgid(Gid::from_raw(0)).is_err() || setuid(Uid::from_raw(0)).is_err()) {
        return 1;
    }
    // Set after the credential change, which would clear it.
    if set_pdeathsig(Signal::SIGKILL).is_err() || launcher_gone(ready) {
        return 1;
    }
    match execv(exe, argv) {
        Ok(never) => match never {},
        Err(_) => 127,
    }
}

/// Whether the launcher's end of the handshake pipe has been closed.
fn launcher_gone(ready: RawFd) -> bool {
    let mut pfd = libc::pollfd {
        fd: ready,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a single valid pollfd; a zero timeout never blocks.
    let n = unsafe { libc::poll(&mut pfd, 1, 0) };
    n < 0 || pfd.revents & libc::POLLHUP != 0
}
