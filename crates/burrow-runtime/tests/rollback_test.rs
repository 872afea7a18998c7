//! Rollback of a failed pivot against the real kernel.
//!
//! The init sequence runs as PID 1 of a private user, mount and PID
//! namespace, with a kernel whose `pivot_root` always fails. Afterwards no
//! mount may remain under the new root and the parking directory must be
//! gone. Skipped when the host does not allow unprivileged user namespaces.

#![allow(unsafe_code, clippy::expect_used, clippy::unwrap_used, clippy::print_stderr)]

use std::path::Path;

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, IdMaps, ImageName, InitStage};
use burrow_core::filesystem::mount::{MountSpec, Unmount};
use burrow_core::kernel::{Kernel, LinuxKernel};
use burrow_core::namespace::mount::make_private;
use burrow_core::namespace::user::{invoking_user_maps, write_id_maps};
use burrow_runtime::init::{self, InitConfig};
use nix::errno::Errno;
use nix::sched::{CloneFlags, unshare};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

const SKIPPED: i32 = 77;
const LEAKED: i32 = 3;
const UNEXPECTED: i32 = 4;

/// The real kernel, except that every pivot is refused.
struct PivotRefused(LinuxKernel);

impl Kernel for PivotRefused {
    fn set_hostname(&self, name: &str) -> Result<()> {
        self.0.set_hostname(name)
    }

    fn make_mounts_private(&self) -> Result<()> {
        self.0.make_mounts_private()
    }

    fn mount(&self, spec: &MountSpec) -> Result<()> {
        self.0.mount(spec)
    }

    fn unmount(&self, target: &Path, mode: Unmount) -> Result<()> {
        self.0.unmount(target, mode)
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        self.0.chdir(path)
    }

    fn pivot_root(&self, _new_root: &Path, _put_old: &Path) -> Result<()> {
        Err(BurrowError::syscall("pivot_root", Errno::EINVAL))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.0.remove_dir_all(path)
    }
}

fn exit_now(code: i32) -> ! {
    // SAFETY: terminates a forked test child without running the parent's
    // atexit handlers or flushing its buffers.
    unsafe { libc::_exit(code) }
}

fn exit_code(pid: Pid) -> i32 {
    match waitpid(pid, None) {
        Ok(WaitStatus::Exited(_, code)) => code,
        _ => UNEXPECTED,
    }
}

/// Runs `f` as PID 1 of fresh user, mount and PID namespaces and returns its
/// exit code, or `None` if such namespaces cannot be set up here.
fn in_private_namespaces(maps: IdMaps, f: impl FnOnce() -> i32) -> Option<i32> {
    // SAFETY: this file holds a single test, so no other test thread can
    // hold a lock across the fork; the child only sets up namespaces, runs
    // `f` in a second child, and exits.
    match unsafe { fork() }.expect("fork") {
        ForkResult::Child => {
            let flags =
                CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID;
            if unshare(flags).is_err()
                || write_id_maps(Pid::this(), &maps).is_err()
                || make_private().is_err()
            {
                exit_now(SKIPPED);
            }
            // SAFETY: the process is single-threaded after the first fork.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => exit_now(f()),
                Ok(ForkResult::Parent { child }) => exit_now(exit_code(child)),
                Err(_) => exit_now(UNEXPECTED),
            }
        }
        ForkResult::Parent { child } => match exit_code(child) {
            SKIPPED => None,
            code => Some(code),
        },
    }
}

fn mounts_under(root: &Path) -> Vec<String> {
    std::fs::read_to_string("/proc/self/mountinfo")
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .filter(|mount_point| Path::new(mount_point).starts_with(root))
        .map(str::to_owned)
        .collect()
}

fn run_with_refused_pivot(config: &InitConfig) -> i32 {
    match init::run(&PivotRefused(LinuxKernel), config) {
        Err(BurrowError::Bootstrap {
            stage: InitStage::Pivoted,
            ..
        }) => {}
        _ => return UNEXPECTED,
    }
    if !mounts_under(&config.new_root).is_empty() || config.put_old.exists() {
        return LEAKED;
    }
    0
}

#[test]
fn failed_pivot_leaves_no_mount_under_the_new_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = RuntimeConfig::for_working_dir(dir.path());
    let image = ImageName::parse("busybox-test").unwrap();
    std::fs::create_dir_all(runtime.new_root(&image)).expect("mkdir rootfs");
    let config = InitConfig::new(
        ContainerId::parse("abc123def456").unwrap(),
        &image,
        vec!["true".to_owned()],
        &runtime,
    );

    let maps = invoking_user_maps();
    let Some(code) = in_private_namespaces(maps, || run_with_refused_pivot(&config)) else {
        eprintln!("skipping: user namespaces are not available");
        return;
    };
    assert_eq!(code, 0, "exit {code}: {LEAKED} means mounts leaked, {UNEXPECTED} a wrong error");
}
