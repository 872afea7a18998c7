//! The seam between the init sequence and the kernel.
//!
//! Every call that changes the mount table, the root, the working directory
//! or the hostname goes through [`Kernel`], so the ordering of the sequence
//! can be exercised against a fake without privileges.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};

use crate::filesystem::mount::{MountSpec, Unmount};

/// Root-affecting operations used by the namespace init.
pub trait Kernel {
    /// Sets the hostname of the current UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `sethostname(2)` fails.
    fn set_hostname(&self, name: &str) -> Result<()>;

    /// Remarks the whole mount tree as private and recursive.
    ///
    /// # Errors
    ///
    /// Returns an error if the propagation change is rejected.
    fn make_mounts_private(&self) -> Result<()>;

    /// Performs a single mount.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` fails.
    fn mount(&self, spec: &MountSpec) -> Result<()>;

    /// Unmounts `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `umount2(2)` fails.
    fn unmount(&self, target: &Path, mode: Unmount) -> Result<()>;

    /// Changes the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `chdir(2)` fails.
    fn chdir(&self, path: &Path) -> Result<()>;

    /// Swaps the root filesystem, parking the old root at `put_old`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pivot_root(2)` fails.
    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()>;

    /// Recursively removes a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

/// [`Kernel`] backed by real system calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxKernel;

impl Kernel for LinuxKernel {
    fn set_hostname(&self, name: &str) -> Result<()> {
        crate::namespace::uts::set_hostname(name)
    }

    fn make_mounts_private(&self) -> Result<()> {
        crate::namespace::mount::make_private()
    }

    fn mount(&self, spec: &MountSpec) -> Result<()> {
        crate::filesystem::mount::mount(spec)
    }

    fn unmount(&self, target: &Path, mode: Unmount) -> Result<()> {
        crate::filesystem::mount::unmount(target, mode)
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path)
            .map_err(|e| BurrowError::syscall(format!("chdir({})", path.display()), e))?;
        tracing::debug!(path = %path.display(), "changed directory");
        Ok(())
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        crate::filesystem::pivot_root::pivot_root(new_root, put_old)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path).map_err(|e| BurrowError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
