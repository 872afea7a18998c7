//! Mount utilities for container filesystem setup.
//!
//! Describes the bind and pseudo-filesystem mounts placed inside the new
//! root, and tracks them on a [`MountStack`] so each one is released in
//! reverse order whichever way the init sequence ends.

use std::fmt;
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use nix::mount::{MntFlags, MsFlags};

use crate::kernel::Kernel;

/// A single `mount(2)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Mount source (a path for bind mounts, a label for pseudo filesystems).
    pub source: PathBuf,
    /// Mount point.
    pub target: PathBuf,
    /// Filesystem type; `None` for bind mounts.
    pub fstype: Option<&'static str>,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific options.
    pub data: Option<String>,
}

impl MountSpec {
    /// Recursive bind mount of `root` onto itself, turning it into a mount
    /// point as `pivot_root(2)` requires.
    #[must_use]
    pub fn bind_self(root: &Path) -> Self {
        Self {
            source: root.to_path_buf(),
            target: root.to_path_buf(),
            fstype: None,
            flags: MsFlags::MS_BIND | MsFlags::MS_REC,
            data: None,
        }
    }

    /// `proc` filesystem with exec, setuid and device files disabled.
    #[must_use]
    pub fn proc(target: impl Into<PathBuf>) -> Self {
        Self {
            source: PathBuf::from("proc"),
            target: target.into(),
            fstype: Some("proc"),
            flags: MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            data: None,
        }
    }

    /// `tmpfs` instance with the given size/mode options.
    #[must_use]
    pub fn tmpfs(target: impl Into<PathBuf>, options: &str) -> Self {
        Self {
            source: PathBuf::from("tmpfs"),
            target: target.into(),
            fstype: Some("tmpfs"),
            flags: MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
            data: Some(options.to_owned()),
        }
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fstype {
            Some(fstype) => write!(f, "{} {}", fstype, self.target.display()),
            None => write!(
                f,
                "bind {} {}",
                self.source.display(),
                self.target.display()
            ),
        }
    }
}

/// How a mount is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmount {
    /// Plain unmount; fails if the mount is busy.
    Normal,
    /// Lazy detach (`MNT_DETACH`): the mount vanishes from the namespace at
    /// once, open descriptors keep working until closed.
    Detach,
}

/// Issues `mount(2)` for `spec`.
///
/// # Errors
///
/// Returns an error if the mount syscall fails.
pub fn mount(spec: &MountSpec) -> Result<()> {
    nix::mount::mount(
        Some(spec.source.as_path()),
        spec.target.as_path(),
        spec.fstype,
        spec.flags,
        spec.data.as_deref(),
    )
    .map_err(|e| BurrowError::syscall(format!("mount {spec}"), e))?;
    tracing::debug!(mount = %spec, "mounted");
    Ok(())
}

/// Unmounts `target`.
///
/// # Errors
///
/// Returns an error if the unmount syscall fails.
pub fn unmount(target: &Path, mode: Unmount) -> Result<()> {
    let flags = match mode {
        Unmount::Normal => MntFlags::empty(),
        Unmount::Detach => MntFlags::MNT_DETACH,
    };
    nix::mount::umount2(target, flags)
        .map_err(|e| BurrowError::syscall(format!("umount {}", target.display()), e))?;
    tracing::debug!(target = %target.display(), ?mode, "unmounted");
    Ok(())
}

/// Mounts acquired by the init sequence, released in reverse order on drop.
///
/// Release is best-effort: a failing unmount is logged and the remaining
/// entries are still attempted.
#[derive(Debug)]
pub struct MountStack<'k, K: Kernel + ?Sized> {
    kernel: &'k K,
    targets: Vec<PathBuf>,
}

impl<'k, K: Kernel + ?Sized> MountStack<'k, K> {
    /// Creates an empty stack releasing through `kernel`.
    pub const fn new(kernel: &'k K) -> Self {
        Self {
            kernel,
            targets: Vec::new(),
        }
    }

    /// Mounts `spec` and records its target for release.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount fails; nothing is recorded then.
    pub fn mount(&mut self, spec: &MountSpec) -> Result<()> {
        self.kernel.mount(spec)?;
        self.targets.push(spec.target.clone());
        Ok(())
    }

    /// Re-expresses every recorded target relative to `new_root`, which has
    /// just become `/`.
    ///
    /// The mount of `new_root` itself is now the root and is dropped from
    /// the stack, as is anything that was outside `new_root` and is no
    /// longer reachable.
    pub fn rebase(&mut self, new_root: &Path) {
        let targets = std::mem::take(&mut self.targets);
        self.targets = targets
            .into_iter()
            .filter_map(|target| match target.strip_prefix(new_root) {
                Ok(rel) if rel.as_os_str().is_empty() => None,
                Ok(rel) => Some(Path::new("/").join(rel)),
                Err(_) => {
                    tracing::warn!(target = %target.display(), "mount left behind by pivot");
                    None
                }
            })
            .collect();
    }

    /// Targets that will be released, in acquisition order.
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Releases all mounts now.
    pub fn release(self) {
        drop(self);
    }
}

impl<K: Kernel + ?Sized> Drop for MountStack<'_, K> {
    fn drop(&mut self) {
        while let Some(target) = self.targets.pop() {
            if let Err(e) = self.kernel.unmount(&target, Unmount::Normal) {
                tracing::warn!(target = %target.display(), error = %e, "failed to release mount");
            }
        }
    }
}
