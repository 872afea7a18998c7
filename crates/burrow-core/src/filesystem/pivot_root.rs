//! Secure root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`. The old root is parked
//! in a directory under the new root, then detached and removed.

use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// Switches the root filesystem to `new_root` using `pivot_root(2)`.
///
/// The old root is moved to `put_old` and should be unmounted afterward.
///
/// # Errors
///
/// Returns an error if `pivot_root(2)` fails.
pub fn pivot_root(new_root: &Path, put_old: &Path) -> Result<()> {
    tracing::info!(
        new_root = %new_root.display(),
        put_old = %put_old.display(),
        "performing pivot_root"
    );
    nix::unistd::pivot_root(new_root, put_old).map_err(|e| {
        BurrowError::syscall(
            format!("pivot_root({}, {})", new_root.display(), put_old.display()),
            e,
        )
    })
}

/// The old-root parking directory under a new root.
///
/// If this invocation created the directory and the pivot never happened,
/// dropping the guard removes it again. Call [`ParkingDir::disarm`] once the
/// pivot has succeeded.
#[derive(Debug)]
pub struct ParkingDir {
    path: PathBuf,
    created: bool,
    armed: bool,
}

impl ParkingDir {
    /// Host path of the parking directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this invocation created the directory.
    #[must_use]
    pub const fn created(&self) -> bool {
        self.created
    }

    /// Keeps the directory on drop.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ParkingDir {
    fn drop(&mut self) {
        if self.armed && self.created {
            if let Err(e) = std::fs::remove_dir(&self.path) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove parking directory"
                );
            }
        }
    }
}

/// Creates the parking directory `put_old` inside `new_root`.
///
/// `new_root` is checked first and is never created: a missing root fails
/// here, before any mount is attempted. A leftover `put_old` is reused only
/// if it is an empty directory on the same device as `new_root`.
///
/// # Errors
///
/// Returns [`BurrowError::NotFound`] if `new_root` does not exist, and a
/// configuration or I/O error if either path is unusable.
pub fn prepare_put_old(new_root: &Path, put_old: &Path) -> Result<ParkingDir> {
    let root_meta = match std::fs::metadata(new_root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BurrowError::NotFound {
                kind: "root filesystem",
                id: new_root.display().to_string(),
            });
        }
        Err(e) => {
            return Err(BurrowError::Io {
                path: new_root.to_path_buf(),
                source: e,
            });
        }
    };
    if !root_meta.is_dir() {
        return Err(BurrowError::Config {
            message: format!("root filesystem {} is not a directory", new_root.display()),
        });
    }

    match std::fs::DirBuilder::new().mode(0o700).create(put_old) {
        Ok(()) => {
            tracing::debug!(path = %put_old.display(), "created parking directory");
            Ok(ParkingDir {
                path: put_old.to_path_buf(),
                created: true,
                armed: true,
            })
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            check_reusable(put_old, root_meta.dev())?;
            tracing::debug!(path = %put_old.display(), "reusing parking directory");
            Ok(ParkingDir {
                path: put_old.to_path_buf(),
                created: false,
                armed: true,
            })
        }
        Err(e) => Err(BurrowError::Io {
            path: put_old.to_path_buf(),
            source: e,
        }),
    }
}

fn check_reusable(put_old: &Path, root_dev: u64) -> Result<()> {
    let io_err = |e| BurrowError::Io {
        path: put_old.to_path_buf(),
        source: e,
    };
    let meta = std::fs::symlink_metadata(put_old).map_err(io_err)?;
    if !meta.is_dir() {
        return Err(BurrowError::Config {
            message: format!("{} exists and is not a directory", put_old.display()),
        });
    }
    if meta.dev() != root_dev {
        return Err(BurrowError::Config {
            message: format!("{} is a mount point", put_old.display()),
        });
    }
    if std::fs::read_dir(put_old).map_err(io_err)?.next().is_some() {
        return Err(BurrowError::Config {
            message: format!("{} is not empty", put_old.display()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_fails_without_creating_anything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let new_root = dir.path().join("rootfs").join("absent");
        let put_old = new_root.join(".put_old");

        let err = prepare_put_old(&new_root, &put_old).unwrap_err();
        assert!(matches!(err, BurrowError::NotFound { .. }), "{err}");
        assert!(!dir.path().join("rootfs").exists());
    }

    #[test]
    fn root_that_is_a_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let new_root = dir.path().join("image");
        std::fs::write(&new_root, b"not a tree").expect("write");

        let err = prepare_put_old(&new_root, &new_root.join(".put_old")).unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }), "{err}");
    }

    #[test]
    fn creates_private_parking_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let put_old = dir.path().join(".put_old");

        let mut parking = prepare_put_old(dir.path(), &put_old).expect("prepare");
        assert!(parking.created());
        let mode = std::fs::metadata(&put_old).expect("stat").permissions().mode();
        assert_eq!(mode & 0o077, 0);
        parking.disarm();
        drop(parking);
        assert!(put_old.is_dir());
    }

    #[test]
    fn armed_guard_removes_directory_it_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let put_old = dir.path().join(".put_old");

        let parking = prepare_put_old(dir.path(), &put_old).expect("prepare");
        drop(parking);
        assert!(!put_old.exists());
    }

    #[test]
    fn leftover_empty_directory_is_reused_and_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let put_old = dir.path().join(".put_old");
        std::fs::create_dir(&put_old).expect("mkdir");

        let parking = prepare_put_old(dir.path(), &put_old).expect("prepare");
        assert!(!parking.created());
        drop(parking);
        assert!(put_old.is_dir());
    }

    #[test]
    fn leftover_non_empty_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let put_old = dir.path().join(".put_old");
        std::fs::create_dir(&put_old).expect("mkdir");
        std::fs::write(put_old.join("etc"), b"host").expect("write");

        let err = prepare_put_old(dir.path(), &put_old).unwrap_err();
        assert!(err.to_string().contains("not empty"), "{err}");
    }
}
