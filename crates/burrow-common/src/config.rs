//! Runtime configuration model.
//!
//! Nothing here is read from files or the environment; the values are the
//! built-in defaults, carried as a typed value so both stages agree on them.

use std::path::{Path, PathBuf};

use crate::constants::{PUT_OLD_DIR, ROOTFS_DIR, TMPFS_OPTIONS};
use crate::error::{BurrowError, Result};
use crate::types::ImageName;

/// Paths and mount options shared by the launcher and the namespace init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory containing one provisioned tree per image.
    pub rootfs_dir: PathBuf,
    /// tmpfs options for the container's `/dev`.
    pub dev_tmpfs_options: String,
    /// tmpfs options for the container's `/tmp`.
    pub tmp_tmpfs_options: String,
}

impl RuntimeConfig {
    /// Configuration rooted at `<working_dir>/rootfs`.
    #[must_use]
    pub fn for_working_dir(working_dir: &Path) -> Self {
        Self {
            rootfs_dir: working_dir.join(ROOTFS_DIR),
            dev_tmpfs_options: TMPFS_OPTIONS.to_owned(),
            tmp_tmpfs_options: TMPFS_OPTIONS.to_owned(),
        }
    }

    /// Configuration rooted at the process's current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| BurrowError::Io {
            path: PathBuf::from("."),
            source: e,
        })?;
        Ok(Self::for_working_dir(&cwd))
    }

    /// Host path of the provisioned tree for `image` (the new root).
    #[must_use]
    pub fn new_root(&self, image: &ImageName) -> PathBuf {
        self.rootfs_dir.join(image.as_str())
    }

    /// Host path of the old-root parking directory for `image`.
    #[must_use]
    pub fn put_old(&self, image: &ImageName) -> PathBuf {
        self.new_root(image).join(PUT_OLD_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_root_lives_under_working_dir_rootfs() {
        let config = RuntimeConfig::for_working_dir(Path::new("/srv/work"));
        let image = ImageName::parse("busybox-test").unwrap();
        assert_eq!(
            config.new_root(&image),
            PathBuf::from("/srv/work/rootfs/busybox-test")
        );
        assert_eq!(
            config.put_old(&image),
            PathBuf::from("/srv/work/rootfs/busybox-test/.put_old")
        );
    }

    #[test]
    fn tmpfs_defaults_match_general_container_use() {
        let config = RuntimeConfig::for_working_dir(Path::new("/"));
        assert_eq!(config.dev_tmpfs_options, "mode=755,size=65536k");
        assert_eq!(config.tmp_tmpfs_options, config.dev_tmpfs_options);
    }
}
