//! System-wide constants and default paths.

use std::path::PathBuf;

/// Directory, relative to the working directory, holding provisioned images.
pub const ROOTFS_DIR: &str = "rootfs";

/// Name of the directory the old root is parked in during `pivot_root`.
pub const PUT_OLD_DIR: &str = ".put_old";

/// Number of hex characters kept from the identifier digest.
pub const CONTAINER_ID_LENGTH: usize = 12;

/// Path used by the launcher to re-execute its own binary.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Subcommand name of the namespace init entry point.
pub const FORK_SUBCOMMAND: &str = "fork";

/// Flag that selects the pivot-free, PID-namespace-only mode.
pub const PID_ONLY_FLAG: &str = "--pid-only";

/// Stack size handed to `clone(2)` for the re-exec child.
pub const CLONE_STACK_SIZE: usize = 1024 * 1024;

/// Mount options for the `/dev` and `/tmp` tmpfs instances.
pub const TMPFS_OPTIONS: &str = "mode=755,size=65536k";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "burrow";

/// Returns the default import destination for an image: `$HOME/rootfs/<image>`.
///
/// Falls back to the current directory when `HOME` is unset.
pub fn default_import_dir(image: &str) -> PathBuf {
    let base = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    base.join(ROOTFS_DIR).join(image)
}
