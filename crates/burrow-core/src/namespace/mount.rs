//! Mount namespace isolation.
//!
//! A fresh mount namespace starts as a copy of the parent's, including its
//! shared propagation. Until the tree is remarked private, mounts made here
//! would still propagate to the host.

use burrow_common::error::{BurrowError, Result};
use nix::mount::MsFlags;

/// Remarks `/` and everything below it as private.
///
/// # Errors
///
/// Returns an error if the `mount(2)` propagation change fails.
pub fn make_private() -> Result<()> {
    nix::mount::mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| BurrowError::syscall("mount --make-rprivate /", e))?;
    tracing::debug!("mount propagation isolated");
    Ok(())
}
