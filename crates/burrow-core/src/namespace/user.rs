//! User namespace isolation.
//!
//! Maps container UIDs/GIDs to unprivileged host UIDs, enabling rootless containers.

use std::path::PathBuf;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::IdMaps;
use nix::unistd::Pid;

/// Writes the UID/GID mapping for the user namespace of `pid`.
///
/// `setgroups` is denied first, as the kernel requires before an
/// unprivileged process may write `gid_map`.
///
/// # Errors
///
/// Returns an error if writing to `/proc/[pid]/setgroups`,
/// `/proc/[pid]/uid_map`, or `/proc/[pid]/gid_map` fails.
pub fn write_id_maps(pid: Pid, maps: &IdMaps) -> Result<()> {
    let proc_dir = PathBuf::from(format!("/proc/{pid}"));

    let setgroups_path = proc_dir.join("setgroups");
    if setgroups_path.exists() {
        write_proc_file(setgroups_path, "deny")?;
    }
    write_proc_file(proc_dir.join("uid_map"), &maps.uid.to_string())?;
    write_proc_file(proc_dir.join("gid_map"), &maps.gid.to_string())?;

    tracing::debug!(%pid, uid_map = %maps.uid, gid_map = %maps.gid, "wrote UID/GID map");
    Ok(())
}

fn write_proc_file(path: PathBuf, contents: &str) -> Result<()> {
    std::fs::write(&path, contents).map_err(|e| BurrowError::Io { path, source: e })
}

/// Mapping of container root onto the invoking user and group.
#[must_use]
pub fn invoking_user_maps() -> IdMaps {
    use burrow_common::types::IdMapping;

    IdMaps {
        uid: IdMapping::root_to(nix::unistd::getuid().as_raw()),
        gid: IdMapping::root_to(nix::unistd::getgid().as_raw()),
    }
}
