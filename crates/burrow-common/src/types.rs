//! Domain primitive types used across the Burrow workspace.

use std::fmt;
use std::path::{Component, Path};

use sha2::{Digest, Sha256};

use crate::constants::CONTAINER_ID_LENGTH;
use crate::error::{BurrowError, Result};

/// Short label for one container instance, also used as its hostname.
///
/// Derived from the SHA-256 of a timestamp. Two launches that observe the
/// same timestamp get the same identifier; callers treat it as a label,
/// never as a unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    /// Wraps an identifier received from the launcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or is not a valid hostname
    /// label (lowercase hex is always accepted).
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 64
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !id.starts_with('-');
        if !valid {
            return Err(BurrowError::Config {
                message: format!("invalid container id: {id:?}"),
            });
        }
        Ok(Self(id))
    }

    /// Derives an identifier from the current wall-clock time.
    #[must_use]
    pub fn generate() -> Self {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
        Self::from_timestamp(&now)
    }

    /// Derives an identifier from an arbitrary timestamp string.
    #[must_use]
    pub fn from_timestamp(timestamp: &str) -> Self {
        let digest = Sha256::digest(timestamp.as_bytes());
        let mut hex = format!("{digest:x}");
        hex.truncate(CONTAINER_ID_LENGTH);
        Self(hex)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a provisioned image, used as a path component under the rootfs
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName(String);

impl ImageName {
    /// Validates an image name.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::InvalidImage`] if the name is empty, absolute,
    /// contains a NUL byte, or has `.`/`..` components that would escape the
    /// rootfs directory.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reject = |reason| {
            Err(BurrowError::InvalidImage {
                name: name.clone(),
                reason,
            })
        };
        if name.is_empty() {
            return reject("name is empty");
        }
        if name.contains('\0') {
            return reject("name contains a NUL byte");
        }
        let path = Path::new(&name);
        if path.is_absolute() {
            return reject("name must be relative");
        }
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return reject("name must not contain '.' or '..' components");
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Isolation domains requested for a new container process.
///
/// Fixed when the child is created.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSet {
    /// Isolate the PID namespace.
    pub pid: bool,
    /// Isolate the mount namespace.
    pub mount: bool,
    /// Isolate the UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate the IPC namespace.
    pub ipc: bool,
    /// Isolate the user namespace.
    pub user: bool,
}

impl NamespaceSet {
    /// PID, mount, UTS, IPC and user namespaces.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            pid: true,
            mount: true,
            uts: true,
            ipc: true,
            user: true,
        }
    }

    /// Only a PID namespace. Used by the degraded, pivot-free mode.
    #[must_use]
    pub const fn pid_only() -> Self {
        Self {
            pid: true,
            mount: false,
            uts: false,
            ipc: false,
            user: false,
        }
    }
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self::full()
    }
}

/// One line of a `uid_map` or `gid_map` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    /// First ID inside the namespace.
    pub container_id: u32,
    /// First ID on the host.
    pub host_id: u32,
    /// Number of consecutive IDs mapped.
    pub size: u32,
}

impl IdMapping {
    /// Maps container root to a single host ID.
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            size: 1,
        }
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.container_id, self.host_id, self.size)
    }
}

/// UID and GID mapping applied to a new user namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMaps {
    /// Single entry written to `uid_map`.
    pub uid: IdMapping,
    /// Single entry written to `gid_map`.
    pub gid: IdMapping,
}

/// Progress of the namespace init sequence.
///
/// Each variant is reached by exactly one irreversible step; the order of
/// declaration is the order of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InitStage {
    /// Process exists inside the new namespaces.
    Created,
    /// Hostname set to the container id.
    HostnameSet,
    /// Parking directory created under the new root.
    RootPrepared,
    /// Mount tree remarked private and recursive.
    PropagationIsolated,
    /// New root bind-mounted onto itself.
    SelfBound,
    /// `/proc`, `/dev` and `/tmp` mounted under the new root.
    MountsReady,
    /// Root filesystem swapped.
    Pivoted,
    /// Old root lazily unmounted and its directory removed.
    OldRootDetached,
    /// Contained command running.
    Executing,
    /// Contained command exited.
    Exited,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::HostnameSet => "hostname-set",
            Self::RootPrepared => "root-prepared",
            Self::PropagationIsolated => "propagation-isolated",
            Self::SelfBound => "self-bound",
            Self::MountsReady => "mounts-ready",
            Self::Pivoted => "pivoted",
            Self::OldRootDetached => "old-root-detached",
            Self::Executing => "executing",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exited normally with this status.
    Code(i32),
    /// Killed by this signal number.
    Signaled(i32),
}

impl ChildExit {
    /// Whether the child exited with status 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }

    /// Status to exit with when mirroring this child, using the shell
    /// convention of `128 + signo` for signals.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Code(code) => code,
            Self::Signaled(signo) => 128 + signo,
        }
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit status {code}"),
            Self::Signaled(signo) => write!(f, "killed by signal {signo}"),
        }
    }
}
