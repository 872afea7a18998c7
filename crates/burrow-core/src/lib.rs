//! # burrow-core
//!
//! Low-level Linux isolation primitives for the Burrow runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: cloning a child directly into PID, mount, UTS, IPC and
//!   user namespaces, writing its UID/GID maps, setting the hostname, and
//!   isolating mount propagation.
//! - **Filesystem**: mount/unmount helpers, a scoped [`filesystem::mount::MountStack`]
//!   that releases mounts in reverse order, and `pivot_root`.
//! - **Kernel seam**: the [`kernel::Kernel`] trait through which the init
//!   sequence issues every root-affecting call.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

#[cfg(not(target_os = "linux"))]
compile_error!("burrow-core requires Linux namespaces and pivot_root(2)");

pub mod filesystem;
pub mod kernel;
pub mod namespace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
