//! Filesystem management for container isolation.
//!
//! Provides mount helpers, the scoped mount stack, and `pivot_root` for
//! switching into the provisioned root filesystem.

pub mod mount;
pub mod pivot_root;
