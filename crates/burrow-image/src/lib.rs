//! # burrow-image
//!
//! Root filesystem provisioning for the Burrow runtime.
//!
//! Handles:
//! - **Hashing**: SHA-256 digests of image archives.
//! - **Layers**: unpacking a flat `docker export` style tar (plain or gzip).
//! - **Provisioning**: staging an unpacked tree and moving it into place so
//!   a partially extracted root is never visible at the final path.
//!
//! Pulling images from a registry is not handled here.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod hash;
pub mod layer;
pub mod provision;
