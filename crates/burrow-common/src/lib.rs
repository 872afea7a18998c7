//! # burrow-common
//!
//! Shared types, error definitions, configuration, and constants used
//! across the Burrow workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and knows nothing about syscalls.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
