//! The two bootstrap stages of a Burrow container.
//!
//! - [`launcher`]: the `run` stage. Clones a re-execution of this binary
//!   into fresh namespaces and waits for it.
//! - [`init`]: the `fork` stage. Runs as PID 1 inside those namespaces,
//!   pivots into the provisioned root, runs the command, and unwinds.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod init;
pub mod launcher;
pub mod process;
