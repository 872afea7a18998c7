//! Test doubles for the [`Kernel`] seam.

use std::cell::RefCell;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};

use crate::filesystem::mount::{MountSpec, Unmount};
use crate::kernel::Kernel;

/// Fake kernel that records each call as a line of text.
///
/// Nothing touches the host. Optionally fails every call of one operation
/// (matched on the first word of the recorded line, e.g. `"pivot_root"`).
#[derive(Debug, Default)]
pub struct RecordingKernel {
    calls: RefCell<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl RecordingKernel {
    /// Kernel on which every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel on which every call of `operation` fails with `EPERM`.
    #[must_use]
    pub fn failing_on(operation: &'static str) -> Self {
        Self {
            calls: RefCell::default(),
            fail_on: Some(operation),
        }
    }

    /// Calls recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Recorded calls whose operation is `operation`.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(operation))
            .cloned()
            .collect()
    }

    fn record(&self, operation: &'static str, detail: String) -> Result<()> {
        self.calls.borrow_mut().push(format!("{operation} {detail}"));
        if self.fail_on == Some(operation) {
            return Err(BurrowError::syscall(
                operation,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        Ok(())
    }
}

impl Kernel for RecordingKernel {
    fn set_hostname(&self, name: &str) -> Result<()> {
        self.record("sethostname", name.to_owned())
    }

    fn make_mounts_private(&self) -> Result<()> {
        self.record("make_private", "/".to_owned())
    }

    fn mount(&self, spec: &MountSpec) -> Result<()> {
        self.record("mount", spec.to_string())
    }

    fn unmount(&self, target: &Path, mode: Unmount) -> Result<()> {
        let detail = match mode {
            Unmount::Normal => target.display().to_string(),
            Unmount::Detach => format!("{} detach", target.display()),
        };
        self.record("unmount", detail)
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        self.record("chdir", path.display().to_string())
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        self.record(
            "pivot_root",
            format!("{} {}", new_root.display(), put_old.display()),
        )
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.record("remove_dir_all", path.display().to_string())
    }
}
