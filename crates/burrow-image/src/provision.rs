//! Root filesystem provisioning.
//!
//! Unpacks an exported image archive into a staging directory beside the
//! destination and renames it into place. The destination path therefore
//! shows either nothing, the previous tree, or the complete new tree.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ImageName;

use crate::layer::{LayerStats, extract_layer};

/// A request to provision one image's root filesystem.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Image the tree belongs to.
    pub image: ImageName,
    /// Exported tar archive (plain or gzip).
    pub archive: PathBuf,
    /// Final location of the tree.
    pub output: PathBuf,
    /// Replace an existing tree instead of refusing.
    pub replace: bool,
    /// Expected SHA-256 of the archive, checked before unpacking.
    pub expected_sha256: Option<String>,
}

/// Outcome of a successful import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    /// Where the tree now lives.
    pub root: PathBuf,
    /// SHA-256 of the archive.
    pub digest: String,
    /// Unpacking statistics.
    pub stats: LayerStats,
    /// Whether an existing tree was replaced.
    pub replaced: bool,
}

/// Directory removed on drop unless committed.
struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove staging directory"
                );
            }
        }
    }
}

fn sibling(output: &Path, suffix: &str) -> Result<PathBuf> {
    let name = output.file_name().ok_or_else(|| BurrowError::Config {
        message: format!("output path {} has no final component", output.display()),
    })?;
    let mut sibling = OsString::from(".");
    sibling.push(name);
    sibling.push(format!(".{suffix}-{}", std::process::id()));
    Ok(output.with_file_name(sibling))
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> BurrowError + '_ {
    move |e| BurrowError::Io {
        path: path.to_path_buf(),
        source: e,
    }
}

/// Provisions a root filesystem from a local archive.
///
/// # Errors
///
/// Returns an error if the archive is missing or fails digest validation,
/// if the destination already exists and `replace` is not set, or if
/// unpacking or the final rename fails. On error the destination is left
/// as it was.
pub fn import(request: &ImportRequest) -> Result<ImportReport> {
    tracing::info!(
        image = %request.image,
        archive = %request.archive.display(),
        output = %request.output.display(),
        "provisioning root filesystem"
    );
    if !request.archive.is_file() {
        return Err(BurrowError::NotFound {
            kind: "image archive",
            id: request.archive.display().to_string(),
        });
    }

    let digest = match &request.expected_sha256 {
        Some(expected) => crate::hash::validate_hash(&request.archive, expected)?,
        None => crate::hash::hash_file(&request.archive)?,
    };
    tracing::info!(digest = %digest, "archive digest");

    let exists = request.output.exists();
    if exists && !request.replace {
        return Err(BurrowError::Config {
            message: format!(
                "{} already exists; pass --force to replace it",
                request.output.display()
            ),
        });
    }

    if let Some(parent) = request.output.parent() {
        std::fs::create_dir_all(parent).map_err(io_at(parent))?;
    }

    let mut staging = Staging {
        path: sibling(&request.output, "partial")?,
        committed: false,
    };
    if staging.path.exists() {
        std::fs::remove_dir_all(&staging.path).map_err(io_at(&staging.path))?;
    }
    let stats = extract_layer(&request.archive, &staging.path)?;

    if exists {
        let retired = sibling(&request.output, "old")?;
        std::fs::rename(&request.output, &retired).map_err(io_at(&request.output))?;
        if let Err(e) = std::fs::rename(&staging.path, &request.output) {
            // Put the previous tree back before reporting.
            if let Err(restore) = std::fs::rename(&retired, &request.output) {
                tracing::error!(
                    path = %retired.display(),
                    error = %restore,
                    "failed to restore previous root filesystem"
                );
            }
            return Err(io_at(&request.output)(e));
        }
        staging.committed = true;
        std::fs::remove_dir_all(&retired).map_err(io_at(&retired))?;
    } else {
        std::fs::rename(&staging.path, &request.output).map_err(io_at(&request.output))?;
        staging.committed = true;
    }

    tracing::info!(root = %request.output.display(), "root filesystem provisioned");
    Ok(ImportReport {
        root: request.output.clone(),
        digest,
        stats,
        replaced: exists,
    })
}
