//! `burrow import` — Provision a root filesystem from an exported image.
//!
//! Takes the tar produced by exporting a container of the image (for
//! example `docker export`); fetching the image itself is left to the tool
//! that produced the archive.

use std::path::PathBuf;

use anyhow::Context;
use burrow_common::constants::default_import_dir;
use burrow_common::types::ImageName;
use burrow_image::provision::{ImportRequest, import};
use clap::Args;

use crate::output::format_bytes;

/// Arguments for the `import` command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Image name; the tree is placed under `rootfs/<image>`.
    pub image: String,

    /// Exported filesystem archive (`.tar` or gzip-compressed).
    pub archive: PathBuf,

    /// Destination directory (default: `$HOME/rootfs/<image>`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace an existing tree at the destination.
    #[arg(long)]
    pub force: bool,

    /// Expected SHA-256 digest of the archive.
    #[arg(long)]
    pub sha256: Option<String>,
}

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Executes the `import` command.
///
/// # Errors
///
/// Returns an error if the archive cannot be verified or unpacked, or the
/// destination already exists without `--force`.
#[allow(clippy::print_stderr)]
pub fn execute(args: ImportArgs) -> anyhow::Result<()> {
    let image = ImageName::parse(args.image)?;
    let output = args
        .output
        .unwrap_or_else(|| default_import_dir(image.as_str()));
    let request = ImportRequest {
        image,
        archive: args.archive,
        output,
        replace: args.force,
        expected_sha256: args.sha256,
    };

    let report = import(&request)
        .with_context(|| format!("failed to import {}", request.archive.display()))?;

    let verb = if report.replaced { "Replaced" } else { "Provisioned" };
    eprintln!(
        "  {GREEN}{BOLD}{verb}{RESET} {BOLD}{}{RESET} at {}",
        request.image,
        report.root.display()
    );
    eprintln!(
        "  {DIM}{} entries, {}, sha256:{}{RESET}",
        report.stats.entries,
        format_bytes(report.stats.bytes),
        report.digest
    );
    Ok(())
}
