//! Unpacking of exported filesystem archives.
//!
//! An exported image is a single flat layer: one tar stream holding the
//! whole tree. Entries are unpacked in archive order; a later entry for
//! the same path overwrites an earlier one.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use tar::EntryType;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Summary of an unpacked layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    /// Entries written to the target.
    pub entries: u64,
    /// Entries skipped (device nodes and FIFOs).
    pub skipped: u64,
    /// Total size of regular file contents.
    pub bytes: u64,
}

/// Extracts a tar archive to the target directory.
///
/// Gzip compression is detected from the archive's magic bytes. Device
/// nodes and FIFOs are skipped; entries that would land outside `target`
/// are rejected by the tar reader.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or an entry cannot be
/// written.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<LayerStats> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );
    let archive_err = |e| BurrowError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    };

    std::fs::create_dir_all(target).map_err(|e| BurrowError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;

    let mut file = File::open(archive_path).map_err(archive_err)?;
    let gzip = is_gzip(&mut file).map_err(archive_err)?;

    let stats = if gzip {
        unpack(flate2::read::GzDecoder::new(BufReader::new(file)), archive_path, target)?
    } else {
        unpack(BufReader::new(file), archive_path, target)?
    };
    tracing::info!(
        entries = stats.entries,
        skipped = stats.skipped,
        bytes = stats.bytes,
        "layer extracted"
    );
    Ok(stats)
}

fn unpack<R: Read>(reader: R, archive_path: &Path, target: &Path) -> Result<LayerStats> {
    let archive_err = |e| BurrowError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    };
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    let mut stats = LayerStats::default();
    for entry in archive.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let kind = entry.header().entry_type();
        if matches!(kind, EntryType::Char | EntryType::Block | EntryType::Fifo) {
            tracing::debug!(path = ?entry.path().ok(), ?kind, "skipping special file");
            stats.skipped += 1;
            continue;
        }
        if kind.is_file() {
            stats.bytes += entry.size();
        }
        let _unpacked = entry.unpack_in(target).map_err(|e| BurrowError::Io {
            path: target.to_path_buf(),
            source: e,
        })?;
        stats.entries += 1;
    }
    Ok(stats)
}

/// Sniffs the gzip magic and rewinds the file.
fn is_gzip(file: &mut File) -> std::io::Result<bool> {
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    let _pos = file.seek(SeekFrom::Start(0))?;
    Ok(read == GZIP_MAGIC.len() && magic == GZIP_MAGIC)
}
