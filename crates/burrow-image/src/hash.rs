//! SHA-256 content verification.
//!
//! Validates integrity of image archives before they are unpacked.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of a file as lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let io_err = |e| BurrowError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let _bytes = std::io::copy(&mut file, &mut hasher).map_err(io_err)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Validates that a file matches the expected SHA-256 hash.
///
/// `expected` may carry a `sha256:` prefix and is compared case-insensitively.
///
/// # Errors
///
/// Returns [`BurrowError::HashMismatch`] if the hashes do not match.
pub fn validate_hash(path: &Path, expected: &str) -> Result<String> {
    let actual = hash_file(path)?;
    let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(BurrowError::HashMismatch {
            resource: path.display().to_string(),
            expected: expected.to_owned(),
            actual,
        });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello\n")
    const HELLO_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn hash_file_matches_known_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello\n").expect("write");
        assert_eq!(hash_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn validate_hash_accepts_prefixed_uppercase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello\n").expect("write");
        let expected = format!("sha256:{}", HELLO_SHA256.to_uppercase());
        assert!(validate_hash(&path, &expected).is_ok());
    }

    #[test]
    fn validate_hash_rejects_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"goodbye\n").expect("write");
        let err = validate_hash(&path, HELLO_SHA256).unwrap_err();
        assert!(matches!(err, BurrowError::HashMismatch { .. }), "{err}");
    }

    #[test]
    fn hash_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            hash_file(&dir.path().join("missing")),
            Err(BurrowError::Io { .. })
        ));
    }
}
