//! Content fingerprinting for change detection.
//!
//! A fingerprint is a SHA-256 digest over the file's bytes followed by its
//! modification time. Including the mtime means a file rewritten with
//! byte-identical content but a newer timestamp still reads as changed —
//! a few false positives in exchange for never diffing full content twice.

use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

/// Compute the fingerprint of a file. Deterministic given the file's
/// current bytes and mtime; fails if the file is unreadable.
pub fn fingerprint(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    let mtime = std::fs::metadata(path)?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&content);
    hasher.update(mtime.as_secs().to_le_bytes());
    hasher.update(mtime.subsec_nanos().to_le_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
