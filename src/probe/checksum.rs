//! Content checksums for verifying the test object.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `bytes`.
pub fn content_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checksum of the local reference copy, computed once per cycle.
pub fn reference_checksum(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let checksum = content_checksum(&bytes);
    tracing::info!(path = %path.display(), checksum = %checksum, "Hashed local reference object");
    Ok(checksum)
}
