//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! [`Hasher`] streams a file through BLAKE3 with a fixed-size buffer and
//! never raises: every outcome is a [`Checksum`], either a 32-byte digest
//! or a failure marker that tells the caller the file is unclassifiable.
//!
//! The [`ChecksumEngine`] trait is the seam the scan coordinator hashes
//! through, so the engine can run on a worker pool and be replaced in tests.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::HashError;

/// A 256-bit BLAKE3 digest.
pub type Hash = [u8; 32];

/// Size of the read buffer used while streaming file content.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of hashing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// Content digest of the whole file.
    Digest(Hash),
    /// The file could not be read; it is skipped by the caller.
    Failed(HashError),
}

impl Checksum {
    /// The digest, if hashing succeeded.
    #[must_use]
    pub fn digest(&self) -> Option<&Hash> {
        match self {
            Self::Digest(h) => Some(h),
            Self::Failed(_) => None,
        }
    }

    /// Whether this is the failure marker.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Something that can compute a content checksum for a path.
///
/// Implementations must be cheap to share across threads; the coordinator
/// calls them from its hashing worker pool.
pub trait ChecksumEngine: Send + Sync {
    /// Hash the full content of `path`. Never panics on I/O errors.
    fn compute_checksum(&self, path: &Path) -> Checksum;
}

/// Streaming BLAKE3 hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: BUFFER_SIZE,
        }
    }

    /// Create a hasher with a custom read buffer size (minimum 1 byte).
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Hash the full content of a file.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] if the file cannot be opened or read.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        self.stream(path)
            .map_err(|e| HashError::from_io(path, &e))
    }

    fn stream(&self, path: &Path) -> io::Result<Hash> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
        }

        Ok(*hasher.finalize().as_bytes())
    }
}

impl ChecksumEngine for Hasher {
    fn compute_checksum(&self, path: &Path) -> Checksum {
        match self.full_hash(path) {
            Ok(hash) => Checksum::Digest(hash),
            Err(e) => {
                log::debug!("Checksum failed: {}", e);
                Checksum::Failed(e)
            }
        }
    }
}

/// Render a hash as 64 lowercase hex characters.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    use std::fmt::Write;

    hash.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Parse 64 hex characters back into a hash.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    if hex.len() != 64 || !hex.is_ascii() {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}
