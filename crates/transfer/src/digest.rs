use std::fmt;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha1::{Digest, Sha1};

use crate::TransferError;

/// Read buffer used when hashing whole files.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Digest algorithms understood by the block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Md5,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => f.write_str("sha1"),
            DigestAlgorithm::Md5 => f.write_str("md5"),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory digests
// ---------------------------------------------------------------------------

/// Computes the digest of `data` and returns it as lowercase hex.
pub fn digest_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Sha1 => sha1_hex(data),
        DigestAlgorithm::Md5 => md5_hex(data),
    }
}

/// SHA-1 of `data` as lowercase hex (40 chars).
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// MD5 of `data` as lowercase hex (32 chars).
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

// ---------------------------------------------------------------------------
// File digests
// ---------------------------------------------------------------------------

/// Streams the whole file at `path` through the given digest.
///
/// Read errors are returned as-is.
pub fn digest_file(algorithm: DigestAlgorithm, path: &Path) -> Result<String, TransferError> {
    let file = std::fs::File::open(path)?;
    match algorithm {
        DigestAlgorithm::Sha1 => stream_digest::<Sha1>(file),
        DigestAlgorithm::Md5 => stream_digest::<Md5>(file),
    }
}

fn stream_digest<D: Digest>(mut reader: impl Read) -> Result<String, TransferError> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
