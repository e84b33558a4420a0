//! Digest engine and fixed-size chunking for chunked uploads.
//!
//! Everything here is synchronous and file-backed; async callers run it
//! inside `spawn_blocking`.

mod chunked;
mod digest;
mod progress;
mod types;
mod validation;

pub use chunked::{BlockReader, block_count, block_range, chunk_file};
pub use digest::{DigestAlgorithm, digest_bytes, digest_file, md5_hex, sha1_hex};
pub use progress::SpeedCalculator;
pub use types::BlockDescriptor;
pub use validation::validate_file_size;

/// Default chunk size: 4 MiB, fixed by the block store.
pub const DEFAULT_CHUNK_SIZE: u64 = micloud_protocol::CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is empty")]
    EmptyFile,

    #[error("file size {size} exceeds the {limit} byte limit")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("block {index} is out of range ({count} blocks)")]
    BlockOutOfRange { index: usize, count: usize },
}
