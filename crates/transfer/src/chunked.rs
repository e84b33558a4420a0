use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::digest::{DigestAlgorithm, digest_file, md5_hex, sha1_hex};
use crate::types::BlockDescriptor;
use crate::TransferError;

// ---------------------------------------------------------------------------
// Block arithmetic
// ---------------------------------------------------------------------------

/// Number of blocks needed for `file_size` bytes: `ceil(file_size / chunk_size)`.
///
/// `chunk_size` must be non-zero.
pub fn block_count(file_size: u64, chunk_size: u64) -> usize {
    file_size.div_ceil(chunk_size) as usize
}

/// Returns `(offset, len)` of block `index`, or `None` past the end of file.
///
/// The last block is shortened to the remaining tail.
pub fn block_range(index: usize, file_size: u64, chunk_size: u64) -> Option<(u64, u64)> {
    let offset = (index as u64).checked_mul(chunk_size)?;
    if offset >= file_size {
        return None;
    }
    let len = chunk_size.min(file_size - offset);
    Some((offset, len))
}

// ---------------------------------------------------------------------------
// BlockReader
// ---------------------------------------------------------------------------

/// Reads individual blocks of a file by index.
///
/// Every read seeks first, so the reader carries no cursor state between
/// calls. It is not meant to be shared: concurrent callers need their own
/// reader.
#[derive(Debug)]
pub struct BlockReader {
    file: std::fs::File,
    file_size: u64,
    chunk_size: u64,
}

impl BlockReader {
    /// Opens `path` for block reads using the size recorded when the
    /// upload started.
    pub fn open(path: &Path, file_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(chunk_size));
        }
        let file = std::fs::File::open(path)?;
        Ok(Self {
            file,
            file_size,
            chunk_size,
        })
    }

    /// Total number of blocks.
    pub fn block_count(&self) -> usize {
        block_count(self.file_size, self.chunk_size)
    }

    /// Reads exactly the byte range of block `index`.
    pub fn read_block(&mut self, index: usize) -> Result<Vec<u8>, TransferError> {
        let mut buf = Vec::new();
        self.read_block_into(index, &mut buf)?;
        Ok(buf)
    }

    /// Like [`read_block`](Self::read_block) but reuses `buf`.
    ///
    /// A short read (file truncated since it was measured) is an error.
    pub fn read_block_into(&mut self, index: usize, buf: &mut Vec<u8>) -> Result<(), TransferError> {
        let (offset, len) = block_range(index, self.file_size, self.chunk_size).ok_or(
            TransferError::BlockOutOfRange {
                index,
                count: self.block_count(),
            },
        )?;
        buf.resize(len as usize, 0);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chunker
// ---------------------------------------------------------------------------

/// Splits the file at `path` into block descriptors.
///
/// Files no larger than `chunk_size` form a single block: its SHA-1 is the
/// already computed `file_sha1` and only the MD5 needs another read. Larger
/// files are read block by block and every block is hashed with both
/// algorithms. Any read failure aborts the whole pass; no block is skipped.
pub fn chunk_file(
    path: &Path,
    file_size: u64,
    file_sha1: &str,
    chunk_size: u64,
) -> Result<Vec<BlockDescriptor>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize(chunk_size));
    }
    if file_size == 0 {
        return Err(TransferError::EmptyFile);
    }

    if file_size <= chunk_size {
        let md5 = digest_file(DigestAlgorithm::Md5, path)?;
        return Ok(vec![BlockDescriptor {
            index: 0,
            offset: 0,
            len: file_size,
            sha1: file_sha1.to_string(),
            md5,
        }]);
    }

    let mut reader = BlockReader::open(path, file_size, chunk_size)?;
    let count = reader.block_count();
    let mut blocks = Vec::with_capacity(count);
    let mut buf = Vec::with_capacity(chunk_size as usize);

    for index in 0..count {
        reader.read_block_into(index, &mut buf)?;
        let descriptor = BlockDescriptor {
            index,
            offset: index as u64 * chunk_size,
            len: buf.len() as u64,
            sha1: sha1_hex(&buf),
            md5: md5_hex(&buf),
        };
        debug!(index, len = descriptor.len, "hashed block");
        blocks.push(descriptor);
    }

    Ok(blocks)
}
