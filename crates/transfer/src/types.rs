use micloud_protocol::messages::{Blob, BlockInfo};

/// Size and digests of one fixed-size block of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Ordinal position within the file, starting at 0.
    pub index: usize,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length of the block in bytes.
    pub len: u64,
    /// SHA-1 hex digest of exactly this byte range.
    pub sha1: String,
    /// MD5 hex digest of exactly this byte range.
    pub md5: String,
}

impl BlockDescriptor {
    /// Offset one past the last byte of the block.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// Wire form sent in the negotiation manifest.
    pub fn to_block_info(&self) -> BlockInfo {
        BlockInfo {
            blob: Blob {},
            sha1: self.sha1.clone(),
            md5: self.md5.clone(),
            size: self.len,
        }
    }
}
