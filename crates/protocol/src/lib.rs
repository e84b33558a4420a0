//! Wire protocol types for the MiCloud drive upload API.
//!
//! Covers the three request/response exchanges of a chunked upload:
//! manifest negotiation, raw block transfer and the final commit.

pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::{BLOCK_COMPLETED, CHUNK_SIZE, MAX_FILE_SIZE};
pub use envelope::{ApiError, ApiResponse};
pub use messages::{
    BlockChunkResponse, BlockInfo, BlockMetaEntry, CommitData, CommitMeta, CommitStorage,
    ExistingStorage, KssCommit, KssNegotiation, NegotiationData, NegotiationStorage,
    UploadRequest,
};
