//! MiCloud file upload flow: hash, negotiate, transfer, commit.
//!
//! This crate holds the upload **business logic**. It does not speak HTTP
//! itself; the caller supplies a [`CloudTransport`] implementation
//! (`micloud-client` provides one over `reqwest`).
//!
//! # Pipeline
//!
//! 1. **Validate**: reject empty files and files of 4 GiB or more
//! 2. **Chunk**: whole-file SHA-1, then SHA-1 and MD5 per 4 MiB block
//! 3. **Negotiate**: submit the manifest; the server answers with either
//!    "file exists" or a per-block status list
//! 4. **Upload blocks**: send the missing blocks one by one to the node
//! 5. **Commit**: register the stored content under a name and folder

pub mod block;
pub mod commit;
pub mod error;
pub mod negotiate;
pub mod pipeline;
pub mod transport;
pub mod types;

pub use block::{BlockTransferSummary, BlockUploader, parse_block_response};
pub use commit::{commit, parse_commit_response};
pub use error::{TransportError, UploadError};
pub use negotiate::{negotiate, parse_negotiation};
pub use pipeline::Uploader;
pub use transport::{CloudTransport, TransportFuture};
pub use types::{
    BlockStatus, BlocksNeeded, CommitToken, FileHandle, FinalManifest, FullCommit,
    NegotiationResult, UploadEvent, UploadManifest, UploadOptions, UploadResult, UploadSession,
    UploadStage,
};
