//! Upload error types.

use micloud_transfer::TransferError;

use crate::types::UploadStage;

/// Failure of the underlying HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors produced by an upload. Every variant is terminal.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file cannot be uploaded: {0}")]
    SizeLimit(#[source] TransferError),

    #[error("failed to hash file: {0}")]
    Digest(#[source] TransferError),

    #[error("negotiation rejected: {0}")]
    Negotiation(String),

    #[error("no available upload node")]
    NoAvailableNode,

    #[error("block {index} upload failed: {reason}")]
    BlockUpload { index: usize, reason: String },

    #[error("commit rejected: {0}")]
    Commit(String),

    #[error("{stage} request failed: {source}")]
    Transport {
        stage: UploadStage,
        #[source]
        source: TransportError,
    },

    #[error("{stage} request timed out")]
    Timeout { stage: UploadStage },

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Task(String),

    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// Stage of the pipeline the error belongs to.
    pub fn stage(&self) -> Option<UploadStage> {
        match self {
            UploadError::SizeLimit(_) | UploadError::InvalidFile(_) => Some(UploadStage::Validate),
            UploadError::Digest(_) => Some(UploadStage::Chunk),
            UploadError::Negotiation(_) | UploadError::NoAvailableNode => {
                Some(UploadStage::Negotiate)
            }
            UploadError::BlockUpload { .. } => Some(UploadStage::UploadBlocks),
            UploadError::Commit(_) => Some(UploadStage::Commit),
            UploadError::Transport { stage, .. } | UploadError::Timeout { stage } => Some(*stage),
            UploadError::Io(_) | UploadError::Json(_) | UploadError::Task(_) | UploadError::Cancelled => {
                None
            }
        }
    }
}
