//! Data types for the upload pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use micloud_protocol::constants::{
    BLOCK_TIMEOUT, COMMIT_FILE_PATH, CREATE_FILE_PATH, DEFAULT_BASE_URL, REQUEST_TIMEOUT,
};
use micloud_protocol::messages::{
    BlockInfoList, CommitMeta, CommitStorage, ExistingStorage, KssCommit, NegotiationStorage,
    UploadRequest,
};
use micloud_transfer::{BlockDescriptor, DEFAULT_CHUNK_SIZE};

use crate::error::UploadError;

/// The local file being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
    size: u64,
    name: String,
}

impl FileHandle {
    /// Stats `path` and records its size and file name.
    pub fn open(path: &Path) -> Result<Self, UploadError> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(UploadError::InvalidFile(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| UploadError::InvalidFile(format!("no file name: {}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Description of a file's content sent to the negotiation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadManifest {
    pub name: String,
    pub size: u64,
    /// Whole-file SHA-1, computed independently of the block digests.
    pub sha1: String,
    pub blocks: Vec<BlockDescriptor>,
}

impl UploadManifest {
    /// Wire form of the manifest.
    pub fn to_request(&self) -> UploadRequest<NegotiationStorage> {
        UploadRequest::new(
            self.name.clone(),
            NegotiationStorage {
                size: self.size,
                sha1: self.sha1.clone(),
                kss: BlockInfoList {
                    block_infos: self.blocks.iter().map(BlockDescriptor::to_block_info).collect(),
                },
            },
        )
    }
}

/// Opaque proof from a storage node that a block is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitToken(String);

impl CommitToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of manifest negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationResult {
    /// The server already holds identical content; no transfer needed.
    FileAlreadyExists { upload_id: String },
    /// Some or all blocks must be sent to the assigned node.
    BlocksNeeded(BlocksNeeded),
}

/// Node assignment and per-block status for an upload that needs blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocksNeeded {
    pub upload_id: String,
    /// Node selected for block transfers (first of `node_urls`).
    pub node_url: String,
    /// All candidate nodes, echoed back in the commit record.
    pub node_urls: Vec<String>,
    pub file_meta: String,
    pub secure_key: String,
    pub content_cache_key: String,
    /// One entry per block descriptor, same order.
    pub blocks: Vec<BlockStatus>,
}

impl BlocksNeeded {
    /// Number of blocks that require a transfer.
    pub fn pending_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, BlockStatus::NeedsUpload { .. }))
            .count()
    }
}

/// Server-side status of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    /// Block content is already stored; reuse its commit token.
    AlreadyExists { commit_meta: CommitToken },
    /// Block must be transferred with the given metadata token.
    NeedsUpload { block_meta: String },
}

/// Record submitted to register the uploaded content as a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalManifest {
    /// Reference to content the server already holds.
    Existing { upload_id: String },
    /// Full KSS commit after the block loop.
    Full(FullCommit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullCommit {
    pub size: u64,
    pub sha1: String,
    pub upload_id: String,
    pub node_urls: Vec<String>,
    pub secure_key: String,
    pub content_cache_key: String,
    pub file_meta: String,
    /// Ordered identically to the block descriptors.
    pub commit_tokens: Vec<CommitToken>,
}

impl FullCommit {
    /// Assembles the commit record from the negotiation outcome and the
    /// tokens collected by the block loop.
    pub fn new(manifest: &UploadManifest, needed: BlocksNeeded, commit_tokens: Vec<CommitToken>) -> Self {
        Self {
            size: manifest.size,
            sha1: manifest.sha1.clone(),
            upload_id: needed.upload_id,
            node_urls: needed.node_urls,
            secure_key: needed.secure_key,
            content_cache_key: needed.content_cache_key,
            file_meta: needed.file_meta,
            commit_tokens,
        }
    }
}

impl FinalManifest {
    /// Serializes the `data` form field of the commit request.
    pub fn to_json(&self, name: &str) -> Result<String, serde_json::Error> {
        match self {
            FinalManifest::Existing { upload_id } => serde_json::to_string(&UploadRequest::new(
                name,
                ExistingStorage {
                    upload_id: upload_id.clone(),
                    exists: true,
                },
            )),
            FinalManifest::Full(full) => {
                let commit_metas = full
                    .commit_tokens
                    .iter()
                    .map(|t| CommitMeta {
                        commit_meta: t.as_str().to_string(),
                    })
                    .collect();
                serde_json::to_string(&UploadRequest::new(
                    name,
                    CommitStorage {
                        size: full.size,
                        sha1: full.sha1.clone(),
                        kss: KssCommit::new(
                            full.node_urls.clone(),
                            full.secure_key.clone(),
                            full.content_cache_key.clone(),
                            full.file_meta.clone(),
                            commit_metas,
                        ),
                        upload_id: full.upload_id.clone(),
                        exists: false,
                    },
                ))
            }
        }
    }
}

/// Service identity and endpoints for an upload.
///
/// Passed explicitly to the pipeline rather than held globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub service_token: String,
    pub base_url: String,
}

impl UploadSession {
    pub fn new(service_token: impl Into<String>) -> Self {
        Self {
            service_token: service_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Overrides the API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn create_file_url(&self) -> String {
        format!("{}{CREATE_FILE_PATH}", self.base_url.trim_end_matches('/'))
    }

    pub fn commit_url(&self) -> String {
        format!("{}{COMMIT_FILE_PATH}", self.base_url.trim_end_matches('/'))
    }
}

/// Tunables of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Block size; the service expects [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: u64,
    /// Bound on the negotiation and commit round trips.
    pub request_timeout: Duration,
    /// Bound on each block transfer.
    pub block_timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout: REQUEST_TIMEOUT,
            block_timeout: BLOCK_TIMEOUT,
        }
    }
}

/// Stages of a single upload, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStage {
    Validate,
    Chunk,
    Negotiate,
    UploadBlocks,
    Commit,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStage::Validate => "validate",
            UploadStage::Chunk => "chunk",
            UploadStage::Negotiate => "negotiate",
            UploadStage::UploadBlocks => "block upload",
            UploadStage::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A stage has started.
    Stage { stage: UploadStage },
    /// Overall progress in `0.0..=1.0`.
    Progress { progress: f64, status: String },
    /// Block content already on the server; no transfer.
    BlockSkipped { index: usize, total: usize },
    /// Block transferred and acknowledged.
    BlockUploaded { index: usize, total: usize, bytes: u64 },
    /// Upload committed.
    Completed { file_id: String },
    /// Upload aborted.
    Failed { error: String },
}

/// Summary of a committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Identifier of the new remote file.
    pub file_id: String,
    /// `true` when the whole file already existed remotely.
    pub deduplicated: bool,
    pub blocks_total: usize,
    pub blocks_uploaded: usize,
    pub bytes_uploaded: u64,
}
