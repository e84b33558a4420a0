//! Block transfer loop.

use std::time::Duration;

use micloud_protocol::constants::block_upload_url;
use micloud_protocol::{BLOCK_COMPLETED, BlockChunkResponse};
use micloud_transfer::{BlockDescriptor, BlockReader, TransferError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::transport::CloudTransport;
use crate::types::{BlockStatus, CommitToken, UploadEvent};

/// Portion of overall progress covered by the block loop.
pub(crate) const PROGRESS_START: f64 = 0.15;
pub(crate) const PROGRESS_END: f64 = 0.95;

/// Totals reported by [`BlockUploader::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransferSummary {
    /// Commit tokens in block order.
    pub tokens: Vec<CommitToken>,
    pub uploaded: usize,
    pub bytes_uploaded: u64,
}

/// Sends blocks to the node assigned during negotiation.
pub struct BlockUploader<'a> {
    transport: &'a dyn CloudTransport,
    node_url: &'a str,
    file_meta: &'a str,
    timeout: Duration,
}

impl<'a> BlockUploader<'a> {
    pub fn new(
        transport: &'a dyn CloudTransport,
        node_url: &'a str,
        file_meta: &'a str,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            node_url,
            file_meta,
            timeout,
        }
    }

    /// Walks the blocks in ascending order, transferring those the server
    /// lacks and reusing the tokens of the rest.
    ///
    /// `statuses` must pair one-to-one with `descriptors`. Blocks are sent
    /// one at a time; the first failure aborts the loop.
    pub async fn run(
        &self,
        mut reader: BlockReader,
        descriptors: &[BlockDescriptor],
        statuses: &[BlockStatus],
        cancel: &CancellationToken,
        events_tx: &mpsc::Sender<UploadEvent>,
    ) -> Result<BlockTransferSummary, UploadError> {
        if descriptors.len() != statuses.len() {
            return Err(UploadError::Negotiation(format!(
                "block count mismatch: {} descriptors, {} statuses",
                descriptors.len(),
                statuses.len()
            )));
        }
        let total = statuses.len();
        let total_bytes: u64 = descriptors.iter().map(|d| d.len).sum();
        let mut done_bytes = 0u64;
        let mut summary = BlockTransferSummary {
            tokens: Vec::with_capacity(total),
            uploaded: 0,
            bytes_uploaded: 0,
        };

        for (descriptor, status) in descriptors.iter().zip(statuses) {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            let index = descriptor.index;

            let token = match status {
                BlockStatus::AlreadyExists { commit_meta } => {
                    debug!(index, "block already stored");
                    let _ = events_tx.try_send(UploadEvent::BlockSkipped { index, total });
                    commit_meta.clone()
                }
                BlockStatus::NeedsUpload { block_meta } => {
                    let (r, data) = read_block(reader, index).await?;
                    reader = r;
                    let bytes = data.len() as u64;
                    let token = self.upload_block(index, block_meta, data).await?;
                    summary.uploaded += 1;
                    summary.bytes_uploaded += bytes;
                    let _ = events_tx.try_send(UploadEvent::BlockUploaded {
                        index,
                        total,
                        bytes,
                    });
                    token
                }
            };
            summary.tokens.push(token);

            done_bytes += descriptor.len;
            if total_bytes > 0 {
                let progress = PROGRESS_START
                    + (done_bytes as f64 / total_bytes as f64) * (PROGRESS_END - PROGRESS_START);
                let _ = events_tx.try_send(UploadEvent::Progress {
                    progress,
                    status: format!("Uploading block {}/{total}", index + 1),
                });
            }
        }

        Ok(summary)
    }

    /// Transfers one block and returns the node's commit token.
    ///
    /// Transport failures and any status other than `BLOCK_COMPLETED` are
    /// reported as [`UploadError::BlockUpload`].
    pub async fn upload_block(
        &self,
        index: usize,
        block_meta: &str,
        data: Vec<u8>,
    ) -> Result<CommitToken, UploadError> {
        let url = block_upload_url(self.node_url, self.file_meta, block_meta);
        let len = data.len();
        debug!(index, bytes = len, "sending block");

        let body = match tokio::time::timeout(self.timeout, self.transport.post_block(&url, data)).await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                warn!(index, error = %e, "block transfer failed");
                return Err(UploadError::BlockUpload {
                    index,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(index, timeout = ?self.timeout, "block transfer timed out");
                return Err(UploadError::BlockUpload {
                    index,
                    reason: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        parse_block_response(index, &body)
    }
}

/// Parses a node's reply to a block transfer.
pub fn parse_block_response(index: usize, body: &[u8]) -> Result<CommitToken, UploadError> {
    let resp: BlockChunkResponse =
        serde_json::from_slice(body).map_err(|e| UploadError::BlockUpload {
            index,
            reason: format!("invalid response: {e}"),
        })?;

    if resp.stat != BLOCK_COMPLETED {
        return Err(UploadError::BlockUpload {
            index,
            reason: format!("block not completed (stat {:?})", resp.stat),
        });
    }

    match resp.commit_meta {
        Some(token) if !token.is_empty() => Ok(CommitToken::new(token)),
        _ => Err(UploadError::BlockUpload {
            index,
            reason: "completed without commit_meta".into(),
        }),
    }
}

/// Reads one block on the blocking pool and hands the reader back.
async fn read_block(
    mut reader: BlockReader,
    index: usize,
) -> Result<(BlockReader, Vec<u8>), UploadError> {
    let (reader, result) = tokio::task::spawn_blocking(move || {
        let result = reader.read_block(index);
        (reader, result)
    })
    .await
    .map_err(|e| UploadError::Task(e.to_string()))?;

    let data = result.map_err(|e: TransferError| UploadError::BlockUpload {
        index,
        reason: format!("read failed: {e}"),
    })?;
    Ok((reader, data))
}
