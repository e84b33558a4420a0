//! Manifest negotiation: decides which blocks must be transferred.

use std::time::Duration;

use micloud_protocol::constants::form;
use micloud_protocol::messages::{BlockMetaEntry, KssNegotiation, NegotiationData};
use micloud_protocol::ApiResponse;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::transport::{CloudTransport, call_with_timeout};
use crate::types::{
    BlockStatus, BlocksNeeded, CommitToken, NegotiationResult, UploadManifest, UploadSession,
    UploadStage,
};

/// Submits `manifest` and interprets the server's answer.
pub async fn negotiate(
    transport: &dyn CloudTransport,
    session: &UploadSession,
    manifest: &UploadManifest,
    timeout: Duration,
) -> Result<NegotiationResult, UploadError> {
    let data = serde_json::to_string(&manifest.to_request())?;
    let url = session.create_file_url();
    let fields = [
        (form::DATA, data),
        (form::SERVICE_TOKEN, session.service_token.clone()),
    ];

    debug!(
        name = %manifest.name,
        size = manifest.size,
        blocks = manifest.blocks.len(),
        "submitting upload manifest"
    );

    let body = call_with_timeout(
        UploadStage::Negotiate,
        timeout,
        transport.post_form(&url, &fields),
    )
    .await?;

    let result = parse_negotiation(&body, manifest.blocks.len())?;
    match &result {
        NegotiationResult::FileAlreadyExists { upload_id } => {
            info!(name = %manifest.name, %upload_id, "file already stored remotely");
        }
        NegotiationResult::BlocksNeeded(needed) => {
            info!(
                name = %manifest.name,
                node = %needed.node_url,
                pending = needed.pending_count(),
                total = needed.blocks.len(),
                "blocks needed"
            );
        }
    }
    Ok(result)
}

/// Parses a negotiation response for a manifest of `block_count` blocks.
///
/// Absent fields are errors, never silently defaulted.
pub fn parse_negotiation(body: &[u8], block_count: usize) -> Result<NegotiationResult, UploadError> {
    let resp = ApiResponse::from_slice(body)
        .map_err(|e| UploadError::Negotiation(format!("malformed response: {e}")))?
        .into_result()
        .map_err(|e| {
            warn!(result = %e.result, code = e.code, "manifest rejected");
            UploadError::Negotiation(e.description)
        })?;

    let data: NegotiationData = resp
        .parse_data()
        .map_err(|e| UploadError::Negotiation(format!("malformed response data: {e}")))?
        .ok_or_else(|| UploadError::Negotiation("response has no data".into()))?;
    let storage = data.storage;

    if storage.exists {
        if storage.upload_id.is_empty() {
            return Err(UploadError::Negotiation(
                "file exists but no upload id was returned".into(),
            ));
        }
        return Ok(NegotiationResult::FileAlreadyExists {
            upload_id: storage.upload_id,
        });
    }

    let kss = storage
        .kss
        .ok_or_else(|| UploadError::Negotiation("response has no kss section".into()))?;
    let needed = blocks_needed(storage.upload_id, kss, block_count)?;
    Ok(NegotiationResult::BlocksNeeded(needed))
}

fn blocks_needed(
    upload_id: String,
    kss: KssNegotiation,
    block_count: usize,
) -> Result<BlocksNeeded, UploadError> {
    let node_url = match kss.node_urls.first() {
        Some(url) if !url.is_empty() => url.clone(),
        _ => return Err(UploadError::NoAvailableNode),
    };

    if kss.file_meta.is_empty() {
        return Err(UploadError::Negotiation("response has no file_meta".into()));
    }

    if kss.block_metas.len() != block_count {
        return Err(UploadError::Negotiation(format!(
            "block count mismatch: sent {block_count}, server returned {}",
            kss.block_metas.len()
        )));
    }

    let blocks = kss
        .block_metas
        .into_iter()
        .enumerate()
        .map(|(index, entry)| block_status(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BlocksNeeded {
        upload_id,
        node_url,
        node_urls: kss.node_urls,
        file_meta: kss.file_meta,
        secure_key: kss.secure_key,
        content_cache_key: kss.content_cache_key,
        blocks,
    })
}

fn block_status(index: usize, entry: BlockMetaEntry) -> Result<BlockStatus, UploadError> {
    if entry.is_existed {
        match entry.commit_meta {
            Some(token) if !token.is_empty() => Ok(BlockStatus::AlreadyExists {
                commit_meta: CommitToken::new(token),
            }),
            _ => Err(UploadError::Negotiation(format!(
                "block {index} marked existing without commit_meta"
            ))),
        }
    } else {
        match entry.block_meta {
            Some(meta) if !meta.is_empty() => Ok(BlockStatus::NeedsUpload { block_meta: meta }),
            _ => Err(UploadError::Negotiation(format!(
                "block {index} has no block_meta"
            ))),
        }
    }
}
