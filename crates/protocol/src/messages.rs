//! Request and response payloads of the upload protocol.
//!
//! Response types are deliberately lenient (defaults everywhere); the
//! upload crate turns them into strict, tagged outcomes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::KSS_STAT_OK;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Top-level wrapper of every `data` form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest<S> {
    pub content: UploadContent<S>,
}

/// Names the file and carries the storage section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadContent<S> {
    pub name: String,
    pub storage: S,
}

impl<S> UploadRequest<S> {
    pub fn new(name: impl Into<String>, storage: S) -> Self {
        Self {
            content: UploadContent {
                name: name.into(),
                storage,
            },
        }
    }
}

/// Storage section of the negotiation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationStorage {
    pub size: u64,
    pub sha1: String,
    pub kss: BlockInfoList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfoList {
    pub block_infos: Vec<BlockInfo>,
}

/// Digest metadata of one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Always an empty object on the wire.
    #[serde(default)]
    pub blob: Blob,
    pub sha1: String,
    pub md5: String,
    pub size: u64,
}

/// Empty placeholder object (`{}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blob {}

/// Storage section of a commit that references an upload the server
/// already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingStorage {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    pub exists: bool,
}

/// Storage section of a commit after blocks have been transferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStorage {
    pub size: u64,
    pub sha1: String,
    pub kss: KssCommit,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    pub exists: bool,
}

/// KSS commit record listing the per-block commit tokens in block order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KssCommit {
    pub stat: String,
    pub node_urls: Vec<String>,
    pub secure_key: String,
    #[serde(rename = "contentCacheKey")]
    pub content_cache_key: String,
    pub file_meta: String,
    pub commit_metas: Vec<CommitMeta>,
}

impl KssCommit {
    pub fn new(
        node_urls: Vec<String>,
        secure_key: String,
        content_cache_key: String,
        file_meta: String,
        commit_metas: Vec<CommitMeta>,
    ) -> Self {
        Self {
            stat: KSS_STAT_OK.to_string(),
            node_urls,
            secure_key,
            content_cache_key,
            file_meta,
            commit_metas,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub commit_meta: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// `data` of the negotiation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationData {
    pub storage: NegotiationStorageResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationStorageResponse {
    #[serde(default, deserialize_with = "flag")]
    pub exists: bool,
    #[serde(rename = "uploadId", default)]
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kss: Option<KssNegotiation>,
}

/// Node assignment and per-block status returned when blocks are needed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KssNegotiation {
    #[serde(default)]
    pub node_urls: Vec<String>,
    #[serde(default)]
    pub file_meta: String,
    #[serde(default)]
    pub secure_key: String,
    #[serde(rename = "contentCacheKey", default)]
    pub content_cache_key: String,
    #[serde(default)]
    pub block_metas: Vec<BlockMetaEntry>,
}

/// One entry of `block_metas`.
///
/// Either `is_existed` is set and `commit_meta` carries the token, or
/// `block_meta` carries the transfer metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMetaEntry {
    #[serde(default, deserialize_with = "flag")]
    pub is_existed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_meta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_meta: Option<String>,
}

/// Body returned by a storage node after a block transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockChunkResponse {
    #[serde(default)]
    pub stat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_meta: Option<String>,
}

/// `data` of the commit response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitData {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

// ---------------------------------------------------------------------------
// Lenient scalar decoding
// ---------------------------------------------------------------------------

/// Accepts `true`/`false`, `0`/`1` and their string forms.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_i64().is_some_and(|v| v != 0)),
        serde_json::Value::String(s) => Ok(matches!(s.as_str(), "1" | "true")),
        serde_json::Value::Null => Ok(false),
        other => Err(D::Error::custom(format!("expected a flag, got {other}"))),
    }
}

/// File ids are strings in current responses but numeric in older ones.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected an id, got {other}"))),
    }
}
