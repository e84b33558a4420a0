use std::time::Duration;

/// Fixed block size used by the KSS block store (4 MiB).
pub const CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Exclusive upper bound on the size of a single uploaded file (4 GiB).
pub const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://i.mi.com";

/// Endpoint that registers a manifest and negotiates which blocks are missing.
pub const CREATE_FILE_PATH: &str = "/drive/user/files/create";

/// Endpoint that commits uploaded content as a named file.
pub const COMMIT_FILE_PATH: &str = "/drive/user/files";

/// Path appended to a node address for raw block transfers.
pub const UPLOAD_BLOCK_PATH: &str = "/upload_block_chunk";

/// Result marker of a successful API call.
pub const RESULT_OK: &str = "ok";

/// Block transfer status that signals the node accepted the block.
pub const BLOCK_COMPLETED: &str = "BLOCK_COMPLETED";

/// `stat` value sent back in the final KSS commit record.
pub const KSS_STAT_OK: &str = "OK";

/// Provenance headers expected by the web API.
pub const HEADER_ORIGIN: &str = "https://i.mi.com";
pub const HEADER_REFERER: &str = "https://i.mi.com/drive";
pub const HEADER_DNT: &str = "1";

/// Folder id of the drive root.
pub const ROOT_FOLDER_ID: &str = "0";

/// Timeout for negotiation and commit requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single block transfer.
///
/// A 4 MiB body on a slow uplink needs considerably longer than a
/// form post.
pub const BLOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Form field names shared by the negotiation and commit requests.
pub mod form {
    pub const DATA: &str = "data";
    pub const SERVICE_TOKEN: &str = "serviceToken";
    pub const PARENT_ID: &str = "parentId";
}

/// Builds the block transfer URL for a node.
pub fn block_upload_url(node_url: &str, file_meta: &str, block_meta: &str) -> String {
    format!(
        "{}{UPLOAD_BLOCK_PATH}?chunk_pos=0&file_meta={file_meta}&block_meta={block_meta}",
        node_url.trim_end_matches('/')
    )
}
