//! Final commit: registers uploaded content as a named file.

use std::time::Duration;

use micloud_protocol::constants::form;
use micloud_protocol::{ApiResponse, CommitData};
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::transport::{CloudTransport, call_with_timeout};
use crate::types::{FinalManifest, UploadSession, UploadStage};

/// Submits `manifest` as file `name` under folder `parent_id` and returns
/// the new file id.
///
/// Sent exactly once; a failure is never retried here.
pub async fn commit(
    transport: &dyn CloudTransport,
    session: &UploadSession,
    name: &str,
    parent_id: &str,
    manifest: &FinalManifest,
    timeout: Duration,
) -> Result<String, UploadError> {
    let data = manifest.to_json(name)?;
    let url = session.commit_url();
    let fields = [
        (form::DATA, data),
        (form::SERVICE_TOKEN, session.service_token.clone()),
        (form::PARENT_ID, parent_id.to_string()),
    ];

    debug!(
        %name,
        %parent_id,
        existing = matches!(manifest, FinalManifest::Existing { .. }),
        "committing upload"
    );

    let body = call_with_timeout(UploadStage::Commit, timeout, transport.post_form(&url, &fields))
        .await?;
    parse_commit_response(&body)
}

/// Extracts the new file id from a commit response.
pub fn parse_commit_response(body: &[u8]) -> Result<String, UploadError> {
    let resp = ApiResponse::from_slice(body)
        .map_err(|e| UploadError::Commit(format!("malformed response: {e}")))?
        .into_result()
        .map_err(|e| {
            warn!(result = %e.result, code = e.code, "commit rejected");
            UploadError::Commit(e.description)
        })?;

    let data: CommitData = resp
        .parse_data()
        .map_err(|e| UploadError::Commit(format!("malformed response data: {e}")))?
        .ok_or_else(|| UploadError::Commit("response has no data".into()))?;
    if data.id.is_empty() {
        return Err(UploadError::Commit("response has an empty file id".into()));
    }
    Ok(data.id)
}
