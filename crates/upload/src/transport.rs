//! HTTP transport seam.
//!
//! `CloudTransport` is implemented by `micloud-client` on top of
//! `reqwest`; tests implement it with scripted responses.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{TransportError, UploadError};
use crate::types::UploadStage;

/// Future returned by transport calls: the raw response body.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<u8>, TransportError>> + Send + 'a>>;

/// Authenticated HTTP access to the drive API and storage nodes.
///
/// Implementations attach the session cookie and provenance headers.
/// A non-2xx status is reported as [`TransportError::Status`].
pub trait CloudTransport: Send + Sync {
    /// POSTs `form` URL-encoded to `url`.
    fn post_form<'a>(&'a self, url: &'a str, form: &'a [(&'a str, String)]) -> TransportFuture<'a>;

    /// POSTs raw block bytes (`application/octet-stream`) to `url`.
    fn post_block<'a>(&'a self, url: &'a str, data: Vec<u8>) -> TransportFuture<'a>;
}

/// Awaits a transport call bounded by `limit`, attributing failures to `stage`.
pub(crate) async fn call_with_timeout(
    stage: UploadStage,
    limit: Duration,
    call: TransportFuture<'_>,
) -> Result<Vec<u8>, UploadError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(source)) => Err(UploadError::Transport { stage, source }),
        Err(_) => Err(UploadError::Timeout { stage }),
    }
}
