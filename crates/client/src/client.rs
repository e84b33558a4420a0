//! Authenticated HTTP transport.
//!
//! Async HTTP client using `reqwest`. Every request carries the session
//! cookie and the web console's provenance headers.

use std::time::Duration;

use micloud_protocol::constants::{BLOCK_TIMEOUT, HEADER_DNT, HEADER_ORIGIN, HEADER_REFERER};
use micloud_upload::{CloudTransport, TransportError, TransportFuture};
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER};
use tracing::{debug, warn};

/// Errors from building the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Account credentials sent as cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub service_token: String,
    pub user_id: String,
}

impl Session {
    pub fn new(service_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            service_token: service_token.into(),
            user_id: user_id.into(),
        }
    }

    fn cookie_header(&self) -> String {
        format!(
            "serviceToken={}; userId={}",
            self.service_token, self.user_id
        )
    }
}

/// Connection tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Outer cap on any single request, block transfers included. The
    /// upload pipeline applies its own tighter per-stage bounds.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(BLOCK_TIMEOUT),
        }
    }
}

/// `reqwest` implementation of [`CloudTransport`].
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport for `session`.
    pub fn new(session: &Session, config: &ClientConfig) -> Result<Self, ClientError> {
        if session.service_token.is_empty() {
            return Err(ClientError::InvalidCredentials(
                "service token is empty".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&session.cookie_header()).map_err(|_| {
                ClientError::InvalidCredentials("cookie contains invalid characters".into())
            })?,
        );
        headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static(HEADER_DNT));
        headers.insert(ORIGIN, HeaderValue::from_static(HEADER_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(HEADER_REFERER));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
        })
    }

    /// Sends a request and returns the body of a 2xx response.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, TransportError> {
        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "request rejected");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TransportError::Http(e.to_string()))
    }
}

impl CloudTransport for HttpTransport {
    fn post_form<'a>(&'a self, url: &'a str, form: &'a [(&'a str, String)]) -> TransportFuture<'a> {
        Box::pin(async move {
            debug!(%url, fields = form.len(), "POST form");
            self.send(self.http.post(url).form(form)).await
        })
    }

    fn post_block<'a>(&'a self, url: &'a str, data: Vec<u8>) -> TransportFuture<'a> {
        Box::pin(async move {
            debug!(bytes = data.len(), "POST block");
            let req = self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data);
            self.send(req).await
        })
    }
}
