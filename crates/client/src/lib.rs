//! MiCloud HTTP client.
//!
//! Provides [`HttpTransport`], the `reqwest` implementation of
//! [`micloud_upload::CloudTransport`].

mod client;

pub use client::{ClientConfig, ClientError, HttpTransport, Session};
