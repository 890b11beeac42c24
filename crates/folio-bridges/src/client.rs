// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared HTTP plumbing for the service clients

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("folio-docs/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL `{url}`")]
    InvalidBaseUrl { url: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// A base URL plus a configured [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base: String,
}

impl ServiceClient {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self, ClientError> {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::InvalidBaseUrl {
                url: base.to_string(),
            });
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Join a path (starting with `/`) onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Non-success status codes, if any
pub(crate) fn failed_status(response: &Response) -> Option<StatusCode> {
    let status = response.status();
    (!status.is_success()).then_some(status)
}
