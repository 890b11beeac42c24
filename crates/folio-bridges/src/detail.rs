// SPDX-License-Identifier: AGPL-3.0-or-later
//! Placeholder detail lookup over HTTP
//!
//! `GET {base}/io/fallback-macros/{handle}/`. A 404 means the handle is
//! unknown.

use crate::client::{failed_status, ClientError, ServiceClient};
use async_trait::async_trait;
use folio_core::services::{DetailFetchError, DetailFetcher, DetailHandle, PlaceholderDetail};
use reqwest::StatusCode;

#[derive(Debug, Clone)]
pub struct HttpDetailFetcher {
    client: ServiceClient,
}

impl HttpDetailFetcher {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Ok(Self::from_client(ServiceClient::new(base)?))
    }

    pub fn from_client(client: ServiceClient) -> Self {
        Self { client }
    }

    fn detail_url(&self, handle: &DetailHandle) -> String {
        let segment = handle.to_string();
        self.client
            .url(&format!("/io/fallback-macros/{}/", urlencoding::encode(&segment)))
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn fetch_detail(
        &self,
        handle: &DetailHandle,
    ) -> Result<PlaceholderDetail, DetailFetchError> {
        let url = self.detail_url(handle);
        tracing::debug!(%url, "fetching placeholder detail");

        let response = self
            .client
            .http()
            .get(&url)
            .send()
            .await
            .map_err(|e| DetailFetchError::Transport(e.to_string()))?;

        match failed_status(&response) {
            Some(StatusCode::NOT_FOUND) => return Err(DetailFetchError::NotFound(handle.to_string())),
            Some(status) => {
                return Err(DetailFetchError::Status {
                    status: status.as_u16(),
                })
            }
            None => {}
        }

        response
            .json::<PlaceholderDetail>()
            .await
            .map_err(|e| DetailFetchError::Decode(e.to_string()))
    }
}
