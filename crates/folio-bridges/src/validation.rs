// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagram validation over HTTP
//!
//! `POST {base}/io/diagrams/validate/mermaid/` with `{"source": ...}`,
//! answered by `{"is_valid": bool, "error_message": string?}`.

use crate::client::{failed_status, ClientError, ServiceClient};
use async_trait::async_trait;
use folio_core::services::{
    ValidationRequest, ValidationResponse, ValidationService, ValidationServiceError,
};

pub const VALIDATE_PATH: &str = "/io/diagrams/validate/mermaid/";

#[derive(Debug, Clone)]
pub struct HttpValidationClient {
    client: ServiceClient,
}

impl HttpValidationClient {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Ok(Self::from_client(ServiceClient::new(base)?))
    }

    pub fn from_client(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ValidationService for HttpValidationClient {
    async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationResponse, ValidationServiceError> {
        let url = self.client.url(VALIDATE_PATH);
        tracing::trace!(%url, bytes = request.source.len(), "validating diagram source");

        let response = self
            .client
            .http()
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ValidationServiceError::Transport(e.to_string()))?;

        if let Some(status) = failed_status(&response) {
            tracing::debug!(%status, "validation service error");
            return Err(ValidationServiceError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<ValidationResponse>()
            .await
            .map_err(|e| ValidationServiceError::Decode(e.to_string()))
    }
}
