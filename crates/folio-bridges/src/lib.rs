// SPDX-License-Identifier: AGPL-3.0-or-later
//! Folio Bridges - HTTP clients for the document services
//!
//! Implements the service traits from `folio-core` over REST:
//! - [`HttpValidationClient`]: diagram source validation
//! - [`HttpDetailFetcher`]: original content behind placeholders

pub mod client;
pub mod detail;
pub mod validation;

pub use client::{ClientError, ServiceClient, DEFAULT_TIMEOUT};
pub use detail::HttpDetailFetcher;
pub use validation::HttpValidationClient;

use anyhow::Context;
use folio_core::services::{DetailFetcher, ValidationService};
use folio_editor::EditorConfig;
use std::sync::Arc;

/// Service clients for whichever endpoints are configured
#[derive(Clone, Default)]
pub struct ServiceClients {
    pub validation: Option<Arc<dyn ValidationService>>,
    pub detail: Option<Arc<dyn DetailFetcher>>,
}

impl ServiceClients {
    /// Build clients from optional base URLs. An absent endpoint leaves the
    /// corresponding client unset.
    pub fn from_endpoints(
        validation_endpoint: Option<&str>,
        detail_endpoint: Option<&str>,
    ) -> anyhow::Result<Self> {
        let validation = validation_endpoint
            .map(|base| {
                HttpValidationClient::new(base)
                    .with_context(|| format!("validation client for {base}"))
            })
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn ValidationService>);
        let detail = detail_endpoint
            .map(|base| {
                HttpDetailFetcher::new(base).with_context(|| format!("detail client for {base}"))
            })
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn DetailFetcher>);
        tracing::info!(
            validation = validation.is_some(),
            detail = detail.is_some(),
            "service clients configured"
        );
        Ok(Self { validation, detail })
    }
}

impl ServiceClients {
    /// Clients for the endpoints named in the editor configuration
    pub fn from_config(config: &EditorConfig) -> anyhow::Result<Self> {
        Self::from_endpoints(
            config.validation_endpoint.as_deref(),
            config.detail_endpoint.as_deref(),
        )
    }
}

impl std::fmt::Debug for ServiceClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClients")
            .field("validation", &self.validation.is_some())
            .field("detail", &self.detail.is_some())
            .finish()
    }
}
