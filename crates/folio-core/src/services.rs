// SPDX-License-Identifier: AGPL-3.0-or-later
//! Contracts for the remote collaborators of the editor
//!
//! Only the request/response shapes and traits live here. HTTP adapters are
//! in the `folio-bridges` crate.

use crate::model::AttrValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of a diagram validation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub source: String,
}

/// Verdict from the validation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub is_valid: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ValidationResponse {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error_message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
        }
    }
}

/// Transport or decoding failure talking to the validation service.
/// Never blocks editing; the next debounce cycle retries.
#[derive(Debug, thiserror::Error)]
pub enum ValidationServiceError {
    #[error("validation request failed: {0}")]
    Transport(String),

    #[error("validation service returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed validation response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationResponse, ValidationServiceError>;
}

/// Opaque reference to the original content behind a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetailHandle {
    Id(i64),
    Key(String),
}

impl DetailHandle {
    /// `None` for null or any value that cannot identify content
    pub fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Integer(id) => Some(DetailHandle::Id(*id)),
            AttrValue::String(key) if !key.is_empty() => Some(DetailHandle::Key(key.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DetailHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailHandle::Id(id) => write!(f, "{id}"),
            DetailHandle::Key(key) => f.write_str(key),
        }
    }
}

/// Original content of an unsupported block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderDetail {
    #[serde(alias = "raw_macro_content")]
    pub raw_content: String,
    #[serde(default, alias = "import_notes", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DetailFetchError {
    #[error("no detail found for handle {0}")]
    NotFound(String),

    #[error("detail request failed: {0}")]
    Transport(String),

    #[error("detail service returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed detail response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, handle: &DetailHandle) -> Result<PlaceholderDetail, DetailFetchError>;
}
