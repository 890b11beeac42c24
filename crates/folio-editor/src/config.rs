// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editor configuration loaded from TOML

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "folio.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiet period after the last keystroke before render, validation and commit
    pub debounce_ms: u64,

    /// Undo levels kept by a session (0 = unlimited)
    pub max_undo_levels: usize,

    /// How long a closing bridge waits for the surface's export reply
    pub bridge_close_timeout_ms: u64,

    /// Only bridge messages from this source are accepted
    pub surface_origin: String,

    /// Sent once to the surface as a `configure` action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_config: Option<serde_json::Value>,

    /// Base URL of the diagram validation service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_endpoint: Option<String>,

    /// Base URL of the placeholder detail service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_endpoint: Option<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 750,
            max_undo_levels: 100,
            bridge_close_timeout_ms: 2000,
            surface_origin: "https://embed.diagrams.net".to_string(),
            surface_config: None,
            validation_endpoint: None,
            detail_endpoint: None,
        }
    }
}

impl EditorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn bridge_close_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_close_timeout_ms)
    }
}
