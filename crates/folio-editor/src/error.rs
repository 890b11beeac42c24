// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editor error types

use folio_core::{DeserializeError, NodePath, SchemaViolation, SerializationError};

/// A command could not be applied to the current tree
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("no node at {0}")]
    InvalidPath(NodePath),

    #[error("node at {0} is not an element")]
    NotAnElement(NodePath),

    #[error("index {index} is out of bounds for {path} ({len} children)")]
    IndexOutOfBounds {
        path: NodePath,
        index: usize,
        len: usize,
    },

    #[error("range {from}..{to} is out of bounds for {path} (length {len})")]
    InvalidRange {
        path: NodePath,
        from: usize,
        to: usize,
        len: usize,
    },

    #[error("the document root cannot be removed")]
    RootRemoval,

    #[error("expected a {expected} node at {path}, found {found}")]
    TypeMismatch {
        path: NodePath,
        expected: String,
        found: String,
    },
}

/// Configuration could not be read
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("change rejected: {} schema violations", .0.len())]
    Rejected(Vec<SchemaViolation>),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Deserialize(#[from] DeserializeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("editing session is gone")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, EditorError>;
