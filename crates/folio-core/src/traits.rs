// SPDX-License-Identifier: AGPL-3.0-or-later
//! Serializer errors, configuration and the extension module trait

use crate::formats::markup::{self, MarkupFragment};
use crate::model::{Element, NodePath};
use crate::schema::{NodeTypeSpec, SchemaViolation};

/// Error raised while writing a document out
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("document violates the schema ({} violations)", .0.len())]
    Invalid(Vec<SchemaViolation>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot render `{node_type}` at {path}")]
    Unrenderable { node_type: String, path: NodePath },
}

/// Error raised while reading a document in
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Markup error at offset {offset}: {message}")]
    Markup { offset: usize, message: String },

    #[error("document violates the schema ({} violations)", .0.len())]
    Schema(Vec<SchemaViolation>),

    #[error("root node is `{0}`, expected `doc`")]
    RootNotDoc(String),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Configuration for display markup output
#[derive(Debug, Clone)]
pub struct MarkupConfig {
    /// Emit the visible body of extension blocks after their carriers
    pub fallback_bodies: bool,
    /// Put each top-level block on its own line
    pub block_newlines: bool,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            fallback_bodies: true,
            block_newlines: false,
        }
    }
}

/// How a view edits nodes of an extension type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditingBehavior {
    /// Attributes only change through ordinary commands
    Declarative,
    /// A dedicated view manages local state and writes back through commands
    Interactive,
}

/// A self-contained node type registration with its markup codec
pub trait ExtensionModule: Send + Sync {
    /// Node type name this module owns
    fn name(&self) -> &str;

    /// Node types to register in the schema
    fn node_specs(&self) -> Vec<NodeTypeSpec>;

    fn behavior(&self) -> EditingBehavior;

    /// Visible HTML shown in place of the node when carriers are not read
    fn render_body(&self, node: &Element) -> String;

    /// Attribute receiving the unknown type name when this module stands in
    /// for unsupported content
    fn fallback_label_attr(&self) -> Option<&str> {
        None
    }

    /// Node → markup fragment
    fn to_markup(&self, node: &Element, config: &MarkupConfig) -> String {
        let body = config.fallback_bodies.then(|| self.render_body(node));
        markup::render_carrier_block(&node.node_type, &node.attrs, body.as_deref())
    }

    /// Markup fragment → node
    fn from_markup(&self, fragment: MarkupFragment) -> Element {
        Element {
            node_type: fragment.node_type,
            attrs: fragment.carriers,
            content: Vec::new(),
        }
    }
}
