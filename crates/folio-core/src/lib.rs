// SPDX-License-Identifier: AGPL-3.0-or-later
//! Folio Core - Schema-validated document tree and its serializers
//!
//! This crate provides:
//! - A document tree of typed elements and marked text runs
//! - A schema registry with content expressions, validation and normalization
//! - Persisted JSON and display markup serializers, plus best-effort Markdown
//! - Extension modules for diagram-as-code, external diagrams and placeholders
//! - Contracts for the remote validation and detail services

pub mod extensions;
pub mod formats;
pub mod model;
pub mod schema;
pub mod services;
pub mod traits;

pub use extensions::ExtensionRegistry;
pub use model::{AttrValue, Attrs, Element, Mark, Node, NodePath, TextRun};
pub use schema::{Schema, SchemaError, SchemaViolation, ViolationKind};
pub use traits::{
    DeserializeError, EditingBehavior, ExtensionModule, MarkupConfig, Result, SerializationError,
};
