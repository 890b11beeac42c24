// SPDX-License-Identifier: AGPL-3.0-or-later
//! Serializers for the document tree

pub mod markup;
pub mod persisted;
pub mod scanner;

#[cfg(feature = "markdown")]
pub mod markdown;

pub use markup::{
    deserialize_from_markup, render_carrier_block, serialize_to_markup, serialize_to_markup_with,
    MarkupFragment,
};
pub use persisted::{deserialize_from_persisted, serialize_to_persisted};

#[cfg(feature = "markdown")]
pub use markdown::{export_markdown, import_markdown};
