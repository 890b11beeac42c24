// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unsupported-content placeholder
//!
//! Stands in for anything the schema cannot represent, typically macros from
//! an imported legacy document. The node keeps a label and an optional handle
//! used to fetch the original content on demand.

use crate::formats::scanner::escape_text;
use crate::model::{AttrValue, Element};
use crate::schema::{AttrKind, AttrSpec, NodeTypeSpec};
use crate::services::DetailHandle;
use crate::traits::{EditingBehavior, ExtensionModule};

pub const PLACEHOLDER_TYPE: &str = "fallbackPlaceholder";
pub const DEFAULT_SOURCE_LABEL: &str = "Unknown Macro";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderModule;

pub fn source_label(node: &Element) -> &str {
    node.attr("sourceLabel")
        .and_then(AttrValue::as_str)
        .unwrap_or(DEFAULT_SOURCE_LABEL)
}

/// Handle for fetching the original content, if the node has one
pub fn detail_handle(node: &Element) -> Option<DetailHandle> {
    node.attr("detailHandle").and_then(DetailHandle::from_attr)
}

impl ExtensionModule for PlaceholderModule {
    fn name(&self) -> &str {
        PLACEHOLDER_TYPE
    }

    fn node_specs(&self) -> Vec<NodeTypeSpec> {
        vec![NodeTypeSpec::new(PLACEHOLDER_TYPE)
            .group("block")
            .atomic()
            .attr(
                "sourceLabel",
                AttrSpec::with_default(AttrKind::String, DEFAULT_SOURCE_LABEL),
            )
            .attr(
                "detailHandle",
                AttrSpec::with_default(AttrKind::Scalar, AttrValue::Null),
            )]
    }

    fn behavior(&self) -> EditingBehavior {
        EditingBehavior::Interactive
    }

    fn fallback_label_attr(&self) -> Option<&str> {
        Some("sourceLabel")
    }

    fn render_body(&self, node: &Element) -> String {
        format!(
            r#"<p class="unsupported-content">Unsupported content: {}</p>"#,
            escape_text(source_label(node))
        )
    }
}
