// SPDX-License-Identifier: AGPL-3.0-or-later
//! Externally edited diagrams
//!
//! The payload is opaque: nothing in the document model reads it. Editing is
//! delegated to an external surface through the editor bridge.

use crate::formats::scanner::escape_attr;
use crate::model::{AttrValue, Element};
use crate::schema::{AttrKind, AttrSpec, NodeTypeSpec};
use crate::traits::{EditingBehavior, ExtensionModule};

pub const EXTERNAL_DIAGRAM_TYPE: &str = "drawioDiagram";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalDiagramModule;

/// Opaque payload of an external diagram node
pub fn diagram_payload(node: &Element) -> &str {
    node.attr("xml").and_then(AttrValue::as_str).unwrap_or_default()
}

impl ExtensionModule for ExternalDiagramModule {
    fn name(&self) -> &str {
        EXTERNAL_DIAGRAM_TYPE
    }

    fn node_specs(&self) -> Vec<NodeTypeSpec> {
        vec![NodeTypeSpec::new(EXTERNAL_DIAGRAM_TYPE)
            .group("block")
            .atomic()
            .attr("xml", AttrSpec::with_default(AttrKind::String, ""))]
    }

    fn behavior(&self) -> EditingBehavior {
        EditingBehavior::Interactive
    }

    fn render_body(&self, node: &Element) -> String {
        let payload = diagram_payload(node);
        if payload.is_empty() {
            r#"<p class="diagram-empty">Empty diagram</p>"#.to_string()
        } else {
            format!(
                r#"<p class="diagram-external" data-size="{}">Diagram</p>"#,
                escape_attr(&payload.len().to_string())
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_defaults_to_empty() {
        let node = Element::new(EXTERNAL_DIAGRAM_TYPE);
        assert_eq!(diagram_payload(&node), "");
        assert!(ExternalDiagramModule.render_body(&node).contains("Empty diagram"));
    }
}
