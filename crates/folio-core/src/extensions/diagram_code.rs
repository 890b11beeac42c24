// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagram-as-code blocks
//!
//! An atomic node whose only state is its diagram source. Rendering happens
//! client side through a [`DiagramRenderer`]; the editing view adds debounced
//! remote validation on top.

use super::flowchart::{DiagramRenderer, FlowchartRenderer};
use crate::formats::scanner::escape_text;
use crate::model::{AttrValue, Element};
use crate::schema::{AttrKind, AttrSpec, NodeTypeSpec};
use crate::traits::{EditingBehavior, ExtensionModule};
use std::sync::Arc;

pub const DIAGRAM_CODE_TYPE: &str = "mermaidDiagram";
pub const DEFAULT_DIAGRAM_SOURCE: &str = "graph TD\nA-->B";

pub struct DiagramCodeModule {
    renderer: Arc<dyn DiagramRenderer>,
}

impl DiagramCodeModule {
    pub fn new(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> Arc<dyn DiagramRenderer> {
        Arc::clone(&self.renderer)
    }
}

impl Default for DiagramCodeModule {
    fn default() -> Self {
        Self::new(Arc::new(FlowchartRenderer))
    }
}

/// Source attribute of a diagram node, falling back to the default
pub fn diagram_source(node: &Element) -> &str {
    node.attr("source")
        .and_then(AttrValue::as_str)
        .unwrap_or(DEFAULT_DIAGRAM_SOURCE)
}

impl ExtensionModule for DiagramCodeModule {
    fn name(&self) -> &str {
        DIAGRAM_CODE_TYPE
    }

    fn node_specs(&self) -> Vec<NodeTypeSpec> {
        vec![NodeTypeSpec::new(DIAGRAM_CODE_TYPE)
            .group("block")
            .atomic()
            .attr(
                "source",
                AttrSpec::with_default(AttrKind::String, DEFAULT_DIAGRAM_SOURCE),
            )]
    }

    fn behavior(&self) -> EditingBehavior {
        EditingBehavior::Interactive
    }

    fn render_body(&self, node: &Element) -> String {
        let source = diagram_source(node);
        if source.trim().is_empty() {
            return String::new();
        }
        match self.renderer.render(source) {
            Ok(artifact) => artifact.svg,
            Err(err) => format!(
                r#"<pre class="diagram-error">{}</pre><pre class="diagram-source">{}</pre>"#,
                escape_text(&err.to_string()),
                escape_text(source)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_renders_svg() {
        let module = DiagramCodeModule::default();
        let node = Element::new(DIAGRAM_CODE_TYPE).with_attr("source", DEFAULT_DIAGRAM_SOURCE);
        assert!(module.render_body(&node).starts_with("<svg"));
    }

    #[test]
    fn test_body_shows_error_and_keeps_source() {
        let module = DiagramCodeModule::default();
        let node = Element::new(DIAGRAM_CODE_TYPE).with_attr("source", "not a <diagram>");
        let body = module.render_body(&node);
        assert!(body.contains("diagram-error"));
        assert!(body.contains("not a &lt;diagram&gt;"));
    }
}
