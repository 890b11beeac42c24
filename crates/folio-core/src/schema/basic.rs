// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in node and mark types

use super::{AttrKind, AttrSpec, MarkSpec, NodeTypeSpec, Schema};
use crate::model::AttrValue;

fn optional_string() -> AttrSpec {
    AttrSpec::with_default(AttrKind::OptionalString, AttrValue::Null)
}

fn node_types() -> Vec<NodeTypeSpec> {
    vec![
        NodeTypeSpec::new("doc").content("block+"),
        // paragraph first: it is the default block when filling content
        NodeTypeSpec::new("paragraph").content("inline*").group("block"),
        NodeTypeSpec::new("heading")
            .content("inline*")
            .group("block")
            .attr(
                "level",
                AttrSpec::with_default(
                    AttrKind::Integer {
                        min: Some(1),
                        max: Some(6),
                    },
                    1i64,
                ),
            ),
        NodeTypeSpec::new("blockquote").content("block+").group("block"),
        NodeTypeSpec::new("horizontalRule").group("block").atomic(),
        NodeTypeSpec::new("codeBlock")
            .content("text*")
            .group("block")
            .attr("language", optional_string())
            .allow_marks(&[]),
        NodeTypeSpec::new("image")
            .group("block")
            .atomic()
            .attr("src", optional_string())
            .attr("alt", optional_string())
            .attr("title", optional_string())
            .attr(
                "align",
                AttrSpec::with_default(
                    AttrKind::one_of(&["none", "left", "center", "right"]),
                    "none",
                ),
            )
            .attr("width", AttrSpec::with_default(AttrKind::Scalar, AttrValue::Null))
            .attr("height", AttrSpec::with_default(AttrKind::Scalar, AttrValue::Null)),
        NodeTypeSpec::new("orderedList")
            .content("listItem+")
            .group("block")
            .attr(
                "order",
                AttrSpec::with_default(
                    AttrKind::Integer {
                        min: Some(1),
                        max: None,
                    },
                    1i64,
                ),
            ),
        NodeTypeSpec::new("bulletList").content("listItem+").group("block"),
        NodeTypeSpec::new("listItem").content("paragraph block*"),
        NodeTypeSpec::new("table").content("tableRow+").group("block"),
        NodeTypeSpec::new("tableRow").content("(tableCell | tableHeader)+"),
        NodeTypeSpec::new("tableCell").content("block+"),
        NodeTypeSpec::new("tableHeader").content("block+"),
        NodeTypeSpec::new("text").group("inline").inline(),
        NodeTypeSpec::new("hardBreak").group("inline").inline().atomic(),
    ]
}

fn mark_types() -> Vec<MarkSpec> {
    vec![
        MarkSpec::new("link")
            .attr("href", AttrSpec::required(AttrKind::String))
            .attr("title", optional_string())
            .attr(
                "target",
                AttrSpec::with_default(AttrKind::OptionalString, "_blank"),
            ),
        MarkSpec::new("bold"),
        MarkSpec::new("italic"),
        MarkSpec::new("underline"),
        MarkSpec::new("strike"),
        MarkSpec::new("code"),
    ]
}

impl Schema {
    /// Rich-text schema: paragraphs, headings, lists, tables, images and the
    /// standard inline marks
    pub fn basic() -> Self {
        let mut schema = Schema::new();
        for spec in node_types() {
            schema
                .register_type(spec)
                .expect("built-in node types are well-formed");
        }
        for spec in mark_types() {
            schema
                .register_mark(spec)
                .expect("built-in marks are unique");
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_schema_types() {
        let schema = Schema::basic();
        for name in ["doc", "paragraph", "heading", "table", "tableHeader", "hardBreak", "text"] {
            assert!(schema.node_spec(name).is_some(), "{name} missing");
        }
        assert!(schema.is_atomic("image"));
        assert!(!schema.is_atomic("blockquote"));
        assert_eq!(schema.mark_rank("link"), Some(0));
        assert_eq!(schema.mark_rank("code"), Some(5));
    }

    #[test]
    fn test_default_link_target() {
        let schema = Schema::basic();
        let mark = crate::model::Mark::new("link").with_attr("href", "https://example.com");
        let mark = schema.normalize_mark(&mark).unwrap();
        assert_eq!(mark.attrs["target"], AttrValue::from("_blank"));
        assert_eq!(mark.attrs["title"], AttrValue::Null);
    }
}
