// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted tree form (JSON)
//!
//! Every node is an object `{type, attrs?, content?, text?, marks?}`. Text
//! runs use the type `text`. Empty attribute maps, child lists and mark lists
//! are omitted.

use crate::model::{Attrs, Element, Mark, Node, TextRun, DOC_TYPE, TEXT_TYPE};
use crate::schema::{Schema, ViolationKind};
use crate::traits::{DeserializeError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedNode {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attrs: Option<Attrs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Vec<PersistedNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    marks: Option<Vec<Mark>>,
}

impl From<&Node> for PersistedNode {
    fn from(node: &Node) -> Self {
        match node {
            Node::Text(run) => PersistedNode {
                node_type: TEXT_TYPE.to_string(),
                attrs: None,
                content: None,
                text: Some(run.text.clone()),
                marks: (!run.marks.is_empty()).then(|| run.marks.clone()),
            },
            Node::Element(el) => PersistedNode {
                node_type: el.node_type.clone(),
                attrs: (!el.attrs.is_empty()).then(|| el.attrs.clone()),
                content: (!el.content.is_empty())
                    .then(|| el.content.iter().map(PersistedNode::from).collect()),
                text: None,
                marks: None,
            },
        }
    }
}

impl From<PersistedNode> for Node {
    fn from(node: PersistedNode) -> Self {
        if node.node_type == TEXT_TYPE {
            return Node::Text(TextRun {
                text: node.text.unwrap_or_default(),
                marks: node.marks.unwrap_or_default(),
            });
        }
        Node::Element(Element {
            node_type: node.node_type,
            attrs: node.attrs.unwrap_or_default(),
            content: node
                .content
                .unwrap_or_default()
                .into_iter()
                .map(Node::from)
                .collect(),
        })
    }
}

/// Write a document in persisted form
pub fn serialize_to_persisted(doc: &Node) -> Result<String> {
    Ok(serde_json::to_string(&PersistedNode::from(doc))?)
}

/// Read a document from persisted form.
///
/// The tree is normalized against `schema`: unknown attribute keys are
/// dropped, missing or invalid values fall back to defaults and unknown node
/// types become unsupported-content placeholders. A required attribute that
/// is missing or invalid fails the whole read.
pub fn deserialize_from_persisted(
    schema: &Schema,
    input: &str,
) -> std::result::Result<Node, DeserializeError> {
    let persisted: PersistedNode = serde_json::from_str(input)?;
    if persisted.node_type != DOC_TYPE {
        return Err(DeserializeError::RootNotDoc(persisted.node_type));
    }

    let (doc, violations) = schema.normalize(Node::from(persisted));
    let (fatal, repaired): (Vec<_>, Vec<_>) = violations.into_iter().partition(|v| {
        matches!(
            v.kind,
            ViolationKind::MissingAttribute { .. } | ViolationKind::InvalidAttribute { .. }
        )
    });
    for violation in &repaired {
        tracing::debug!(%violation, "repaired persisted document");
    }
    if !fatal.is_empty() {
        return Err(DeserializeError::Schema(fatal));
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttrValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_serialize_shape() {
        let doc = Node::doc(vec![Node::paragraph(vec![Node::marked_text(
            "hi",
            vec![Mark::new("bold")],
        )])]);
        let json = serialize_to_persisted(&doc).unwrap();
        assert_eq!(
            json,
            r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"hi","marks":[{"type":"bold"}]}]}]}"#
        );
    }

    #[test]
    fn test_empty_doc_gets_paragraph() {
        let schema = Schema::basic();
        let doc = deserialize_from_persisted(&schema, r#"{"type":"doc"}"#).unwrap();
        assert_eq!(doc, Node::empty_doc());
    }

    #[test]
    fn test_attrs_normalized() {
        let schema = Schema::basic();
        let input = r#"{"type":"doc","content":[
            {"type":"heading","attrs":{"level":"2","color":"red"},"content":[{"type":"text","text":"T"}]}
        ]}"#;
        let doc = deserialize_from_persisted(&schema, input).unwrap();
        let heading = doc.content()[0].as_element().unwrap();
        assert_eq!(heading.attrs.len(), 1);
        assert_eq!(heading.attrs["level"], AttrValue::Integer(1));
    }

    #[test]
    fn test_missing_required_mark_attr_fails() {
        let schema = Schema::basic();
        let input = r#"{"type":"doc","content":[{"type":"paragraph","content":[
            {"type":"text","text":"x","marks":[{"type":"link"}]}
        ]}]}"#;
        let err = deserialize_from_persisted(&schema, input).unwrap_err();
        assert!(matches!(err, DeserializeError::Schema(ref v) if v.len() == 1));
    }

    #[test]
    fn test_root_must_be_doc() {
        let schema = Schema::basic();
        let err = deserialize_from_persisted(&schema, r#"{"type":"paragraph"}"#).unwrap_err();
        assert!(matches!(err, DeserializeError::RootNotDoc(ref t) if t == "paragraph"));
    }

    #[test]
    fn test_malformed_json() {
        let schema = Schema::basic();
        let err = deserialize_from_persisted(&schema, "{not json").unwrap_err();
        assert!(matches!(err, DeserializeError::Json(_)));
    }

    #[test]
    fn test_atomic_children_dropped() {
        let schema = Schema::basic();
        let input = r#"{"type":"doc","content":[
            {"type":"horizontalRule","content":[{"type":"text","text":"x"}]}
        ]}"#;
        let doc = deserialize_from_persisted(&schema, input).unwrap();
        assert!(doc.content()[0].content().is_empty());
    }
}
