// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema validation scenarios over the standard schema

use folio_core::{Element, Node, NodePath, Schema, ViolationKind};

fn row(cells: Vec<Node>) -> Node {
    Element::new("tableRow").with_content(cells).into()
}

#[test]
fn test_table_row_rejects_paragraph() {
    let schema = Schema::standard();
    let doc = Node::doc(vec![Element::new("table")
        .with_content(vec![row(vec![Node::paragraph(vec![Node::text("x")])])])
        .into()]);

    let violations = schema.validate(&doc).unwrap_err();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].path, NodePath::from([0, 0]));
    assert_eq!(
        violations[0].kind,
        ViolationKind::ContentMismatch {
            node_type: "tableRow".into(),
            expected: "(tableCell | tableHeader)+".into(),
            found: vec!["paragraph".into()],
        }
    );
    assert_eq!(violations[0].to_string().split(':').next(), Some("/0/0"));
}

#[test]
fn test_normalize_repairs_table_row() {
    let schema = Schema::standard();
    let doc = Node::doc(vec![Element::new("table")
        .with_content(vec![row(vec![Node::paragraph(vec![Node::text("x")])])])
        .into()]);

    let (fixed, violations) = schema.normalize(doc);
    assert!(!violations.is_empty());
    assert_eq!(schema.validate(&fixed), Ok(()));
    let cell = fixed.get(&NodePath::from([0, 0, 0])).unwrap();
    assert!(matches!(cell.node_type(), "tableCell" | "tableHeader"));
}

#[test]
fn test_atomic_diagram_with_children() {
    let schema = Schema::standard();
    let doc = Node::doc(vec![Element::new("mermaidDiagram")
        .with_attr("source", "graph TD")
        .with_content(vec![Node::text("stray")])
        .into()]);

    let violations = schema.validate(&doc).unwrap_err();
    assert!(violations
        .iter()
        .any(|v| v.kind == ViolationKind::AtomicHasChildren("mermaidDiagram".into())));
}
