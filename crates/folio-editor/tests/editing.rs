// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end editing flows through the session

use async_trait::async_trait;
use folio_core::extensions::FlowchartRenderer;
use folio_core::services::{
    ValidationRequest, ValidationResponse, ValidationService, ValidationServiceError,
};
use folio_core::{AttrValue, Element, ExtensionRegistry, Mark, Node, NodePath};
use folio_editor::bridge::{Bridge, BridgeState};
use folio_editor::views::{DiagramView, ExternalDiagramView, ValidationStatus};
use folio_editor::{Command, CommandError, EditingSession, EditorConfig, EditorError, ExtensionContext};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const ORIGIN: &str = "https://embed.diagrams.net";

fn session() -> EditingSession {
    EditingSession::new(
        Arc::new(ExtensionRegistry::standard()),
        &EditorConfig::default(),
    )
}

fn attr_at<'a>(doc: &'a Node, path: &NodePath, key: &str) -> Option<&'a AttrValue> {
    doc.get(path)?.as_element()?.attr(key)
}

#[test]
fn test_toggle_bold_with_undo_and_redo() {
    let mut session = session();
    session
        .load(r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"Hello world"}]}]}"#)
        .unwrap();
    let original = session.current_doc();

    let bolded = session
        .apply_command(Command::ToggleMark {
            path: NodePath::from([0]),
            from: 0,
            to: 5,
            mark: Mark::new("bold"),
        })
        .unwrap();
    let expected = Node::doc(vec![Node::paragraph(vec![
        Node::marked_text("Hello", vec![Mark::new("bold")]),
        Node::text(" world"),
    ])]);
    assert_eq!(*bolded, expected);
    assert_eq!(session.history().undo_description(), Some("toggle mark"));

    assert_eq!(session.undo().unwrap(), original);
    assert!(session.can_redo());
    assert_eq!(*session.redo().unwrap(), expected);
    assert!(!session.can_redo());
}

#[test]
fn test_load_save_round_trip() {
    let mut session = session();
    let persisted = r#"{"type":"doc","content":[{"type":"heading","attrs":{"level":2},"content":[{"type":"text","text":"Plan"}]},{"type":"mermaidDiagram","attrs":{"source":"graph TD\nA-->B"}}]}"#;
    let loaded = session.load(persisted).unwrap();

    let saved = session.save().unwrap();
    let mut other = self::session();
    assert_eq!(other.load(&saved).unwrap(), loaded);
    assert!(!other.can_undo());
}

struct AlwaysValid;

#[async_trait]
impl ValidationService for AlwaysValid {
    async fn validate(
        &self,
        _request: ValidationRequest,
    ) -> Result<ValidationResponse, ValidationServiceError> {
        Ok(ValidationResponse::valid())
    }
}

#[tokio::test(start_paused = true)]
async fn test_diagram_edit_lands_in_session() {
    let mut session = session();
    session
        .load(r#"{"type":"doc","content":[{"type":"mermaidDiagram","attrs":{"source":"graph TD\nA-->B"}}]}"#)
        .unwrap();
    let (ctx, mut receivers) = ExtensionContext::channel();
    let config = EditorConfig::default();
    let mut view = DiagramView::new(
        NodePath::from([0]),
        "graph TD\nA-->B",
        ctx,
        Arc::new(FlowchartRenderer),
        Arc::new(AlwaysValid),
        &config,
    );

    view.input("graph LR\nA-->B-->C");
    tokio::time::sleep(config.debounce() + Duration::from_millis(50)).await;

    assert_eq!(session.apply_pending(&mut receivers.commands), 1);
    let doc = session.current_doc();
    assert_eq!(
        attr_at(&doc, &NodePath::from([0]), "source"),
        Some(&AttrValue::from("graph LR\nA-->B-->C"))
    );
    assert_eq!(view.snapshot().validation, ValidationStatus::Valid);

    // Undo restores the node; the view follows the tree
    let restored = session.undo().unwrap();
    let source = attr_at(&restored, &NodePath::from([0]), "source")
        .and_then(AttrValue::as_str)
        .unwrap()
        .to_string();
    view.node_updated(&source);
    assert_eq!(view.snapshot().committed, "graph TD\nA-->B");
}

#[test]
fn test_external_editor_save_updates_node() {
    let mut session = session();
    session
        .load(r#"{"type":"doc","content":[{"type":"drawioDiagram","attrs":{"xml":""}}]}"#)
        .unwrap();
    let (ctx, mut receivers) = ExtensionContext::channel();
    let config = EditorConfig::default();

    let view = ExternalDiagramView::new(NodePath::from([0]), "", ctx.clone());
    assert!(view.is_empty());
    view.request_edit().unwrap();

    let request = receivers.bridge_requests.try_recv().unwrap();
    assert_eq!(request.node_type, "drawioDiagram");
    let mut bridge = Bridge::from_config(request, &config, ctx, "xml");
    bridge.receive(ORIGIN, r#"{"event":"init"}"#);
    bridge.receive(ORIGIN, r#"{"event":"save","xml":"<mxfile><diagram/></mxfile>"}"#);
    assert_eq!(bridge.state(), BridgeState::Open);

    assert_eq!(session.apply_pending(&mut receivers.commands), 1);
    assert_eq!(
        attr_at(&session.current_doc(), &NodePath::from([0]), "xml"),
        Some(&AttrValue::from("<mxfile><diagram/></mxfile>"))
    );

    bridge.receive(ORIGIN, r#"{"event":"exit"}"#);
    assert_eq!(bridge.state(), BridgeState::Closed);
    assert_eq!(session.apply_pending(&mut receivers.commands), 0);
}

#[test]
fn test_commands_fill_attribute_defaults() {
    let mut session = session();
    session
        .load(r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"see docs"}]}]}"#)
        .unwrap();

    let doc = session
        .apply_command(Command::InsertNode {
            parent: NodePath::root(),
            index: 1,
            node: Element::new("mermaidDiagram").into(),
        })
        .unwrap();
    assert_eq!(
        attr_at(&doc, &NodePath::from([1]), "source"),
        Some(&AttrValue::from("graph TD\nA-->B"))
    );

    let doc = session
        .apply_command(Command::InsertNode {
            parent: NodePath::root(),
            index: 0,
            node: Element::new("heading")
                .with_content(vec![Node::text("Intro")])
                .into(),
        })
        .unwrap();
    assert_eq!(attr_at(&doc, &NodePath::from([0]), "level"), Some(&AttrValue::Integer(1)));

    let doc = session
        .apply_command(Command::ToggleMark {
            path: NodePath::from([1]),
            from: 4,
            to: 8,
            mark: Mark::new("link").with_attr("href", "https://example.com"),
        })
        .unwrap();
    let link = Mark::new("link")
        .with_attr("href", "https://example.com")
        .with_attr("target", "_blank")
        .with_attr("title", AttrValue::Null);
    assert_eq!(
        doc.content()[1],
        Node::paragraph(vec![Node::text("see "), Node::marked_text("docs", vec![link])])
    );
    assert!(session.save().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_diagram_commit_follows_moved_node() {
    let mut session = session();
    session
        .load(r#"{"type":"doc","content":[{"type":"mermaidDiagram","attrs":{"source":"graph TD\nA-->B"}},{"type":"mermaidDiagram","attrs":{"source":"graph TD\nC-->D"}}]}"#)
        .unwrap();
    let (ctx, mut receivers) = ExtensionContext::channel();
    let config = EditorConfig::default();
    let mut view = DiagramView::new(
        NodePath::from([1]),
        "graph TD\nC-->D",
        ctx,
        Arc::new(FlowchartRenderer),
        Arc::new(AlwaysValid),
        &config,
    );
    view.input("graph TD\nC-->E");

    // A block lands above both diagrams while the edit is debouncing
    let insert = Command::InsertNode {
        parent: NodePath::root(),
        index: 0,
        node: Node::paragraph(vec![Node::text("note")]),
    };
    session.apply_command(insert.clone()).unwrap();
    if let Some(moved) = insert.map_path(&view.path()) {
        view.set_path(moved);
    }

    tokio::time::sleep(config.debounce() + Duration::from_millis(50)).await;
    assert_eq!(session.apply_pending(&mut receivers.commands), 1);
    let doc = session.current_doc();
    assert_eq!(
        attr_at(&doc, &NodePath::from([1]), "source"),
        Some(&AttrValue::from("graph TD\nA-->B"))
    );
    assert_eq!(
        attr_at(&doc, &NodePath::from([2]), "source"),
        Some(&AttrValue::from("graph TD\nC-->E"))
    );
}

#[test]
fn test_stale_commit_to_other_node_type_is_rejected() {
    let mut session = session();
    let mut attrs = folio_core::Attrs::new();
    attrs.insert("source".into(), AttrValue::from("graph TD\nX-->Y"));
    let err = session
        .apply_command(Command::UpdateAttrs {
            path: NodePath::from([0]),
            attrs,
            node_type: Some("mermaidDiagram".into()),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        EditorError::Command(CommandError::TypeMismatch { ref found, .. }) if found == "paragraph"
    ));
    assert!(!session.can_undo());
}
