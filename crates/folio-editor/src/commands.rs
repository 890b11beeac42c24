// SPDX-License-Identifier: AGPL-3.0-or-later
//! Editing commands
//!
//! A command is a pure function from a tree to a new tree. Text commands
//! address an inline container (paragraph, heading, code block) and count
//! offsets in characters over its content; every inline leaf node such as a
//! hard break occupies one position.

use crate::error::CommandError;
use folio_core::{AttrValue, Attrs, Element, Mark, Node, NodePath, Schema, TextRun};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InsertNode {
        parent: NodePath,
        index: usize,
        node: Node,
    },
    RemoveNode {
        path: NodePath,
    },
    ReplaceNode {
        path: NodePath,
        node: Node,
    },
    /// Merge `attrs` into the element's attributes. With `node_type` set
    /// the target must be of that type.
    UpdateAttrs {
        path: NodePath,
        attrs: Attrs,
        node_type: Option<String>,
    },
    InsertText {
        path: NodePath,
        offset: usize,
        text: String,
    },
    DeleteText {
        path: NodePath,
        from: usize,
        to: usize,
    },
    /// Remove `mark` from the range if every character carries it, add it otherwise
    ToggleMark {
        path: NodePath,
        from: usize,
        to: usize,
        mark: Mark,
    },
}

impl Command {
    /// Single-attribute update
    pub fn set_attr(path: NodePath, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert(key.into(), value.into());
        Command::UpdateAttrs {
            path,
            attrs,
            node_type: None,
        }
    }

    /// Where the node at `path` sits after this command, or `None` when the
    /// command removed or replaced it
    pub fn map_path(&self, path: &NodePath) -> Option<NodePath> {
        match self {
            Command::InsertNode { parent, index, .. } => Some(shift_sibling(path, parent, *index, 1)),
            Command::RemoveNode { path: removed } => {
                if path.indices().starts_with(removed.indices()) {
                    return None;
                }
                let (parent, index) = removed.split_last()?;
                Some(shift_sibling(path, &parent, index + 1, -1))
            }
            Command::ReplaceNode { path: replaced, .. } => {
                (!path.indices().starts_with(replaced.indices())).then(|| path.clone())
            }
            // Inline content is regrouped
            Command::InsertText { path: container, .. }
            | Command::DeleteText { path: container, .. }
            | Command::ToggleMark { path: container, .. } => {
                let inside = path.indices().len() > container.indices().len()
                    && path.indices().starts_with(container.indices());
                (!inside).then(|| path.clone())
            }
            Command::UpdateAttrs { .. } => Some(path.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::InsertNode { .. } => "insert node",
            Command::RemoveNode { .. } => "remove node",
            Command::ReplaceNode { .. } => "replace node",
            Command::UpdateAttrs { .. } => "update attributes",
            Command::InsertText { .. } => "insert text",
            Command::DeleteText { .. } => "delete text",
            Command::ToggleMark { .. } => "toggle mark",
        }
    }

    /// Produce the tree resulting from this command. `doc` is untouched.
    /// Schema validity of the result is checked by the session.
    pub fn apply(&self, doc: &Node, schema: &Schema) -> Result<Node, CommandError> {
        let mut next = doc.clone();
        match self {
            Command::InsertNode {
                parent,
                index,
                node,
            } => {
                let el = element_mut(&mut next, parent)?;
                if *index > el.content.len() {
                    return Err(CommandError::IndexOutOfBounds {
                        path: parent.clone(),
                        index: *index,
                        len: el.content.len(),
                    });
                }
                let mut node = node.clone();
                schema.fill_defaults(&mut node);
                el.content.insert(*index, node);
            }

            Command::RemoveNode { path } => {
                let (parent, index) = path.split_last().ok_or(CommandError::RootRemoval)?;
                let el = element_mut(&mut next, &parent)?;
                if index >= el.content.len() {
                    return Err(CommandError::InvalidPath(path.clone()));
                }
                el.content.remove(index);
            }

            Command::ReplaceNode { path, node } => {
                let slot = next
                    .get_mut(path)
                    .ok_or_else(|| CommandError::InvalidPath(path.clone()))?;
                *slot = node.clone();
                schema.fill_defaults(slot);
            }

            Command::UpdateAttrs {
                path,
                attrs,
                node_type,
            } => {
                let el = element_mut(&mut next, path)?;
                if let Some(expected) = node_type {
                    if el.node_type != *expected {
                        return Err(CommandError::TypeMismatch {
                            path: path.clone(),
                            expected: expected.clone(),
                            found: el.node_type.clone(),
                        });
                    }
                }
                el.attrs
                    .extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            Command::InsertText { path, offset, text } => {
                let el = element_mut(&mut next, path)?;
                let mut segments = flatten(&el.content);
                check_range(path, *offset, *offset, segments.len())?;
                let marks = match offset.checked_sub(1).map(|i| &segments[i]) {
                    Some(Segment::Char(_, marks)) => marks.clone(),
                    _ => Vec::new(),
                };
                let inserted = text.chars().map(|c| Segment::Char(c, marks.clone()));
                segments.splice(*offset..*offset, inserted);
                el.content = rebuild(segments);
            }

            Command::DeleteText { path, from, to } => {
                let el = element_mut(&mut next, path)?;
                let mut segments = flatten(&el.content);
                check_range(path, *from, *to, segments.len())?;
                segments.drain(*from..*to);
                el.content = rebuild(segments);
            }

            Command::ToggleMark {
                path,
                from,
                to,
                mark,
            } => {
                let mut mark = mark.clone();
                schema.fill_mark_defaults(&mut mark);
                let el = element_mut(&mut next, path)?;
                let mut segments = flatten(&el.content);
                check_range(path, *from, *to, segments.len())?;
                let range = &mut segments[*from..*to];
                let has_mark =
                    |marks: &[Mark]| marks.iter().any(|m| m.mark_type == mark.mark_type);
                let remove = range.iter().any(|s| matches!(s, Segment::Char(..)))
                    && range.iter().all(|s| match s {
                        Segment::Char(_, marks) => has_mark(marks),
                        Segment::Inline(_) => true,
                    });
                for segment in range.iter_mut() {
                    if let Segment::Char(_, marks) = segment {
                        marks.retain(|m| m.mark_type != mark.mark_type);
                        if !remove {
                            marks.push(mark.clone());
                            *marks = schema.sort_marks(std::mem::take(marks));
                        }
                    }
                }
                el.content = rebuild(segments);
            }
        }
        Ok(next)
    }
}

fn element_mut<'a>(doc: &'a mut Node, path: &NodePath) -> Result<&'a mut Element, CommandError> {
    doc.get_mut(path)
        .ok_or_else(|| CommandError::InvalidPath(path.clone()))?
        .as_element_mut()
        .ok_or_else(|| CommandError::NotAnElement(path.clone()))
}

/// Move siblings of `parent` at or after `from` by `delta`
fn shift_sibling(path: &NodePath, parent: &NodePath, from: usize, delta: isize) -> NodePath {
    let depth = parent.indices().len();
    let mut indices = path.indices().to_vec();
    if indices.len() > depth && indices.starts_with(parent.indices()) && indices[depth] >= from {
        indices[depth] = indices[depth].saturating_add_signed(delta);
    }
    NodePath::from(indices)
}

fn check_range(path: &NodePath, from: usize, to: usize, len: usize) -> Result<(), CommandError> {
    if from > to || to > len {
        return Err(CommandError::InvalidRange {
            path: path.clone(),
            from,
            to,
            len,
        });
    }
    Ok(())
}

enum Segment {
    Char(char, Vec<Mark>),
    Inline(Node),
}

fn flatten(content: &[Node]) -> Vec<Segment> {
    let mut out = Vec::new();
    for node in content {
        match node {
            Node::Text(run) => out.extend(run.text.chars().map(|c| Segment::Char(c, run.marks.clone()))),
            Node::Element(_) => out.push(Segment::Inline(node.clone())),
        }
    }
    out
}

/// Regroup characters into runs; adjacent characters with equal marks share a run
fn rebuild(segments: Vec<Segment>) -> Vec<Node> {
    let mut out = Vec::new();
    let mut run: Option<TextRun> = None;
    for segment in segments {
        match segment {
            Segment::Char(c, marks) => match run.as_mut() {
                Some(current) if current.marks == marks => current.text.push(c),
                _ => {
                    let next = TextRun {
                        text: c.to_string(),
                        marks,
                    };
                    out.extend(run.replace(next).map(Node::Text));
                }
            },
            Segment::Inline(node) => {
                out.extend(run.take().map(Node::Text));
                out.push(node);
            }
        }
    }
    out.extend(run.map(Node::Text));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(content: Vec<Node>) -> Node {
        Node::doc(vec![Node::paragraph(content)])
    }

    fn para() -> NodePath {
        NodePath::from([0])
    }

    #[test]
    fn test_insert_text_inherits_marks() {
        let schema = Schema::standard();
        let before = doc(vec![
            Node::marked_text("bold", vec![Mark::new("bold")]),
            Node::text(" plain"),
        ]);
        let cmd = Command::InsertText {
            path: para(),
            offset: 4,
            text: "er".into(),
        };
        let after = cmd.apply(&before, &schema).unwrap();
        assert_eq!(
            after,
            doc(vec![
                Node::marked_text("bolder", vec![Mark::new("bold")]),
                Node::text(" plain"),
            ])
        );
    }

    #[test]
    fn test_delete_across_runs() {
        let schema = Schema::standard();
        let before = doc(vec![
            Node::marked_text("ab", vec![Mark::new("italic")]),
            Node::text("cd"),
        ]);
        let cmd = Command::DeleteText {
            path: para(),
            from: 1,
            to: 3,
        };
        assert_eq!(
            cmd.apply(&before, &schema).unwrap(),
            doc(vec![
                Node::marked_text("a", vec![Mark::new("italic")]),
                Node::text("d"),
            ])
        );
    }

    #[test]
    fn test_toggle_mark_keeps_rank_order() {
        let schema = Schema::standard();
        let before = doc(vec![Node::marked_text("word", vec![Mark::new("italic")])]);
        let bold = Command::ToggleMark {
            path: para(),
            from: 0,
            to: 4,
            mark: Mark::new("bold"),
        };
        let after = bold.apply(&before, &schema).unwrap();
        assert_eq!(
            after,
            doc(vec![Node::marked_text(
                "word",
                vec![Mark::new("bold"), Mark::new("italic")]
            )])
        );
        assert_eq!(bold.apply(&after, &schema).unwrap(), before);
    }

    #[test]
    fn test_hard_break_counts_one_position() {
        let schema = Schema::standard();
        let before = doc(vec![
            Node::text("a"),
            Element::new("hardBreak").into(),
            Node::text("b"),
        ]);
        let cmd = Command::InsertText {
            path: para(),
            offset: 2,
            text: "x".into(),
        };
        assert_eq!(
            cmd.apply(&before, &schema).unwrap(),
            doc(vec![
                Node::text("a"),
                Element::new("hardBreak").into(),
                Node::text("xb"),
            ])
        );
    }

    #[test]
    fn test_structural_commands() {
        let schema = Schema::standard();
        let start = doc(vec![Node::text("one")]);
        let inserted = Command::InsertNode {
            parent: NodePath::root(),
            index: 1,
            node: Element::new("horizontalRule").into(),
        }
        .apply(&start, &schema)
        .unwrap();
        assert_eq!(inserted.content().len(), 2);

        let removed = Command::RemoveNode {
            path: NodePath::from([1]),
        }
        .apply(&inserted, &schema)
        .unwrap();
        assert_eq!(removed, start);

        let updated = Command::set_attr(NodePath::from([1]), "note", "x")
            .apply(&inserted, &schema)
            .unwrap();
        assert_eq!(
            updated.content()[1].as_element().unwrap().attrs["note"],
            AttrValue::from("x")
        );
    }

    #[test]
    fn test_inserted_nodes_get_defaults() {
        let schema = Schema::standard();
        let start = doc(vec![Node::text("one")]);
        let after = Command::InsertNode {
            parent: NodePath::root(),
            index: 0,
            node: Element::new("heading")
                .with_content(vec![Node::text("Title")])
                .into(),
        }
        .apply(&start, &schema)
        .unwrap();
        assert_eq!(
            after.content()[0].as_element().unwrap().attr("level"),
            Some(&AttrValue::Integer(1))
        );

        let replaced = Command::ReplaceNode {
            path: NodePath::from([1]),
            node: Element::new("mermaidDiagram").into(),
        }
        .apply(&after, &schema)
        .unwrap();
        assert!(replaced.content()[1]
            .as_element()
            .unwrap()
            .attr("source")
            .is_some());
    }

    #[test]
    fn test_toggled_mark_gets_defaults() {
        let schema = Schema::standard();
        let before = doc(vec![Node::text("site")]);
        let after = Command::ToggleMark {
            path: para(),
            from: 0,
            to: 4,
            mark: Mark::new("link").with_attr("href", "https://example.com"),
        }
        .apply(&before, &schema)
        .unwrap();
        let run = after.get(&NodePath::from([0, 0])).and_then(Node::as_text).unwrap();
        assert_eq!(run.marks[0].attrs["target"], AttrValue::from("_blank"));
        assert_eq!(run.marks[0].attrs["title"], AttrValue::Null);
    }

    #[test]
    fn test_update_attrs_type_guard() {
        let schema = Schema::standard();
        let start = doc(vec![Node::text("one")]);
        let mut attrs = Attrs::new();
        attrs.insert("source".into(), "graph TD".into());
        assert_eq!(
            Command::UpdateAttrs {
                path: para(),
                attrs,
                node_type: Some("mermaidDiagram".into()),
            }
            .apply(&start, &schema),
            Err(CommandError::TypeMismatch {
                path: para(),
                expected: "mermaidDiagram".into(),
                found: "paragraph".into(),
            })
        );
    }

    #[test]
    fn test_map_path() {
        let at = |i: usize| NodePath::from([i]);
        let insert = Command::InsertNode {
            parent: NodePath::root(),
            index: 1,
            node: Node::paragraph(vec![]),
        };
        assert_eq!(insert.map_path(&at(0)), Some(at(0)));
        assert_eq!(insert.map_path(&at(1)), Some(at(2)));
        assert_eq!(insert.map_path(&NodePath::from([3, 0])), Some(NodePath::from([4, 0])));

        let remove = Command::RemoveNode { path: at(1) };
        assert_eq!(remove.map_path(&at(0)), Some(at(0)));
        assert_eq!(remove.map_path(&at(1)), None);
        assert_eq!(remove.map_path(&NodePath::from([1, 2])), None);
        assert_eq!(remove.map_path(&at(2)), Some(at(1)));

        let replace = Command::ReplaceNode {
            path: at(2),
            node: Node::paragraph(vec![]),
        };
        assert_eq!(replace.map_path(&at(2)), None);
        assert_eq!(replace.map_path(&at(3)), Some(at(3)));

        let text = Command::InsertText {
            path: at(0),
            offset: 0,
            text: "x".into(),
        };
        assert_eq!(text.map_path(&at(0)), Some(at(0)));
        assert_eq!(text.map_path(&NodePath::from([0, 1])), None);
    }

    #[test]
    fn test_invalid_targets() {
        let schema = Schema::standard();
        let start = doc(vec![Node::text("one")]);
        assert_eq!(
            Command::RemoveNode {
                path: NodePath::root()
            }
            .apply(&start, &schema),
            Err(CommandError::RootRemoval)
        );
        assert_eq!(
            Command::DeleteText {
                path: para(),
                from: 2,
                to: 9
            }
            .apply(&start, &schema),
            Err(CommandError::InvalidRange {
                path: para(),
                from: 2,
                to: 9,
                len: 3
            })
        );
        assert_eq!(
            Command::InsertText {
                path: NodePath::from([0, 0]),
                offset: 0,
                text: "x".into()
            }
            .apply(&start, &schema),
            Err(CommandError::NotAnElement(NodePath::from([0, 0])))
        );
        assert_eq!(
            Command::InsertNode {
                parent: NodePath::from([4]),
                index: 0,
                node: Node::paragraph(vec![])
            }
            .apply(&start, &schema),
            Err(CommandError::InvalidPath(NodePath::from([4])))
        );
    }
}
