// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document tree: element nodes, text runs and marks
//!
//! The tree is format-neutral. Element nodes carry a type tag, attributes and
//! ordered children; text runs carry a string and an ordered set of marks.
//! Marks only ever live on text runs, so they cannot straddle a structural
//! boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use unicode_segmentation::UnicodeSegmentation;

/// Type tag of the document root
pub const DOC_TYPE: &str = "doc";

/// Type tag used for text runs
pub const TEXT_TYPE: &str = "text";

/// Attribute value (node and mark attributes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// Finite only. JSON has no NaN or infinity, so build these through
    /// [`AttrValue::float`]; schema validation rejects non-finite values.
    Float(f64),
    String(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// `None` for NaN and infinities
    pub fn float(value: f64) -> Option<Self> {
        value.is_finite().then_some(AttrValue::Float(value))
    }

    pub fn is_finite(&self) -> bool {
        !matches!(self, AttrValue::Float(x) if !x.is_finite())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Short name of the value's kind, used in violation messages
    pub const fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Integer(_) => "integer",
            AttrValue::Float(_) => "float",
            AttrValue::String(_) => "string",
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Integer(i)
    }
}

impl TryFrom<f64> for AttrValue {
    type Error = f64;

    fn try_from(value: f64) -> Result<Self, f64> {
        AttrValue::float(value).ok_or(value)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttrValue::Null, Into::into)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("null"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Integer(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::String(s) => f.write_str(s),
        }
    }
}

/// Attribute map. Ordered so that equality and serialization are stable.
pub type Attrs = BTreeMap<String, AttrValue>;

/// Inline annotation attached to a text run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl Mark {
    pub fn new(mark_type: impl Into<String>) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs: Attrs::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// Structural node with a type tag, attributes and children
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub node_type: String,
    pub attrs: Attrs,
    pub content: Vec<Node>,
}

impl Element {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            attrs: Attrs::new(),
            content: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_content(mut self, content: Vec<Node>) -> Self {
        self.content = content;
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }
}

/// Leaf text with its mark set
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub marks: Vec<Mark>,
}

impl TextRun {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn has_mark(&self, mark_type: &str) -> bool {
        self.marks.iter().any(|m| m.mark_type == mark_type)
    }
}

/// A node in the document tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(TextRun),
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<TextRun> for Node {
    fn from(run: TextRun) -> Self {
        Node::Text(run)
    }
}

impl Node {
    /// Plain text run without marks
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextRun::new(text))
    }

    /// Text run carrying the given marks (in the order given)
    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Node::Text(TextRun {
            text: text.into(),
            marks,
        })
    }

    /// Document root with the given block children
    pub fn doc(content: Vec<Node>) -> Self {
        Element::new(DOC_TYPE).with_content(content).into()
    }

    /// Paragraph with the given inline children
    pub fn paragraph(content: Vec<Node>) -> Self {
        Element::new("paragraph").with_content(content).into()
    }

    /// The default document: a single empty paragraph
    pub fn empty_doc() -> Self {
        Node::doc(vec![Node::paragraph(Vec::new())])
    }

    pub fn node_type(&self) -> &str {
        match self {
            Node::Element(el) => &el.node_type,
            Node::Text(_) => TEXT_TYPE,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextRun> {
        match self {
            Node::Text(run) => Some(run),
            Node::Element(_) => None,
        }
    }

    /// Children of an element; empty for text runs
    pub fn content(&self) -> &[Node] {
        match self {
            Node::Element(el) => &el.content,
            Node::Text(_) => &[],
        }
    }

    /// Resolve a path from this node
    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        path.indices()
            .iter()
            .try_fold(self, |node, &i| node.content().get(i))
    }

    /// Resolve a path from this node for mutation
    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut node = self;
        for &i in path.indices() {
            node = node.as_element_mut()?.content.get_mut(i)?;
        }
        Some(node)
    }

    /// Concatenated text of all descendant runs
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(run) => out.push_str(&run.text),
            Node::Element(el) => el.content.iter().for_each(|c| c.collect_text(out)),
        }
    }

    /// Count words in this subtree
    pub fn word_count(&self) -> usize {
        match self {
            Node::Text(run) => run.text.unicode_words().count(),
            Node::Element(el) => el.content.iter().map(Node::word_count).sum(),
        }
    }

    /// Count user-perceived characters in this subtree
    pub fn char_count(&self) -> usize {
        match self {
            Node::Text(run) => run.text.graphemes(true).count(),
            Node::Element(el) => el.content.iter().map(Node::char_count).sum(),
        }
    }
}

/// Location of a node: child indices walked from the document root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Parent path and this node's index within it
    pub fn split_last(&self) -> Option<(NodePath, usize)> {
        let (&last, rest) = self.0.split_last()?;
        Some((NodePath(rest.to_vec()), last))
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl<const N: usize> From<[usize; N]> for NodePath {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.to_vec())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for i in &self.0 {
            write!(f, "/{i}")?;
        }
        Ok(())
    }
}
