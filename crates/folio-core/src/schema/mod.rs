// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema registry
//!
//! Declares every node and mark type a document may contain and checks trees
//! against those declarations. Node types are plain data resolved by name;
//! nothing about a type lives in the tree itself beyond its tag.

mod basic;
pub mod content;

pub use content::{ChildLabel, ContentExpr, ContentExprError, MatchState};

use crate::model::{AttrValue, Attrs, Element, Mark, Node, NodePath, TextRun, DOC_TYPE, TEXT_TYPE};
use std::collections::{BTreeMap, HashMap};

/// Upper bound on nesting when synthesizing required children
const MAX_FILL_DEPTH: usize = 16;

/// Value shape accepted by an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttrKind {
    Any,
    String,
    /// String or null
    OptionalString,
    Bool,
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    /// One of a fixed set of strings
    OneOf(Vec<String>),
    /// String, integer or null (opaque handles and dimensions)
    Scalar,
}

impl AttrKind {
    pub fn accepts(&self, value: &AttrValue) -> bool {
        match (self, value) {
            (_, value) if !value.is_finite() => false,
            (AttrKind::Any, _) => true,
            (AttrKind::String, AttrValue::String(_)) => true,
            (AttrKind::OptionalString, AttrValue::String(_) | AttrValue::Null) => true,
            (AttrKind::Bool, AttrValue::Bool(_)) => true,
            (AttrKind::Integer { min, max }, AttrValue::Integer(i)) => {
                min.map_or(true, |m| *i >= m) && max.map_or(true, |m| *i <= m)
            }
            (AttrKind::OneOf(options), AttrValue::String(s)) => options.iter().any(|o| o == s),
            (
                AttrKind::Scalar,
                AttrValue::String(_) | AttrValue::Integer(_) | AttrValue::Null,
            ) => true,
            _ => false,
        }
    }

    pub fn one_of(options: &[&str]) -> Self {
        AttrKind::OneOf(options.iter().map(|o| (*o).to_string()).collect())
    }
}

/// Attribute contract: value kind plus an optional default.
/// An attribute without a default is required.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSpec {
    pub default: Option<AttrValue>,
    pub kind: AttrKind,
}

impl AttrSpec {
    pub fn required(kind: AttrKind) -> Self {
        Self {
            default: None,
            kind,
        }
    }

    pub fn with_default(kind: AttrKind, default: impl Into<AttrValue>) -> Self {
        Self {
            default: Some(default.into()),
            kind,
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declaration of a node type
#[derive(Debug, Clone)]
pub struct NodeTypeSpec {
    pub name: String,
    /// Content expression; empty means no children
    pub content: String,
    pub groups: Vec<String>,
    pub attrs: BTreeMap<String, AttrSpec>,
    pub atomic: bool,
    pub inline: bool,
    /// Marks allowed on text inside this node; `None` allows all
    pub marks: Option<Vec<String>>,
}

impl NodeTypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: String::new(),
            groups: Vec::new(),
            attrs: BTreeMap::new(),
            atomic: false,
            inline: false,
            marks: None,
        }
    }

    pub fn content(mut self, expr: impl Into<String>) -> Self {
        self.content = expr.into();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, spec: AttrSpec) -> Self {
        self.attrs.insert(name.into(), spec);
        self
    }

    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn allow_marks(mut self, marks: &[&str]) -> Self {
        self.marks = Some(marks.iter().map(|m| (*m).to_string()).collect());
        self
    }

    pub fn allows_mark(&self, mark: &str) -> bool {
        self.marks
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|m| m == mark))
    }
}

/// Declaration of a mark type. Registration order defines rank.
#[derive(Debug, Clone)]
pub struct MarkSpec {
    pub name: String,
    pub attrs: BTreeMap<String, AttrSpec>,
}

impl MarkSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, spec: AttrSpec) -> Self {
        self.attrs.insert(name.into(), spec);
        self
    }
}

/// Error raised while building a schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("node type `{0}` is already registered")]
    DuplicateNodeType(String),

    #[error("mark `{0}` is already registered")]
    DuplicateMark(String),

    #[error("content expression of `{node_type}`: {source}")]
    InvalidContent {
        node_type: String,
        source: ContentExprError,
    },

    #[error("fallback type `{0}` is not registered")]
    UnknownFallback(String),
}

/// What is wrong with a node
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViolationKind {
    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),

    #[error("unknown mark `{0}`")]
    UnknownMark(String),

    #[error("children [{}] of `{node_type}` do not match `{expected}`", .found.join(", "))]
    ContentMismatch {
        node_type: String,
        expected: String,
        found: Vec<String>,
    },

    #[error("atomic node `{0}` has children")]
    AtomicHasChildren(String),

    #[error("invalid attribute `{attr}` on `{owner}`: {reason}")]
    InvalidAttribute {
        owner: String,
        attr: String,
        reason: String,
    },

    #[error("missing attribute `{attr}` on `{owner}`")]
    MissingAttribute { owner: String, attr: String },

    #[error("mark `{mark}` is not allowed in `{node_type}`")]
    MarkNotAllowed { mark: String, node_type: String },

    #[error("text is not allowed in `{0}`")]
    TextOutsideInline(String),

    #[error("root node is `{0}`, expected `doc`")]
    RootNotDoc(String),

    #[error("empty text run")]
    EmptyText,

    #[error("marks [{}] are duplicated or out of order", .0.join(", "))]
    UnorderedMarks(Vec<String>),
}

/// A violation located in the tree
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {kind}")]
pub struct SchemaViolation {
    pub path: NodePath,
    pub kind: ViolationKind,
}

impl SchemaViolation {
    pub fn new(path: NodePath, kind: ViolationKind) -> Self {
        Self { path, kind }
    }
}

#[derive(Debug, Clone)]
struct NodeType {
    spec: NodeTypeSpec,
    expr: ContentExpr,
}

#[derive(Debug, Clone)]
struct Fallback {
    node_type: String,
    label_attr: String,
}

/// Registry of node and mark types
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: Vec<NodeType>,
    type_index: HashMap<String, usize>,
    marks: Vec<MarkSpec>,
    mark_index: HashMap<String, usize>,
    fallback: Option<Fallback>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(&mut self, spec: NodeTypeSpec) -> Result<(), SchemaError> {
        if self.type_index.contains_key(&spec.name) {
            return Err(SchemaError::DuplicateNodeType(spec.name));
        }
        let expr = ContentExpr::parse(&spec.content).map_err(|source| SchemaError::InvalidContent {
            node_type: spec.name.clone(),
            source,
        })?;
        tracing::debug!(node_type = %spec.name, content = %spec.content, "registered node type");
        self.type_index.insert(spec.name.clone(), self.types.len());
        self.types.push(NodeType { spec, expr });
        Ok(())
    }

    pub fn register_mark(&mut self, spec: MarkSpec) -> Result<(), SchemaError> {
        if self.mark_index.contains_key(&spec.name) {
            return Err(SchemaError::DuplicateMark(spec.name));
        }
        tracing::debug!(mark = %spec.name, rank = self.marks.len(), "registered mark");
        self.mark_index.insert(spec.name.clone(), self.marks.len());
        self.marks.push(spec);
        Ok(())
    }

    /// Node type substituted for unknown node types during normalization.
    /// `label_attr` receives the unknown type's name.
    pub fn set_fallback(
        &mut self,
        node_type: impl Into<String>,
        label_attr: impl Into<String>,
    ) -> Result<(), SchemaError> {
        let node_type = node_type.into();
        if !self.type_index.contains_key(&node_type) {
            return Err(SchemaError::UnknownFallback(node_type));
        }
        self.fallback = Some(Fallback {
            node_type,
            label_attr: label_attr.into(),
        });
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&NodeType> {
        self.type_index.get(name).map(|&i| &self.types[i])
    }

    pub fn node_spec(&self, name: &str) -> Option<&NodeTypeSpec> {
        self.lookup(name).map(|t| &t.spec)
    }

    pub fn content_expr(&self, name: &str) -> Option<&ContentExpr> {
        self.lookup(name).map(|t| &t.expr)
    }

    pub fn node_specs(&self) -> impl Iterator<Item = &NodeTypeSpec> {
        self.types.iter().map(|t| &t.spec)
    }

    pub fn mark_spec(&self, name: &str) -> Option<&MarkSpec> {
        self.mark_index.get(name).map(|&i| &self.marks[i])
    }

    pub fn mark_rank(&self, name: &str) -> Option<usize> {
        self.mark_index.get(name).copied()
    }

    pub fn mark_specs(&self) -> impl Iterator<Item = &MarkSpec> {
        self.marks.iter()
    }

    pub fn is_atomic(&self, name: &str) -> bool {
        self.node_spec(name).is_some_and(|s| s.atomic)
    }

    /// Text runs are always inline; elements are inline when their type says so
    pub fn is_inline(&self, node: &Node) -> bool {
        match node {
            Node::Text(_) => true,
            Node::Element(el) => self.node_spec(&el.node_type).is_some_and(|s| s.inline),
        }
    }

    fn label<'a>(&'a self, node: &'a Node) -> ChildLabel<'a> {
        let name = node.node_type();
        let groups = self.node_spec(name).map_or(&[][..], |s| s.groups.as_slice());
        ChildLabel { name, groups }
    }

    fn label_admits(&self, label: &str, pred: impl Fn(&NodeTypeSpec) -> bool) -> bool {
        self.types
            .iter()
            .any(|t| pred(&t.spec) && (t.spec.name == label || t.spec.groups.iter().any(|g| g == label)))
    }

    fn accepts_text(&self, expr: &ContentExpr) -> bool {
        expr.labels()
            .iter()
            .any(|l| l == TEXT_TYPE || self.label_admits(l, |s| s.name == TEXT_TYPE))
    }

    fn accepts_inline(&self, expr: &ContentExpr) -> bool {
        expr.labels()
            .iter()
            .any(|l| l == TEXT_TYPE || self.label_admits(l, |s| s.inline))
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check a document against the schema. Pure.
    pub fn validate(&self, doc: &Node) -> Result<(), Vec<SchemaViolation>> {
        let mut out = Vec::new();
        if doc.node_type() != DOC_TYPE || doc.as_element().is_none() {
            out.push(SchemaViolation::new(
                NodePath::root(),
                ViolationKind::RootNotDoc(doc.node_type().to_string()),
            ));
        } else {
            self.check(doc, None, &NodePath::root(), &mut out);
        }
        if out.is_empty() {
            Ok(())
        } else {
            Err(out)
        }
    }

    /// Check any subtree. `path` locates `node` in its document.
    pub fn validate_node(&self, node: &Node, path: &NodePath) -> Vec<SchemaViolation> {
        let mut out = Vec::new();
        self.check(node, None, path, &mut out);
        out
    }

    fn check(
        &self,
        node: &Node,
        parent: Option<&NodeTypeSpec>,
        path: &NodePath,
        out: &mut Vec<SchemaViolation>,
    ) {
        match node {
            Node::Text(run) => self.check_text(run, parent, path, out),
            Node::Element(el) => self.check_element(el, path, out),
        }
    }

    fn check_element(&self, el: &Element, path: &NodePath, out: &mut Vec<SchemaViolation>) {
        let Some(ty) = self.lookup(&el.node_type) else {
            out.push(SchemaViolation::new(
                path.clone(),
                ViolationKind::UnknownNodeType(el.node_type.clone()),
            ));
            return;
        };

        for kind in check_attrs(&el.node_type, &ty.spec.attrs, &el.attrs) {
            out.push(SchemaViolation::new(path.clone(), kind));
        }

        if ty.spec.atomic && !el.content.is_empty() {
            out.push(SchemaViolation::new(
                path.clone(),
                ViolationKind::AtomicHasChildren(el.node_type.clone()),
            ));
            return;
        }

        if !ty.expr.matches(el.content.iter().map(|c| self.label(c))) {
            let has_text = el.content.iter().any(|c| matches!(c, Node::Text(_)));
            let kind = if has_text && !self.accepts_text(&ty.expr) {
                ViolationKind::TextOutsideInline(el.node_type.clone())
            } else {
                ViolationKind::ContentMismatch {
                    node_type: el.node_type.clone(),
                    expected: ty.expr.source().to_string(),
                    found: el.content.iter().map(|c| c.node_type().to_string()).collect(),
                }
            };
            out.push(SchemaViolation::new(path.clone(), kind));
        }

        for (i, child) in el.content.iter().enumerate() {
            self.check(child, Some(&ty.spec), &path.child(i), out);
        }
    }

    fn check_text(
        &self,
        run: &TextRun,
        parent: Option<&NodeTypeSpec>,
        path: &NodePath,
        out: &mut Vec<SchemaViolation>,
    ) {
        let mut push = |kind| out.push(SchemaViolation::new(path.clone(), kind));
        if run.text.is_empty() {
            push(ViolationKind::EmptyText);
        }

        let mut last_rank = None;
        let mut ordered = true;
        for mark in &run.marks {
            let Some(rank) = self.mark_rank(&mark.mark_type) else {
                push(ViolationKind::UnknownMark(mark.mark_type.clone()));
                continue;
            };
            if let Some(parent) = parent {
                if !parent.allows_mark(&mark.mark_type) {
                    push(ViolationKind::MarkNotAllowed {
                        mark: mark.mark_type.clone(),
                        node_type: parent.name.clone(),
                    });
                }
            }
            for kind in check_attrs(&mark.mark_type, &self.marks[rank].attrs, &mark.attrs) {
                push(kind);
            }
            if last_rank.is_some_and(|last| last >= rank) {
                ordered = false;
            }
            last_rank = Some(rank);
        }
        if !ordered {
            push(ViolationKind::UnorderedMarks(
                run.marks.iter().map(|m| m.mark_type.clone()).collect(),
            ));
        }
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    /// Repair a tree so that it validates, reporting every repair.
    ///
    /// Unknown node types become the fallback placeholder when one is set and
    /// are dropped otherwise. Children that do not fit their parent are
    /// dropped; stray inline content in block containers is wrapped in
    /// paragraphs; missing required children are synthesized from defaults.
    pub fn normalize(&self, root: Node) -> (Node, Vec<SchemaViolation>) {
        self.normalize_with(root, false)
    }

    /// Like [`Schema::normalize`], but elements of unregistered types are kept
    /// in place untouched (still reported) so that opaque payloads survive.
    pub fn normalize_lenient(&self, root: Node) -> (Node, Vec<SchemaViolation>) {
        self.normalize_with(root, true)
    }

    fn normalize_with(&self, root: Node, keep_unknown: bool) -> (Node, Vec<SchemaViolation>) {
        let mut out = Vec::new();
        let path = NodePath::root();
        let el = match root {
            Node::Element(el) if el.node_type == DOC_TYPE => el,
            other => {
                out.push(SchemaViolation::new(
                    path.clone(),
                    ViolationKind::RootNotDoc(other.node_type().to_string()),
                ));
                Element::new(DOC_TYPE).with_content(vec![other])
            }
        };
        let doc = self
            .normalize_element(el, &path, keep_unknown, &mut out)
            .unwrap_or_else(Node::empty_doc);
        (doc, out)
    }

    fn normalize_element(
        &self,
        el: Element,
        path: &NodePath,
        keep_unknown: bool,
        out: &mut Vec<SchemaViolation>,
    ) -> Option<Node> {
        let Some(ty) = self.lookup(&el.node_type) else {
            out.push(SchemaViolation::new(
                path.clone(),
                ViolationKind::UnknownNodeType(el.node_type.clone()),
            ));
            if keep_unknown {
                return Some(el.into());
            }
            return self.fallback_node(&el.node_type);
        };

        let attrs = match self.normalize_attrs(&el.node_type, &el.attrs) {
            Ok(attrs) => attrs,
            Err(kind) => {
                out.push(SchemaViolation::new(path.clone(), kind));
                return None;
            }
        };

        if ty.spec.atomic {
            if !el.content.is_empty() {
                out.push(SchemaViolation::new(
                    path.clone(),
                    ViolationKind::AtomicHasChildren(el.node_type.clone()),
                ));
            }
            return Some(Element { node_type: el.node_type, attrs, content: Vec::new() }.into());
        }

        let found: Vec<String> = el.content.iter().map(|c| c.node_type().to_string()).collect();
        let mut children = Vec::with_capacity(el.content.len());
        for (i, child) in el.content.into_iter().enumerate() {
            let child_path = path.child(i);
            let normalized = match child {
                Node::Text(run) => self.normalize_text(run, &ty.spec, &child_path, out),
                Node::Element(child) => {
                    self.normalize_element(child, &child_path, keep_unknown, out)
                }
            };
            children.extend(normalized);
        }

        if !self.accepts_inline(&ty.expr) && children.iter().any(|c| self.is_inline(c)) {
            children = self.wrap_inline(children);
        }

        let mut state = ty.expr.start();
        let mut kept = Vec::with_capacity(children.len());
        let mut mismatch = false;
        let mut opaque = false;
        for child in children {
            if keep_unknown && self.node_spec(child.node_type()).is_none() {
                opaque = true;
                kept.push(child);
                continue;
            }
            let next = ty.expr.step(&state, self.label(&child));
            if next.is_dead() {
                mismatch = true;
                continue;
            }
            state = next;
            kept.push(child);
        }

        if !ty.expr.is_accepting(&state) && !opaque {
            mismatch = true;
            let filled = ty
                .expr
                .fill_end(&state)
                .and_then(|labels| {
                    labels
                        .iter()
                        .map(|l| self.default_for_label(l, 0))
                        .collect::<Option<Vec<_>>>()
                });
            match filled {
                Some(extra) => kept.extend(extra),
                None => {
                    out.push(SchemaViolation::new(
                        path.clone(),
                        ViolationKind::ContentMismatch {
                            node_type: el.node_type.clone(),
                            expected: ty.expr.source().to_string(),
                            found,
                        },
                    ));
                    return None;
                }
            }
        }

        if mismatch {
            out.push(SchemaViolation::new(
                path.clone(),
                ViolationKind::ContentMismatch {
                    node_type: el.node_type.clone(),
                    expected: ty.expr.source().to_string(),
                    found,
                },
            ));
        }

        Some(Element { node_type: el.node_type, attrs, content: kept }.into())
    }

    fn normalize_text(
        &self,
        run: TextRun,
        parent: &NodeTypeSpec,
        path: &NodePath,
        out: &mut Vec<SchemaViolation>,
    ) -> Option<Node> {
        if run.text.is_empty() {
            out.push(SchemaViolation::new(path.clone(), ViolationKind::EmptyText));
            return None;
        }
        let mut marks = Vec::with_capacity(run.marks.len());
        for mark in run.marks {
            if self.mark_rank(&mark.mark_type).is_none() {
                out.push(SchemaViolation::new(
                    path.clone(),
                    ViolationKind::UnknownMark(mark.mark_type),
                ));
                continue;
            }
            if !parent.allows_mark(&mark.mark_type) {
                out.push(SchemaViolation::new(
                    path.clone(),
                    ViolationKind::MarkNotAllowed {
                        mark: mark.mark_type,
                        node_type: parent.name.clone(),
                    },
                ));
                continue;
            }
            match self.normalize_mark(&mark) {
                Ok(mark) => marks.push(mark),
                Err(kind) => out.push(SchemaViolation::new(path.clone(), kind)),
            }
        }
        Some(Node::Text(TextRun {
            text: run.text,
            marks: self.sort_marks(marks),
        }))
    }

    /// Group consecutive inline children into paragraphs
    fn wrap_inline(&self, children: Vec<Node>) -> Vec<Node> {
        if self.node_spec("paragraph").is_none() {
            return children;
        }
        let mut out = Vec::with_capacity(children.len());
        let mut pending: Vec<Node> = Vec::new();
        for child in children {
            if self.is_inline(&child) {
                pending.push(child);
                continue;
            }
            if !pending.is_empty() {
                out.push(Node::paragraph(std::mem::take(&mut pending)));
            }
            out.push(child);
        }
        if !pending.is_empty() {
            out.push(Node::paragraph(pending));
        }
        out
    }

    /// Drop unknown keys, fill missing values from defaults and replace
    /// invalid ones with defaults. A missing or invalid required attribute
    /// is an error.
    pub fn normalize_attrs(&self, node_type: &str, attrs: &Attrs) -> Result<Attrs, ViolationKind> {
        let specs = self
            .node_spec(node_type)
            .map(|s| &s.attrs)
            .ok_or_else(|| ViolationKind::UnknownNodeType(node_type.to_string()))?;
        normalize_attr_map(node_type, specs, attrs)
    }

    pub fn normalize_mark(&self, mark: &Mark) -> Result<Mark, ViolationKind> {
        let spec = self
            .mark_spec(&mark.mark_type)
            .ok_or_else(|| ViolationKind::UnknownMark(mark.mark_type.clone()))?;
        Ok(Mark {
            mark_type: mark.mark_type.clone(),
            attrs: normalize_attr_map(&mark.mark_type, &spec.attrs, &mark.attrs)?,
        })
    }

    /// Sort by rank and keep the first mark of each type. Unknown marks go last.
    pub fn sort_marks(&self, mut marks: Vec<Mark>) -> Vec<Mark> {
        marks.sort_by_key(|m| self.mark_rank(&m.mark_type).unwrap_or(usize::MAX));
        let mut seen: Vec<String> = Vec::with_capacity(marks.len());
        marks.retain(|m| {
            if seen.contains(&m.mark_type) {
                false
            } else {
                seen.push(m.mark_type.clone());
                true
            }
        });
        marks
    }

    /// Insert defaults for node and mark attributes missing anywhere in
    /// the subtree. Present values are left alone, valid or not.
    pub fn fill_defaults(&self, node: &mut Node) {
        match node {
            Node::Element(el) => {
                if let Some(spec) = self.node_spec(&el.node_type) {
                    fill_attr_defaults(&spec.attrs, &mut el.attrs);
                }
                for child in &mut el.content {
                    self.fill_defaults(child);
                }
            }
            Node::Text(run) => {
                for mark in &mut run.marks {
                    self.fill_mark_defaults(mark);
                }
            }
        }
    }

    pub fn fill_mark_defaults(&self, mark: &mut Mark) {
        if let Some(spec) = self.mark_spec(&mark.mark_type) {
            fill_attr_defaults(&spec.attrs, &mut mark.attrs);
        }
    }

    /// Build a node, normalizing its attributes and validating the result
    pub fn create(
        &self,
        node_type: &str,
        attrs: Attrs,
        content: Vec<Node>,
    ) -> Result<Node, Vec<SchemaViolation>> {
        let attrs = self
            .normalize_attrs(node_type, &attrs)
            .map_err(|kind| vec![SchemaViolation::new(NodePath::root(), kind)])?;
        let node: Node = Element {
            node_type: node_type.to_string(),
            attrs,
            content,
        }
        .into();
        let violations = self.validate_node(&node, &NodePath::root());
        if violations.is_empty() {
            Ok(node)
        } else {
            Err(violations)
        }
    }

    /// Smallest valid node of the given type, or `None` when it cannot be
    /// built from defaults alone
    pub fn create_default(&self, node_type: &str) -> Option<Node> {
        self.default_node(node_type, 0)
    }

    fn default_node(&self, node_type: &str, depth: usize) -> Option<Node> {
        if depth > MAX_FILL_DEPTH || node_type == TEXT_TYPE {
            return None;
        }
        let ty = self.lookup(node_type)?;
        let attrs = normalize_attr_map(node_type, &ty.spec.attrs, &Attrs::new()).ok()?;
        let content = if ty.spec.atomic {
            Vec::new()
        } else {
            ty.expr
                .fill_end(&ty.expr.start())?
                .iter()
                .map(|l| self.default_for_label(l, depth + 1))
                .collect::<Option<Vec<_>>>()?
        };
        Some(Element { node_type: node_type.to_string(), attrs, content }.into())
    }

    /// Resolve a content label (type or group) to the first constructible type
    fn default_for_label(&self, label: &str, depth: usize) -> Option<Node> {
        if self.type_index.contains_key(label) {
            return self.default_node(label, depth);
        }
        self.types
            .iter()
            .filter(|t| t.spec.groups.iter().any(|g| g == label))
            .find_map(|t| self.default_node(&t.spec.name, depth))
    }

    /// Placeholder standing in for content the schema cannot represent
    pub fn fallback_node(&self, label: &str) -> Option<Node> {
        let fallback = self.fallback.as_ref()?;
        let mut attrs = Attrs::new();
        attrs.insert(fallback.label_attr.clone(), AttrValue::from(label));
        let attrs = self.normalize_attrs(&fallback.node_type, &attrs).ok()?;
        Some(
            Element {
                node_type: fallback.node_type.clone(),
                attrs,
                content: Vec::new(),
            }
            .into(),
        )
    }

    pub fn fallback_type(&self) -> Option<&str> {
        self.fallback.as_ref().map(|f| f.node_type.as_str())
    }
}

fn fill_attr_defaults(specs: &BTreeMap<String, AttrSpec>, attrs: &mut Attrs) {
    for (name, spec) in specs {
        if let Some(default) = &spec.default {
            attrs.entry(name.clone()).or_insert_with(|| default.clone());
        }
    }
}

fn check_attrs(owner: &str, specs: &BTreeMap<String, AttrSpec>, attrs: &Attrs) -> Vec<ViolationKind> {
    let mut out = Vec::new();
    for (name, value) in attrs {
        match specs.get(name) {
            None => out.push(ViolationKind::InvalidAttribute {
                owner: owner.to_string(),
                attr: name.clone(),
                reason: "not declared".to_string(),
            }),
            Some(spec) if !spec.kind.accepts(value) => out.push(ViolationKind::InvalidAttribute {
                owner: owner.to_string(),
                attr: name.clone(),
                reason: format!("unexpected {} value", value.kind_name()),
            }),
            Some(_) => {}
        }
    }
    for name in specs.keys() {
        if !attrs.contains_key(name) {
            out.push(ViolationKind::MissingAttribute {
                owner: owner.to_string(),
                attr: name.clone(),
            });
        }
    }
    out
}

fn normalize_attr_map(
    owner: &str,
    specs: &BTreeMap<String, AttrSpec>,
    attrs: &Attrs,
) -> Result<Attrs, ViolationKind> {
    let mut normalized = Attrs::new();
    for (name, spec) in specs {
        let value = match (attrs.get(name), &spec.default) {
            (Some(value), _) if spec.kind.accepts(value) => value.clone(),
            (_, Some(default)) => default.clone(),
            (None, None) => {
                return Err(ViolationKind::MissingAttribute {
                    owner: owner.to_string(),
                    attr: name.clone(),
                })
            }
            (Some(value), None) => {
                return Err(ViolationKind::InvalidAttribute {
                    owner: owner.to_string(),
                    attr: name.clone(),
                    reason: format!("unexpected {} value", value.kind_name()),
                })
            }
        };
        normalized.insert(name.clone(), value);
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn heading(level: i64, text: &str) -> Node {
        Element::new("heading")
            .with_attr("level", level)
            .with_content(vec![Node::text(text)])
            .into()
    }

    #[test]
    fn test_duplicate_registration() {
        let mut schema = Schema::basic();
        assert_eq!(
            schema.register_type(NodeTypeSpec::new("paragraph")),
            Err(SchemaError::DuplicateNodeType("paragraph".into()))
        );
        assert_eq!(
            schema.register_mark(MarkSpec::new("bold")),
            Err(SchemaError::DuplicateMark("bold".into()))
        );
    }

    #[test]
    fn test_invalid_content_expression() {
        let mut schema = Schema::new();
        let err = schema
            .register_type(NodeTypeSpec::new("broken").content("(block"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidContent { .. }));
    }

    #[test]
    fn test_valid_document() {
        let schema = Schema::basic();
        let doc = Node::doc(vec![
            heading(2, "Title"),
            Node::paragraph(vec![
                Node::text("plain "),
                Node::marked_text("bold", vec![Mark::new("bold"), Mark::new("italic")]),
            ]),
        ]);
        assert_eq!(schema.validate(&doc), Ok(()));
    }

    #[test]
    fn test_root_not_doc() {
        let schema = Schema::basic();
        let errs = schema.validate(&Node::paragraph(vec![])).unwrap_err();
        assert_eq!(errs[0].kind, ViolationKind::RootNotDoc("paragraph".into()));
    }

    #[test]
    fn test_empty_doc_is_content_mismatch() {
        let schema = Schema::basic();
        let errs = schema.validate(&Node::doc(vec![])).unwrap_err();
        assert!(matches!(errs[0].kind, ViolationKind::ContentMismatch { .. }));
        assert_eq!(errs[0].path, NodePath::root());
    }

    #[test]
    fn test_text_directly_in_doc() {
        let schema = Schema::basic();
        let errs = schema.validate(&Node::doc(vec![Node::text("stray")])).unwrap_err();
        assert_eq!(errs[0].kind, ViolationKind::TextOutsideInline("doc".into()));
    }

    #[test]
    fn test_heading_level_out_of_range() {
        let schema = Schema::basic();
        let errs = schema.validate(&Node::doc(vec![heading(9, "x")])).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, NodePath::from([0]));
        assert!(matches!(
            &errs[0].kind,
            ViolationKind::InvalidAttribute { attr, .. } if attr == "level"
        ));
    }

    #[test]
    fn test_marks_must_be_ordered_and_allowed() {
        let schema = Schema::basic();
        let unordered = Node::doc(vec![Node::paragraph(vec![Node::marked_text(
            "x",
            vec![Mark::new("italic"), Mark::new("bold")],
        )])]);
        let errs = schema.validate(&unordered).unwrap_err();
        assert!(matches!(errs[0].kind, ViolationKind::UnorderedMarks(_)));

        let code: Node = Element::new("codeBlock")
            .with_attr("language", AttrValue::Null)
            .with_content(vec![Node::marked_text("fn", vec![Mark::new("bold")])])
            .into();
        let errs = schema.validate(&Node::doc(vec![code])).unwrap_err();
        assert_eq!(
            errs[0].kind,
            ViolationKind::MarkNotAllowed {
                mark: "bold".into(),
                node_type: "codeBlock".into()
            }
        );
    }

    #[test]
    fn test_link_requires_href() {
        let schema = Schema::basic();
        let doc = Node::doc(vec![Node::paragraph(vec![Node::marked_text(
            "x",
            vec![Mark::new("link")],
        )])]);
        let errs = schema.validate(&doc).unwrap_err();
        assert!(errs.iter().any(|v| matches!(
            &v.kind,
            ViolationKind::MissingAttribute { owner, attr } if owner == "link" && attr == "href"
        )));
    }

    #[test]
    fn test_normalize_attrs_defaults_and_drops() {
        let schema = Schema::basic();
        let mut attrs = Attrs::new();
        attrs.insert("level".into(), AttrValue::from("three"));
        attrs.insert("bogus".into(), AttrValue::Bool(true));
        let normalized = schema.normalize_attrs("heading", &attrs).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized["level"], AttrValue::Integer(1));
    }

    #[test]
    fn test_fill_defaults_covers_marks() {
        let schema = Schema::basic();
        let mut node: Node = Element::new("heading")
            .with_content(vec![Node::marked_text(
                "x",
                vec![Mark::new("link").with_attr("href", "https://example.com")],
            )])
            .into();
        schema.fill_defaults(&mut node);

        let el = node.as_element().unwrap();
        assert_eq!(el.attr("level"), Some(&AttrValue::Integer(1)));
        let link = &el.content[0].as_text().unwrap().marks[0];
        assert_eq!(link.attrs["target"], AttrValue::from("_blank"));
        assert_eq!(link.attrs["title"], AttrValue::Null);
        assert!(schema.validate_node(&node, &NodePath::root()).is_empty());
    }

    #[test]
    fn test_non_finite_float_is_invalid() {
        assert!(!AttrKind::Any.accepts(&AttrValue::Float(f64::NAN)));
        assert!(AttrKind::Any.accepts(&AttrValue::Float(0.5)));
    }

    #[test]
    fn test_normalize_wraps_and_fills() {
        let schema = Schema::basic();
        let (doc, violations) = schema.normalize(Node::doc(vec![Node::text("loose")]));
        assert_eq!(
            doc,
            Node::doc(vec![Node::paragraph(vec![Node::text("loose")])])
        );
        assert!(violations.is_empty());
        assert_eq!(schema.validate(&doc), Ok(()));

        let (doc, violations) = schema.normalize(Node::doc(vec![]));
        assert_eq!(doc, Node::empty_doc());
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_normalize_drops_misplaced_child() {
        let schema = Schema::basic();
        let list: Node = Element::new("bulletList")
            .with_content(vec![Node::paragraph(vec![Node::text("not an item")])])
            .into();
        let (doc, violations) = schema.normalize(Node::doc(vec![list]));
        assert_eq!(schema.validate(&doc), Ok(()));
        let list = &doc.content()[0];
        assert_eq!(list.content()[0].node_type(), "listItem");
        assert!(violations
            .iter()
            .any(|v| matches!(v.kind, ViolationKind::ContentMismatch { .. })));
    }

    #[test]
    fn test_create_default_table() {
        let schema = Schema::basic();
        let table = schema.create_default("table").unwrap();
        assert_eq!(schema.validate_node(&table, &NodePath::root()), vec![]);
        assert_eq!(table.content()[0].node_type(), "tableRow");
        assert_eq!(table.content()[0].content()[0].node_type(), "tableCell");
    }

    #[test]
    fn test_sort_marks_dedupes() {
        let schema = Schema::basic();
        let marks = schema.sort_marks(vec![
            Mark::new("code"),
            Mark::new("bold"),
            Mark::new("code"),
        ]);
        let names: Vec<_> = marks.iter().map(|m| m.mark_type.as_str()).collect();
        assert_eq!(names, vec!["bold", "code"]);
    }
}
