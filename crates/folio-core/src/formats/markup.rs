// SPDX-License-Identifier: AGPL-3.0-or-later
//! Display markup (HTML subset)
//!
//! Built-in node types map to plain HTML elements. Extension nodes render as
//! `<div data-type="T">` holding one hidden `<pre data-carrier="ATTR">` per
//! attribute followed by a visible body. Carriers are read back without
//! consulting the extension, so a node whose module is not registered still
//! passes through with its attributes intact.

use super::scanner::{self, escape_attr, escape_text, HtmlElement, HtmlNode};
use crate::extensions::ExtensionRegistry;
use crate::model::{AttrValue, Attrs, Element, Mark, Node, NodePath, TextRun, DOC_TYPE};
use crate::traits::{DeserializeError, MarkupConfig, Result, SerializationError};

pub const TYPE_ATTR: &str = "data-type";
pub const CARRIER_ATTR: &str = "data-carrier";
pub const ENCODING_ATTR: &str = "data-encoding";

/// Tags read as inline content when found at block level
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "del", "dfn", "em", "font", "i",
    "ins", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strike", "strong",
    "sub", "sup", "time", "u", "var",
];

/// Extension block as found in markup
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupFragment {
    pub node_type: String,
    /// Attributes recovered from carriers
    pub carriers: Attrs,
    /// Text of the visible body
    pub body_text: String,
}

/// Render an extension block with one carrier per attribute
pub fn render_carrier_block(node_type: &str, attrs: &Attrs, body: Option<&str>) -> String {
    let mut out = format!(r#"<div {TYPE_ATTR}="{}">"#, escape_attr(node_type));
    for (name, value) in attrs {
        match value {
            AttrValue::String(s) => {
                // A leading newline inside <pre> is dropped by browsers
                let escaped = match s.strip_prefix('\n') {
                    Some(rest) => format!("&#10;{}", escape_text(rest)),
                    None => escape_text(s),
                };
                out.push_str(&format!(
                    r#"<pre hidden {CARRIER_ATTR}="{}">{escaped}</pre>"#,
                    escape_attr(name)
                ));
            }
            other => {
                let json = serde_json::to_string(other).unwrap_or_else(|_| "null".to_string());
                out.push_str(&format!(
                    r#"<pre hidden {CARRIER_ATTR}="{}" {ENCODING_ATTR}="json">{}</pre>"#,
                    escape_attr(name),
                    escape_text(&json)
                ));
            }
        }
    }
    if let Some(body) = body {
        out.push_str(r#"<div data-fallback="">"#);
        out.push_str(body);
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

/// Write a document as display markup
pub fn serialize_to_markup(registry: &ExtensionRegistry, doc: &Node) -> Result<String> {
    serialize_to_markup_with(registry, doc, &MarkupConfig::default())
}

pub fn serialize_to_markup_with(
    registry: &ExtensionRegistry,
    doc: &Node,
    config: &MarkupConfig,
) -> Result<String> {
    if doc.node_type() != DOC_TYPE {
        return Err(SerializationError::Unrenderable {
            node_type: doc.node_type().to_string(),
            path: NodePath::root(),
        });
    }
    let mut writer = MarkupWriter {
        registry,
        config,
        out: String::new(),
    };
    for (i, child) in doc.content().iter().enumerate() {
        if config.block_newlines && i > 0 {
            writer.out.push('\n');
        }
        writer.write_node(child, &NodePath::root().child(i))?;
    }
    Ok(writer.out)
}

struct MarkupWriter<'a> {
    registry: &'a ExtensionRegistry,
    config: &'a MarkupConfig,
    out: String,
}

impl MarkupWriter<'_> {
    fn write_node(&mut self, node: &Node, path: &NodePath) -> Result<()> {
        match node {
            Node::Text(run) => {
                self.write_text(run);
                Ok(())
            }
            Node::Element(el) => self.write_element(el, path),
        }
    }

    fn write_children(&mut self, el: &Element, path: &NodePath) -> Result<()> {
        for (i, child) in el.content.iter().enumerate() {
            self.write_node(child, &path.child(i))?;
        }
        Ok(())
    }

    fn wrap(&mut self, open: &str, close: &str, el: &Element, path: &NodePath) -> Result<()> {
        self.out.push_str(open);
        self.write_children(el, path)?;
        self.out.push_str(close);
        Ok(())
    }

    fn write_element(&mut self, el: &Element, path: &NodePath) -> Result<()> {
        if let Some(module) = self.registry.module(&el.node_type) {
            self.out.push_str(&module.to_markup(el, self.config));
            return Ok(());
        }

        match el.node_type.as_str() {
            "paragraph" => self.wrap("<p>", "</p>", el, path),
            "heading" => {
                let level = el
                    .attr("level")
                    .and_then(AttrValue::as_i64)
                    .filter(|l| (1..=6).contains(l))
                    .unwrap_or(1);
                self.wrap(&format!("<h{level}>"), &format!("</h{level}>"), el, path)
            }
            "blockquote" => self.wrap("<blockquote>", "</blockquote>", el, path),
            "horizontalRule" => {
                self.out.push_str("<hr>");
                Ok(())
            }
            "codeBlock" => {
                match el.attr("language").and_then(AttrValue::as_str) {
                    Some(lang) => self
                        .out
                        .push_str(&format!(r#"<pre data-language="{}">"#, escape_attr(lang))),
                    None => self.out.push_str("<pre>"),
                }
                self.out.push_str("<code>");
                let code: String = el.content.iter().map(Node::text_content).collect();
                self.out.push_str(&escape_text(&code));
                self.out.push_str("</code></pre>");
                Ok(())
            }
            "image" => {
                self.write_image(el);
                Ok(())
            }
            "hardBreak" => {
                self.out.push_str("<br>");
                Ok(())
            }
            "orderedList" => {
                let open = match el.attr("order").and_then(AttrValue::as_i64) {
                    Some(start) if start != 1 => format!(r#"<ol start="{start}">"#),
                    _ => "<ol>".to_string(),
                };
                self.wrap(&open, "</ol>", el, path)
            }
            "bulletList" => self.wrap("<ul>", "</ul>", el, path),
            "listItem" => self.wrap("<li>", "</li>", el, path),
            "table" => self.wrap("<table><tbody>", "</tbody></table>", el, path),
            "tableRow" => self.wrap("<tr>", "</tr>", el, path),
            "tableCell" => self.wrap("<td>", "</td>", el, path),
            "tableHeader" => self.wrap("<th>", "</th>", el, path),
            other if el.content.is_empty() && other != DOC_TYPE => {
                self.out
                    .push_str(&render_carrier_block(other, &el.attrs, None));
                Ok(())
            }
            other => Err(SerializationError::Unrenderable {
                node_type: other.to_string(),
                path: path.clone(),
            }),
        }
    }

    fn write_image(&mut self, el: &Element) {
        self.out.push_str("<img");
        for (attr, html) in [
            ("src", "src"),
            ("alt", "alt"),
            ("title", "title"),
            ("align", "data-align"),
            ("width", "width"),
            ("height", "height"),
        ] {
            match el.attr(attr) {
                None | Some(AttrValue::Null) => {}
                Some(AttrValue::String(s)) if attr == "align" && s == "none" => {}
                Some(value) => self
                    .out
                    .push_str(&format!(r#" {html}="{}""#, escape_attr(&value.to_string()))),
            }
        }
        self.out.push('>');
    }

    fn write_text(&mut self, run: &TextRun) {
        for mark in &run.marks {
            self.out.push_str(&open_mark(mark));
        }
        self.out.push_str(&escape_text(&run.text));
        for mark in run.marks.iter().rev() {
            self.out.push_str(close_mark(mark));
        }
    }
}

fn open_mark(mark: &Mark) -> String {
    match mark.mark_type.as_str() {
        "bold" => "<strong>".to_string(),
        "italic" => "<em>".to_string(),
        "underline" => "<u>".to_string(),
        "strike" => "<s>".to_string(),
        "code" => "<code>".to_string(),
        "link" => {
            let mut open = String::from("<a");
            for key in ["href", "title", "target"] {
                if let Some(AttrValue::String(v)) = mark.attrs.get(key) {
                    open.push_str(&format!(r#" {key}="{}""#, escape_attr(v)));
                }
            }
            open.push('>');
            open
        }
        other => format!(r#"<span data-mark="{}">"#, escape_attr(other)),
    }
}

fn close_mark(mark: &Mark) -> &'static str {
    match mark.mark_type.as_str() {
        "bold" => "</strong>",
        "italic" => "</em>",
        "underline" => "</u>",
        "strike" => "</s>",
        "code" => "</code>",
        "link" => "</a>",
        _ => "</span>",
    }
}

/// Read display markup into a document.
///
/// Unknown tags are unwrapped, whitespace between blocks is ignored and stray
/// inline content at block level is wrapped in paragraphs. Extension blocks
/// whose module is not registered pass through as opaque nodes.
pub fn deserialize_from_markup(
    registry: &ExtensionRegistry,
    input: &str,
) -> std::result::Result<Node, DeserializeError> {
    let nodes = scanner::parse_fragment(input).map_err(|e| DeserializeError::Markup {
        offset: e.offset,
        message: e.message,
    })?;
    let reader = MarkupReader { registry };
    let blocks = reader.read_blocks(&nodes);
    let (doc, violations) = registry.schema().normalize_lenient(Node::doc(blocks));
    for violation in &violations {
        tracing::debug!(%violation, "normalized markup input");
    }
    Ok(doc)
}

struct MarkupReader<'a> {
    registry: &'a ExtensionRegistry,
}

impl MarkupReader<'_> {
    fn read_blocks(&self, nodes: &[HtmlNode]) -> Vec<Node> {
        let mut blocks = Vec::new();
        let mut pending = Vec::new();
        for node in nodes {
            match node {
                HtmlNode::Text(text) if text.trim().is_empty() && pending.is_empty() => {}
                HtmlNode::Text(_) => self.read_inline(node, &[], &mut pending),
                HtmlNode::Element(el) if is_inline_element(el) => {
                    self.read_inline(node, &[], &mut pending)
                }
                HtmlNode::Element(el) => {
                    flush_paragraph(&mut pending, &mut blocks);
                    blocks.extend(self.read_block(el));
                }
            }
        }
        flush_paragraph(&mut pending, &mut blocks);
        blocks
    }

    fn read_block(&self, el: &HtmlElement) -> Vec<Node> {
        if let Some(node_type) = el.attr(TYPE_ATTR) {
            return vec![self.read_extension(el, node_type).into()];
        }
        let name = el.name.as_str();
        match name {
            "p" => vec![Node::paragraph(self.read_inline_children(el))],
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = i64::from(name.as_bytes()[1] - b'0');
                vec![Element::new("heading")
                    .with_attr("level", level)
                    .with_content(self.read_inline_children(el))
                    .into()]
            }
            "blockquote" => vec![Element::new("blockquote")
                .with_content(self.read_blocks(&el.children))
                .into()],
            "hr" => vec![Element::new("horizontalRule").into()],
            "pre" => {
                let text = el.text_content();
                let language = AttrValue::from(el.attr("data-language").map(str::to_string));
                let content = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![Node::text(text)]
                };
                vec![Element::new("codeBlock")
                    .with_attr("language", language)
                    .with_content(content)
                    .into()]
            }
            "img" => vec![read_image(el).into()],
            "ul" | "ol" => vec![self.read_list(el).into()],
            "table" => vec![Element::new("table")
                .with_content(self.read_rows(el))
                .into()],
            _ => self.read_blocks(&el.children),
        }
    }

    fn read_list(&self, el: &HtmlElement) -> Element {
        let mut list = if el.name == "ol" {
            let start = el
                .attr("start")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(1);
            Element::new("orderedList").with_attr("order", start)
        } else {
            Element::new("bulletList")
        };
        for child in &el.children {
            match child {
                HtmlNode::Text(t) if t.trim().is_empty() => {}
                HtmlNode::Element(li) if li.name == "li" => list.content.push(
                    Element::new("listItem")
                        .with_content(self.read_blocks(&li.children))
                        .into(),
                ),
                other => list.content.push(
                    Element::new("listItem")
                        .with_content(self.read_blocks(std::slice::from_ref(other)))
                        .into(),
                ),
            }
        }
        list
    }

    fn read_rows(&self, el: &HtmlElement) -> Vec<Node> {
        let mut rows = Vec::new();
        for child in &el.children {
            let HtmlNode::Element(child) = child else {
                continue;
            };
            match child.name.as_str() {
                "tr" => {
                    let cells = child
                        .children
                        .iter()
                        .filter_map(|cell| match cell {
                            HtmlNode::Element(cell) if cell.name == "td" || cell.name == "th" => {
                                let node_type = if cell.name == "th" {
                                    "tableHeader"
                                } else {
                                    "tableCell"
                                };
                                Some(
                                    Element::new(node_type)
                                        .with_content(self.read_blocks(&cell.children))
                                        .into(),
                                )
                            }
                            _ => None,
                        })
                        .collect();
                    rows.push(Element::new("tableRow").with_content(cells).into());
                }
                "thead" | "tbody" | "tfoot" => rows.extend(self.read_rows(child)),
                _ => {}
            }
        }
        rows
    }

    fn read_extension(&self, el: &HtmlElement, node_type: &str) -> Element {
        let mut fragment = MarkupFragment {
            node_type: node_type.to_string(),
            carriers: Attrs::new(),
            body_text: String::new(),
        };
        collect_carriers(&el.children, &mut fragment);
        match self.registry.module(node_type) {
            Some(module) => module.from_markup(fragment),
            None => {
                tracing::debug!(node_type, "no module registered, keeping node opaque");
                Element {
                    node_type: fragment.node_type,
                    attrs: fragment.carriers,
                    content: Vec::new(),
                }
            }
        }
    }

    fn read_inline_children(&self, el: &HtmlElement) -> Vec<Node> {
        let mut out = Vec::new();
        for child in &el.children {
            self.read_inline(child, &[], &mut out);
        }
        out
    }

    fn read_inline(&self, node: &HtmlNode, marks: &[Mark], out: &mut Vec<Node>) {
        let el = match node {
            HtmlNode::Text(text) => {
                self.push_text(text, marks, out);
                return;
            }
            HtmlNode::Element(el) => el,
        };
        if el.name == "br" {
            out.push(Element::new("hardBreak").into());
            return;
        }
        if el.name == "img" {
            out.push(read_image(el).into());
            return;
        }
        if el.has_attr(TYPE_ATTR) {
            return;
        }
        let mut inner = marks.to_vec();
        inner.extend(mark_for(el));
        for child in &el.children {
            self.read_inline(child, &inner, out);
        }
    }

    fn push_text(&self, text: &str, marks: &[Mark], out: &mut Vec<Node>) {
        if text.is_empty() {
            return;
        }
        let marks = self.registry.schema().sort_marks(marks.to_vec());
        if let Some(Node::Text(last)) = out.last_mut() {
            if last.marks == marks {
                last.text.push_str(text);
                return;
            }
        }
        out.push(Node::marked_text(text, marks));
    }
}

fn is_inline_element(el: &HtmlElement) -> bool {
    INLINE_TAGS.contains(&el.name.as_str()) && !el.has_attr(TYPE_ATTR)
}

fn flush_paragraph(pending: &mut Vec<Node>, blocks: &mut Vec<Node>) {
    while matches!(pending.last(), Some(Node::Text(run)) if run.text.trim().is_empty()) {
        pending.pop();
    }
    if !pending.is_empty() {
        blocks.push(Node::paragraph(std::mem::take(pending)));
    }
}

fn mark_for(el: &HtmlElement) -> Option<Mark> {
    let mark = match el.name.as_str() {
        "strong" | "b" => Mark::new("bold"),
        "em" | "i" => Mark::new("italic"),
        "u" | "ins" => Mark::new("underline"),
        "s" | "strike" | "del" => Mark::new("strike"),
        "code" | "kbd" | "samp" => Mark::new("code"),
        "a" => {
            let mut link = Mark::new("link").with_attr("href", el.attr("href")?);
            for key in ["title", "target"] {
                if let Some(value) = el.attr(key) {
                    link = link.with_attr(key, value);
                }
            }
            link
        }
        "span" => Mark::new(el.attr("data-mark")?),
        _ => return None,
    };
    Some(mark)
}

fn read_image(el: &HtmlElement) -> Element {
    let mut image = Element::new("image");
    for (html, attr) in [
        ("src", "src"),
        ("alt", "alt"),
        ("title", "title"),
        ("data-align", "align"),
    ] {
        if let Some(value) = el.attr(html) {
            image = image.with_attr(attr, value);
        }
    }
    for dim in ["width", "height"] {
        if let Some(value) = el.attr(dim) {
            let value = value
                .trim()
                .parse::<i64>()
                .map_or_else(|_| AttrValue::from(value), AttrValue::Integer);
            image = image.with_attr(dim, value);
        }
    }
    image
}

fn collect_carriers(nodes: &[HtmlNode], fragment: &mut MarkupFragment) {
    for node in nodes {
        match node {
            HtmlNode::Text(t) => fragment.body_text.push_str(t),
            HtmlNode::Element(el) if el.has_attr(TYPE_ATTR) => {}
            HtmlNode::Element(el) => match el.attr(CARRIER_ATTR) {
                Some(name) => {
                    let raw = el.text_content();
                    let value = if el.attr(ENCODING_ATTR) == Some("json") {
                        match serde_json::from_str::<AttrValue>(&raw) {
                            Ok(value) => value,
                            Err(err) => {
                                tracing::warn!(attr = name, %err, "unreadable carrier");
                                continue;
                            }
                        }
                    } else {
                        AttrValue::String(raw)
                    };
                    fragment.carriers.insert(name.to_string(), value);
                }
                None => collect_carriers(&el.children, fragment),
            },
        }
    }
}
