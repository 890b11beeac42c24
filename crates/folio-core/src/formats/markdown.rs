// SPDX-License-Identifier: AGPL-3.0-or-later
//! Best-effort Markdown import and export using comrak
//!
//! This conversion is lossy in both directions and makes no round-trip
//! promise. Constructs with no counterpart in the schema are imported as
//! unsupported-content placeholders and exported as HTML comment markers.
//! Underline marks, task checkboxes and image dimensions are dropped.

use crate::extensions::{
    diagram_code::diagram_source, external_diagram::diagram_payload,
    placeholder::source_label, DIAGRAM_CODE_TYPE, EXTERNAL_DIAGRAM_TYPE, PLACEHOLDER_TYPE,
};
use crate::model::{AttrValue, Element, Mark, Node, TextRun};
use crate::schema::Schema;
use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{parse_document, Arena, Options};

const DIAGRAM_FENCE: &str = "mermaid";

fn comrak_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.footnotes = true;
    options
}

/// Import Markdown into a document valid under [`Schema::standard`]
pub fn import_markdown(input: &str) -> Node {
    import_markdown_with(&Schema::standard(), input)
}

/// Import Markdown and normalize it against `schema`
pub fn import_markdown_with(schema: &Schema, input: &str) -> Node {
    let arena = Arena::new();
    let root = parse_document(&arena, input, &comrak_options());
    let blocks = parse_blocks(root);

    let (doc, violations) = schema.normalize(Node::doc(blocks));
    if !violations.is_empty() {
        tracing::debug!(count = violations.len(), "markdown import normalized away content");
    }
    doc
}

fn parse_blocks<'a>(node: &'a AstNode<'a>) -> Vec<Node> {
    node.children().filter_map(parse_block).collect()
}

fn placeholder(label: &str) -> Node {
    Element::new(PLACEHOLDER_TYPE)
        .with_attr("sourceLabel", label)
        .into()
}

fn parse_block<'a>(node: &'a AstNode<'a>) -> Option<Node> {
    let data = node.data.borrow();

    let block = match &data.value {
        NodeValue::Paragraph => {
            if let Some(image) = lone_image(node) {
                return Some(image);
            }
            Node::paragraph(parse_inlines(node, &[]))
        }

        NodeValue::Heading(heading) => Element::new("heading")
            .with_attr("level", i64::from(heading.level))
            .with_content(parse_inlines(node, &[]))
            .into(),

        NodeValue::CodeBlock(code) => {
            let language = code.info.split_whitespace().next().unwrap_or_default();
            let literal = code.literal.strip_suffix('\n').unwrap_or(&code.literal);
            if language == DIAGRAM_FENCE {
                Element::new(DIAGRAM_CODE_TYPE)
                    .with_attr("source", literal)
                    .into()
            } else {
                let language = (!language.is_empty()).then(|| language.to_string());
                let content = if literal.is_empty() {
                    Vec::new()
                } else {
                    vec![Node::text(literal)]
                };
                Element::new("codeBlock")
                    .with_attr("language", language)
                    .with_content(content)
                    .into()
            }
        }

        NodeValue::BlockQuote => Element::new("blockquote")
            .with_content(parse_blocks(node))
            .into(),

        NodeValue::List(list) => {
            let items = node
                .children()
                .map(|item| Element::new("listItem").with_content(parse_blocks(item)).into())
                .collect();
            if list.list_type == ListType::Ordered {
                Element::new("orderedList")
                    .with_attr("order", list.start.max(1) as i64)
                    .with_content(items)
                    .into()
            } else {
                Element::new("bulletList").with_content(items).into()
            }
        }

        NodeValue::ThematicBreak => Element::new("horizontalRule").into(),

        NodeValue::Table(_) => {
            let rows = node
                .children()
                .filter_map(|row| {
                    let NodeValue::TableRow(is_header) = row.data.borrow().value else {
                        return None;
                    };
                    let cell_type = if is_header { "tableHeader" } else { "tableCell" };
                    let cells = row
                        .children()
                        .map(|cell| {
                            Element::new(cell_type)
                                .with_content(vec![Node::paragraph(parse_inlines(cell, &[]))])
                                .into()
                        })
                        .collect();
                    Some(Element::new("tableRow").with_content(cells).into())
                })
                .collect();
            Element::new("table").with_content(rows).into()
        }

        NodeValue::HtmlBlock(_) => placeholder("html"),

        NodeValue::FootnoteDefinition(def) => placeholder(&format!("footnote {}", def.name)),

        NodeValue::Document | NodeValue::Item(_) | NodeValue::TaskItem(_) => return None,

        _ => placeholder("markdown"),
    };
    Some(block)
}

/// A paragraph holding a single image becomes an image block
fn lone_image<'a>(node: &'a AstNode<'a>) -> Option<Node> {
    let mut children = node.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    let data = only.data.borrow();
    let NodeValue::Image(link) = &data.value else {
        return None;
    };
    let alt = plain_text(only);
    Some(
        Element::new("image")
            .with_attr("src", link.url.as_str())
            .with_attr("alt", (!alt.is_empty()).then_some(alt))
            .with_attr("title", (!link.title.is_empty()).then(|| link.title.clone()))
            .into(),
    )
}

fn plain_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut out = String::new();
    for child in node.descendants() {
        match &child.data.borrow().value {
            NodeValue::Text(text) => out.push_str(text),
            NodeValue::Code(code) => out.push_str(&code.literal),
            _ => {}
        }
    }
    out
}

fn parse_inlines<'a>(node: &'a AstNode<'a>, marks: &[Mark]) -> Vec<Node> {
    let mut out = Vec::new();
    for child in node.children() {
        parse_inline(child, marks, &mut out);
    }
    out
}

fn with_mark(marks: &[Mark], mark: Mark) -> Vec<Mark> {
    let mut marks = marks.to_vec();
    if !marks.iter().any(|m| m.mark_type == mark.mark_type) {
        marks.push(mark);
    }
    marks
}

fn parse_inline<'a>(node: &'a AstNode<'a>, marks: &[Mark], out: &mut Vec<Node>) {
    let data = node.data.borrow();

    match &data.value {
        NodeValue::Text(text) => out.push(Node::marked_text(text.as_str(), marks.to_vec())),

        NodeValue::SoftBreak => out.push(Node::marked_text(" ", marks.to_vec())),

        NodeValue::LineBreak => out.push(Element::new("hardBreak").into()),

        NodeValue::Code(code) => out.push(Node::marked_text(
            code.literal.as_str(),
            with_mark(marks, Mark::new("code")),
        )),

        NodeValue::Emph => out.extend(parse_inlines(node, &with_mark(marks, Mark::new("italic")))),

        NodeValue::Strong => out.extend(parse_inlines(node, &with_mark(marks, Mark::new("bold")))),

        NodeValue::Strikethrough => {
            out.extend(parse_inlines(node, &with_mark(marks, Mark::new("strike"))))
        }

        NodeValue::Link(link) => {
            let mark = Mark::new("link")
                .with_attr("href", link.url.as_str())
                .with_attr("title", (!link.title.is_empty()).then(|| link.title.clone()));
            out.extend(parse_inlines(node, &with_mark(marks, mark)));
        }

        NodeValue::Image(_) => {
            let alt = plain_text(node);
            if !alt.is_empty() {
                out.push(Node::marked_text(alt, marks.to_vec()));
            }
        }

        NodeValue::FootnoteReference(reference) => {
            out.push(Node::marked_text(format!("[^{}]", reference.name), marks.to_vec()))
        }

        NodeValue::HtmlInline(html) => out.push(Node::marked_text(html.as_str(), marks.to_vec())),

        _ => out.extend(parse_inlines(node, marks)),
    }
}

/// Export a document as Markdown. Lossy: see the module docs.
pub fn export_markdown(doc: &Node) -> String {
    let blocks: Vec<String> = doc.content().iter().map(render_block).collect();
    blocks.join("\n\n")
}

fn render_blocks(nodes: &[Node]) -> String {
    nodes.iter().map(render_block).collect::<Vec<_>>().join("\n\n")
}

fn prefix_lines(text: &str, first: &str, rest: &str) -> String {
    let mut out = String::new();
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let prefix = if i == 0 { first } else { rest };
        if line.is_empty() {
            out.push_str(prefix.trim_end());
        } else {
            out.push_str(prefix);
            out.push_str(line);
        }
    }
    if out.is_empty() {
        out.push_str(first.trim_end());
    }
    out
}

fn str_attr<'a>(el: &'a Element, key: &str) -> Option<&'a str> {
    el.attr(key).and_then(AttrValue::as_str)
}

fn render_block(node: &Node) -> String {
    let Node::Element(el) = node else {
        return render_inlines(std::slice::from_ref(node));
    };

    match el.node_type.as_str() {
        "paragraph" => render_inlines(&el.content),

        "heading" => {
            let level = el.attr("level").and_then(AttrValue::as_i64).unwrap_or(1).clamp(1, 6);
            format!("{} {}", "#".repeat(level as usize), render_inlines(&el.content))
        }

        "codeBlock" => {
            let language = str_attr(el, "language").unwrap_or_default();
            let code: String = el.content.iter().map(Node::text_content).collect();
            fenced(language, &code)
        }

        "blockquote" => prefix_lines(&render_blocks(&el.content), "> ", "> "),

        "horizontalRule" => "---".to_string(),

        "image" => {
            let mut out = format!(
                "![{}]({}",
                str_attr(el, "alt").unwrap_or_default(),
                str_attr(el, "src").unwrap_or_default()
            );
            if let Some(title) = str_attr(el, "title") {
                out.push_str(&format!(" \"{}\"", title.replace('"', "\\\"")));
            }
            out.push(')');
            out
        }

        "bulletList" | "orderedList" => {
            let start = el.attr("order").and_then(AttrValue::as_i64).unwrap_or(1);
            let ordered = el.node_type == "orderedList";
            el.content
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let marker = if ordered {
                        format!("{}. ", start + i as i64)
                    } else {
                        "- ".to_string()
                    };
                    let indent = " ".repeat(marker.len());
                    prefix_lines(&render_blocks(item.content()), &marker, &indent)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }

        "table" => render_table(el),

        DIAGRAM_CODE_TYPE => fenced(DIAGRAM_FENCE, diagram_source(el)),

        EXTERNAL_DIAGRAM_TYPE => {
            format!("<!-- {}: {} bytes -->", EXTERNAL_DIAGRAM_TYPE, diagram_payload(el).len())
        }

        PLACEHOLDER_TYPE => format!("<!-- unsupported: {} -->", source_label(el)),

        other => format!("<!-- unsupported: {other} -->"),
    }
}

fn fenced(language: &str, code: &str) -> String {
    let fence = if code.contains("```") { "~~~~" } else { "```" };
    format!("{fence}{language}\n{code}\n{fence}")
}

fn render_table(table: &Element) -> String {
    let rows: Vec<Vec<String>> = table
        .content
        .iter()
        .map(|row| {
            row.content()
                .iter()
                .map(|cell| {
                    cell.content()
                        .iter()
                        .map(render_block)
                        .collect::<Vec<_>>()
                        .join(" ")
                        .replace('\n', " ")
                        .replace('|', "\\|")
                })
                .collect()
        })
        .collect();
    let Some(width) = rows.iter().map(Vec::len).max() else {
        return String::new();
    };

    let line = |cells: &[String]| {
        let mut out = String::from("|");
        for i in 0..width {
            out.push(' ');
            out.push_str(cells.get(i).map(String::as_str).unwrap_or_default());
            out.push_str(" |");
        }
        out
    };

    let mut lines = vec![line(&rows[0]), line(&vec!["---".to_string(); width])];
    lines.extend(rows[1..].iter().map(|r| line(r)));
    lines.join("\n")
}

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn render_inlines(nodes: &[Node]) -> String {
    let mut out = String::new();
    // Adjacent runs with identical marks are emitted as one span
    let mut pending: Option<TextRun> = None;
    for node in nodes {
        match node {
            Node::Text(run) => match pending.as_mut() {
                Some(prev) if prev.marks == run.marks => prev.text.push_str(&run.text),
                _ => {
                    if let Some(prev) = pending.replace(run.clone()) {
                        render_run(&mut out, &prev);
                    }
                }
            },
            Node::Element(el) => {
                if let Some(prev) = pending.take() {
                    render_run(&mut out, &prev);
                }
                if el.node_type == "hardBreak" {
                    out.push_str("  \n");
                }
            }
        }
    }
    if let Some(prev) = pending {
        render_run(&mut out, &prev);
    }
    out
}

fn render_run(out: &mut String, run: &TextRun) {
    let mut text = if run.has_mark("code") {
        format!("`{}`", run.text)
    } else {
        escape_markdown(&run.text)
    };
    for (mark, delim) in [("strike", "~~"), ("italic", "*"), ("bold", "**")] {
        if run.has_mark(mark) {
            text = format!("{delim}{text}{delim}");
        }
    }
    if let Some(link) = run.marks.iter().find(|m| m.mark_type == "link") {
        let href = link.attrs.get("href").and_then(AttrValue::as_str).unwrap_or_default();
        text = match link.attrs.get("title").and_then(AttrValue::as_str) {
            Some(title) => format!("[{text}]({href} \"{}\")", title.replace('"', "\\\"")),
            None => format!("[{text}]({href})"),
        };
    }
    out.push_str(&text);
}
