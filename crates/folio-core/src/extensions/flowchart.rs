// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flowchart compiler for diagram-as-code blocks
//!
//! Accepts the common subset of Mermaid flowchart syntax (`graph`/`flowchart`
//! header, node shapes, edge chains with optional labels) and lays it out on a
//! simple rank grid as SVG.

use crate::formats::scanner::{escape_attr, escape_text};
use std::collections::HashMap;

const NODE_WIDTH: i64 = 120;
const NODE_HEIGHT: i64 = 40;
const GAP_X: i64 = 40;
const GAP_Y: i64 = 60;
const MARGIN: i64 = 20;

/// Lines that are accepted but carry nothing we draw
const IGNORED_KEYWORDS: &[&str] = &[
    "classDef", "class", "style", "linkStyle", "click", "subgraph", "end", "direction",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowchartError {
    #[error("expected 'graph' or 'flowchart' as the first non-empty line")]
    MissingHeader,

    #[error("invalid flowchart direction on line {line_no}: {direction} (expected TD/TB/LR/RL/BT)")]
    InvalidDirection { line_no: usize, direction: String },

    #[error("unsupported syntax on line {line_no}: {line}")]
    UnsupportedSyntax { line_no: usize, line: String },

    #[error("invalid node on line {line_no}: {token}")]
    InvalidNode { line_no: usize, token: String },

    #[error("empty node label on line {line_no}: {token}")]
    EmptyNodeLabel { line_no: usize, token: String },

    #[error("edge without a target on line {line_no}: {line}")]
    DanglingEdge { line_no: usize, line: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    TopDown,
    BottomUp,
    LeftRight,
    RightLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Rect,
    Round,
    Stadium,
    Subroutine,
    Cylinder,
    Circle,
    Rhombus,
    Hexagon,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowNode {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowHead {
    None,
    Arrow,
    Cross,
    Circle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub head: ArrowHead,
    pub dotted: bool,
    pub thick: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flowchart {
    pub direction: Direction,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl Flowchart {
    fn declare(&mut self, node: NodeRef) {
        match self.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => {
                if let Some((label, shape)) = node.shape {
                    existing.label = label;
                    existing.shape = shape;
                }
            }
            None => {
                let (label, shape) = node.shape.unwrap_or_else(|| (node.id.clone(), NodeShape::Rect));
                self.nodes.push(FlowNode {
                    id: node.id,
                    label,
                    shape,
                });
            }
        }
    }
}

struct NodeRef {
    id: String,
    shape: Option<(String, NodeShape)>,
}

/// Parse flowchart source
pub fn parse_flowchart(input: &str) -> Result<Flowchart, FlowchartError> {
    let mut chart = Flowchart::default();
    let mut saw_header = false;

    for (idx, raw_line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with("%%") {
            continue;
        }

        if !saw_header {
            let mut parts = trimmed.trim_end_matches(';').split_whitespace();
            let keyword = parts.next().unwrap_or_default();
            if keyword != "graph" && keyword != "flowchart" {
                return Err(FlowchartError::MissingHeader);
            }
            if let Some(direction) = parts.next() {
                chart.direction = match direction {
                    "TD" | "TB" => Direction::TopDown,
                    "BT" => Direction::BottomUp,
                    "LR" => Direction::LeftRight,
                    "RL" => Direction::RightLeft,
                    _ => {
                        return Err(FlowchartError::InvalidDirection {
                            line_no,
                            direction: direction.to_string(),
                        })
                    }
                };
            }
            saw_header = true;
            continue;
        }

        let first_word = trimmed.split_whitespace().next().unwrap_or_default();
        if IGNORED_KEYWORDS.contains(&first_word) {
            continue;
        }

        for statement in trimmed.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            parse_statement(&mut chart, statement, line_no)?;
        }
    }

    if !saw_header {
        return Err(FlowchartError::MissingHeader);
    }
    Ok(chart)
}

fn parse_statement(chart: &mut Flowchart, line: &str, line_no: usize) -> Result<(), FlowchartError> {
    let mut rest = line;
    let first = parse_node(&mut rest, line_no)?;
    let mut prev = first.id.clone();
    chart.declare(first);

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(());
        }
        let link = parse_link(&mut rest).ok_or_else(|| FlowchartError::UnsupportedSyntax {
            line_no,
            line: line.to_string(),
        })?;
        rest = rest.trim_start();
        if rest.is_empty() {
            return Err(FlowchartError::DanglingEdge {
                line_no,
                line: line.to_string(),
            });
        }
        let next = parse_node(&mut rest, line_no)?;
        let to = next.id.clone();
        chart.declare(next);
        chart.edges.push(FlowEdge {
            from: prev,
            to: to.clone(),
            label: link.label,
            head: link.head,
            dotted: link.dotted,
            thick: link.thick,
        });
        prev = to;
    }
}

/// Opening and closing delimiters, longest first
const SHAPES: &[(&str, &str, NodeShape)] = &[
    ("((", "))", NodeShape::Circle),
    ("([", "])", NodeShape::Stadium),
    ("[[", "]]", NodeShape::Subroutine),
    ("[(", ")]", NodeShape::Cylinder),
    ("{{", "}}", NodeShape::Hexagon),
    ("[", "]", NodeShape::Rect),
    ("(", ")", NodeShape::Round),
    ("{", "}", NodeShape::Rhombus),
    (">", "]", NodeShape::Flag),
];

fn parse_node(rest: &mut &str, line_no: usize) -> Result<NodeRef, FlowchartError> {
    let s = *rest;
    let id_len = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i);
    let token = || s.split_whitespace().next().unwrap_or_default().to_string();
    if id_len == 0 {
        return Err(FlowchartError::InvalidNode {
            line_no,
            token: token(),
        });
    }
    let id = s[..id_len].to_string();
    let after = &s[id_len..];

    for (open, close, shape) in SHAPES {
        let Some(body) = after.strip_prefix(open) else {
            continue;
        };
        let end = body.find(close).ok_or_else(|| FlowchartError::InvalidNode {
            line_no,
            token: token(),
        })?;
        let label = body[..end].trim().trim_matches('"').trim();
        if label.is_empty() {
            return Err(FlowchartError::EmptyNodeLabel {
                line_no,
                token: token(),
            });
        }
        *rest = &body[end + close.len()..];
        return Ok(NodeRef {
            id,
            shape: Some((label.to_string(), *shape)),
        });
    }

    *rest = after;
    Ok(NodeRef { id, shape: None })
}

struct Link {
    label: Option<String>,
    head: ArrowHead,
    dotted: bool,
    thick: bool,
}

fn take_operator<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = *rest;
    let mut len = s
        .char_indices()
        .find(|(_, c)| !matches!(c, '-' | '=' | '.' | '<' | '>'))
        .map_or(s.len(), |(i, _)| i);
    // Trailing cross/circle heads: `--x`, `--o`
    if len > 0 && s[..len].ends_with(['-', '=']) {
        let mut tail = s[len..].chars();
        if let Some('x' | 'o') = tail.next() {
            if tail.next().map_or(true, |c| c.is_whitespace() || c == '|') {
                len += 1;
            }
        }
    }
    let op = &s[..len];
    let strokes = op.chars().filter(|c| matches!(c, '-' | '=')).count();
    if strokes < 2 && !(strokes >= 1 && op.contains('.')) {
        return None;
    }
    *rest = &s[len..];
    Some(op)
}

fn parse_link(rest: &mut &str) -> Option<Link> {
    let mut op = take_operator(rest)?;
    let mut label = None;

    let after = rest.trim_start();
    if let Some(body) = after.strip_prefix('|') {
        let end = body.find('|')?;
        label = Some(body[..end].trim().to_string());
        *rest = &body[end + 1..];
    } else if (op == "--" || op == "==" || op == "-.") && !after.is_empty() {
        // `A -- text --> B`, `A -. text .-> B`
        let end = if op == "-." {
            after.find(".-")?
        } else {
            after.find(['-', '='])?
        };
        let text = after[..end].trim();
        if text.is_empty() {
            return None;
        }
        label = Some(text.to_string());
        let mut tail = &after[end..];
        op = take_operator(&mut tail)?;
        *rest = tail;
    }

    let head = if op.ends_with('>') {
        ArrowHead::Arrow
    } else if op.ends_with('x') {
        ArrowHead::Cross
    } else if op.ends_with('o') {
        ArrowHead::Circle
    } else {
        ArrowHead::None
    };
    Some(Link {
        label: label.filter(|l| !l.is_empty()),
        head,
        dotted: op.contains('.'),
        thick: op.contains('='),
    })
}

/// Compiled diagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramArtifact {
    pub svg: String,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Compiles diagram source into a drawable artifact
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, source: &str) -> Result<DiagramArtifact, FlowchartError>;
}

/// Built-in renderer for flowchart sources
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowchartRenderer;

impl DiagramRenderer for FlowchartRenderer {
    fn render(&self, source: &str) -> Result<DiagramArtifact, FlowchartError> {
        let chart = parse_flowchart(source)?;
        Ok(DiagramArtifact {
            svg: render_svg(&chart),
            node_count: chart.nodes.len(),
            edge_count: chart.edges.len(),
        })
    }
}

/// Longest-path rank of every node; cycles are cut after `n` relaxations
fn ranks(chart: &Flowchart) -> HashMap<&str, usize> {
    let mut rank: HashMap<&str, usize> = chart.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for _ in 0..chart.nodes.len() {
        let mut changed = false;
        for edge in &chart.edges {
            let from = rank.get(edge.from.as_str()).copied().unwrap_or(0);
            let to = rank.entry(edge.to.as_str()).or_insert(0);
            if *to < from + 1 && from + 1 < chart.nodes.len() {
                *to = from + 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    rank
}

pub fn render_svg(chart: &Flowchart) -> String {
    let rank = ranks(chart);
    let max_rank = rank.values().copied().max().unwrap_or(0);
    let mut columns = vec![0i64; max_rank + 1];
    let mut centers: HashMap<&str, (i64, i64)> = HashMap::new();

    for node in &chart.nodes {
        let r = rank.get(node.id.as_str()).copied().unwrap_or(0);
        let col = columns[r];
        columns[r] += 1;
        let r = (match chart.direction {
            Direction::BottomUp | Direction::RightLeft => max_rank - r,
            _ => r,
        }) as i64;
        let (x, y) = match chart.direction {
            Direction::TopDown | Direction::BottomUp => {
                (col * (NODE_WIDTH + GAP_X), r * (NODE_HEIGHT + GAP_Y))
            }
            Direction::LeftRight | Direction::RightLeft => {
                (r * (NODE_WIDTH + GAP_X), col * (NODE_HEIGHT + GAP_Y))
            }
        };
        centers.insert(
            node.id.as_str(),
            (MARGIN + x + NODE_WIDTH / 2, MARGIN + y + NODE_HEIGHT / 2),
        );
    }

    let width = centers.values().map(|c| c.0).max().unwrap_or(0) + NODE_WIDTH / 2 + MARGIN;
    let height = centers.values().map(|c| c.1).max().unwrap_or(0) + NODE_HEIGHT / 2 + MARGIN;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    svg.push_str(
        r#"<defs><marker id="arrow" viewBox="0 0 10 10" refX="10" refY="5" markerWidth="8" markerHeight="8" orient="auto"><path d="M0,0L10,5L0,10z"/></marker></defs>"#,
    );

    for edge in &chart.edges {
        let (Some(&(x1, y1)), Some(&(x2, y2))) =
            (centers.get(edge.from.as_str()), centers.get(edge.to.as_str()))
        else {
            continue;
        };
        let mut style = format!(r#"stroke="black" stroke-width="{}""#, if edge.thick { 3 } else { 1 });
        if edge.dotted {
            style.push_str(r#" stroke-dasharray="4 3""#);
        }
        if edge.head == ArrowHead::Arrow {
            style.push_str(r#" marker-end="url(#arrow)""#);
        }
        svg.push_str(&format!(r#"<line x1="{x1}" y1="{y1}" x2="{x2}" y2="{y2}" {style}/>"#));
        if let Some(label) = &edge.label {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-size="12">{}</text>"#,
                (x1 + x2) / 2,
                (y1 + y2) / 2,
                escape_text(label)
            ));
        }
    }

    for node in &chart.nodes {
        let Some(&(cx, cy)) = centers.get(node.id.as_str()) else {
            continue;
        };
        let (left, top) = (cx - NODE_WIDTH / 2, cy - NODE_HEIGHT / 2);
        let shape = match node.shape {
            NodeShape::Circle => format!(
                r#"<ellipse cx="{cx}" cy="{cy}" rx="{}" ry="{}""#,
                NODE_WIDTH / 2,
                NODE_HEIGHT / 2
            ),
            NodeShape::Rhombus | NodeShape::Hexagon => format!(
                r#"<polygon points="{},{cy} {cx},{top} {},{cy} {cx},{}""#,
                left,
                left + NODE_WIDTH,
                top + NODE_HEIGHT
            ),
            NodeShape::Round | NodeShape::Stadium => format!(
                r#"<rect x="{left}" y="{top}" width="{NODE_WIDTH}" height="{NODE_HEIGHT}" rx="{}""#,
                NODE_HEIGHT / 2
            ),
            _ => format!(
                r#"<rect x="{left}" y="{top}" width="{NODE_WIDTH}" height="{NODE_HEIGHT}""#
            ),
        };
        svg.push_str(&format!(
            r#"<g data-node="{}">{shape} fill="white" stroke="black"/><text x="{cx}" y="{}" text-anchor="middle" font-size="14">{}</text></g>"#,
            escape_attr(&node.id),
            cy + 5,
            escape_text(&node.label)
        ));
    }

    svg.push_str("</svg>");
    svg
}
