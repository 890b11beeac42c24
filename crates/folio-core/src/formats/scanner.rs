// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lenient HTML scanner
//!
//! Builds a small element tree from an HTML fragment. Only what display
//! markup needs is supported: elements with attributes, void elements, text
//! with character references, and comments. Mismatched end tags close up to
//! the nearest open element of the same name and are ignored otherwise.

/// Elements that never have content
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is skipped entirely
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "template"];

#[derive(Debug, Clone, PartialEq)]
pub enum HtmlNode {
    Element(HtmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<HtmlNode>,
}

impl HtmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == name)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(HtmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(HtmlNode::Text(text));
        }
    }
}

fn collect_text(nodes: &[HtmlNode], out: &mut String) {
    for node in nodes {
        match node {
            HtmlNode::Text(t) => out.push_str(t),
            HtmlNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("offset {offset}: {message}")]
pub struct ScanError {
    pub offset: usize,
    pub message: String,
}

fn error(offset: usize, message: &str) -> ScanError {
    ScanError {
        offset,
        message: message.to_string(),
    }
}

/// True when `s` begins with something the scanner treats as markup
fn starts_markup(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.first() == Some(&b'<')
        && bytes
            .get(1)
            .is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
}

/// Parse an HTML fragment into its top-level nodes
pub fn parse_fragment(input: &str) -> Result<Vec<HtmlNode>, ScanError> {
    let mut stack = vec![HtmlElement::default()];
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];

        if !starts_markup(rest) {
            // A lone '<' is text; skip it before looking for the next tag
            let skip = usize::from(rest.starts_with('<'));
            let len = rest[skip..]
                .char_indices()
                .find(|(i, _)| starts_markup(&rest[skip + i..]))
                .map_or(rest.len(), |(i, _)| skip + i);
            top(&mut stack).push_text(decode_entities(&rest[..len]));
            pos += len;
            continue;
        }

        if let Some(body) = rest.strip_prefix("<!--") {
            let end = body
                .find("-->")
                .ok_or_else(|| error(pos, "unterminated comment"))?;
            pos += 4 + end + 3;
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest
                .find('>')
                .ok_or_else(|| error(pos, "unterminated declaration"))?;
            pos += end + 1;
            continue;
        }

        if let Some(body) = rest.strip_prefix("</") {
            let end = body
                .find('>')
                .ok_or_else(|| error(pos, "unterminated end tag"))?;
            let name = body[..end].trim().to_ascii_lowercase();
            pos += 2 + end + 1;
            close(&mut stack, &name);
            continue;
        }

        let (element, self_closing, consumed) = scan_start_tag(input, pos)?;
        pos += consumed;

        if SKIPPED_ELEMENTS.contains(&element.name.as_str()) && !self_closing {
            let closing = format!("</{}", element.name);
            let lower = input[pos..].to_ascii_lowercase();
            pos = match lower.find(&closing) {
                Some(i) => {
                    let after = pos + i;
                    input[after..].find('>').map_or(input.len(), |j| after + j + 1)
                }
                None => input.len(),
            };
            continue;
        }

        if self_closing || VOID_ELEMENTS.contains(&element.name.as_str()) {
            top(&mut stack).children.push(HtmlNode::Element(element));
        } else {
            stack.push(element);
        }
    }

    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    Ok(stack.pop().map(|root| root.children).unwrap_or_default())
}

fn top(stack: &mut [HtmlElement]) -> &mut HtmlElement {
    let last = stack.len() - 1;
    &mut stack[last]
}

fn pop_into_parent(stack: &mut Vec<HtmlElement>) {
    if stack.len() > 1 {
        if let Some(el) = stack.pop() {
            top(stack).children.push(HtmlNode::Element(el));
        }
    }
}

fn close(stack: &mut Vec<HtmlElement>, name: &str) {
    let Some(index) = stack.iter().skip(1).rposition(|el| el.name == name) else {
        return;
    };
    // rposition over the skipped iterator is relative to index 1
    let depth = index + 1;
    while stack.len() > depth {
        pop_into_parent(stack);
    }
}

/// Scan a start tag at `start`. Returns the element, whether it was
/// self-closing and the number of bytes consumed.
fn scan_start_tag(input: &str, start: usize) -> Result<(HtmlElement, bool, usize), ScanError> {
    let bytes = input.as_bytes();
    let mut i = start + 1;
    let name_end = i + bytes[i..]
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'_')))
        .unwrap_or(bytes.len() - i);
    let mut element = HtmlElement {
        name: input[i..name_end].to_ascii_lowercase(),
        ..HtmlElement::default()
    };
    i = name_end;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(error(start, "unterminated start tag")),
            Some(b'>') => return Ok((element, false, i + 1 - start)),
            Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                return Ok((element, true, i + 2 - start));
            }
            Some(b'/') => {
                i += 1;
                continue;
            }
            Some(_) => {}
        }

        let attr_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        if i == attr_start {
            // Stray '=' with no name
            i += 1;
            continue;
        }
        let attr_name = input[attr_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&quote @ (b'"' | b'\'')) => {
                    let value_start = i + 1;
                    let len = bytes[value_start..]
                        .iter()
                        .position(|&b| b == quote)
                        .ok_or_else(|| error(i, "unterminated attribute value"))?;
                    value = decode_entities(&input[value_start..value_start + len]);
                    i = value_start + len + 1;
                }
                Some(_) => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&input[value_start..i]);
                }
                None => return Err(error(start, "unterminated start tag")),
            }
        }
        if !element.has_attr(&attr_name) {
            element.attrs.push((attr_name, value));
        }
    }
}

/// Decode character references. Unknown references are kept literally.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 12)
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Escape text content
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value
pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &HtmlNode) -> &HtmlElement {
        match node {
            HtmlNode::Element(el) => el,
            HtmlNode::Text(t) => panic!("expected element, got text {t:?}"),
        }
    }

    #[test]
    fn test_nested_elements() {
        let nodes = parse_fragment(r#"<p class="x">Hello <strong>world</strong></p>"#).unwrap();
        assert_eq!(nodes.len(), 1);
        let p = element(&nodes[0]);
        assert_eq!(p.name, "p");
        assert_eq!(p.attr("class"), Some("x"));
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.text_content(), "Hello world");
    }

    #[test]
    fn test_void_and_self_closing() {
        let nodes = parse_fragment("<p>a<br>b<img src='x.png'/>c</p>").unwrap();
        let p = element(&nodes[0]);
        assert_eq!(p.children.len(), 5);
        assert_eq!(element(&p.children[3]).attr("src"), Some("x.png"));
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp; &#65;&#x42; &unknown; &"), "a <b> & AB &unknown; &");
        assert_eq!(escape_attr(r#"<"&">"#), "&lt;&quot;&amp;&quot;&gt;");
    }

    #[test]
    fn test_mismatched_end_tags() {
        let nodes = parse_fragment("<div><p>one</div><p>two</span></p>").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(element(&nodes[0]).name, "div");
        assert_eq!(element(&nodes[1]).text_content(), "two");
    }

    #[test]
    fn test_comments_and_lone_angle() {
        let nodes = parse_fragment("<!-- note --><p>1 < 2</p>").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(element(&nodes[0]).text_content(), "1 < 2");
    }

    #[test]
    fn test_script_skipped() {
        let nodes = parse_fragment("<script>if (a < b) {}</script><p>x</p>").unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_fragment("<p").unwrap_err().offset, 0);
        assert!(parse_fragment("<!-- open").is_err());
        assert!(parse_fragment(r#"<a href="x>"#).is_err());
    }

    #[test]
    fn test_multibyte_text() {
        let nodes = parse_fragment("<p>héllo — wörld</p>ñ").unwrap();
        assert_eq!(element(&nodes[0]).text_content(), "héllo — wörld");
        assert_eq!(nodes[1], HtmlNode::Text("ñ".into()));
    }
}
