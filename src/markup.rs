//! Tolerant HTML tokenizer and tree builder for the preview sandbox.
//!
//! This is not a conforming HTML5 parser. It covers what hand-written demo
//! markup needs: raw-text elements (`script`, `style`), void elements,
//! comments, entity decoding, implied end tags for the common cases
//! (`p`, `li`, table cells, options) and recovery from stray or missing end
//! tags. It never fails; malformed input still yields a tree.

use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Content is taken literally up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Like raw text, but entities are still decoded.
const RCDATA_ELEMENTS: &[&str] = &["textarea", "title"];

/// Opening one of these closes an open `p`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol",
    "p", "pre", "section", "table", "ul",
];

const HEAD_CONTENT: &[&str] = &["base", "link", "meta", "script", "style", "title", "noscript"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarkupNode {
    Element {
        name: String,
        attributes: Vec<Attribute>,
        children: Vec<MarkupNode>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

impl MarkupNode {
    fn element(name: &str, attributes: Vec<Attribute>, children: Vec<MarkupNode>) -> Self {
        MarkupNode::Element {
            name: name.to_string(),
            attributes,
            children,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            MarkupNode::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn children(&self) -> &[MarkupNode] {
        match self {
            MarkupNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            MarkupNode::Element { attributes, .. } => attributes
                .iter()
                .find(|a| a.name == key)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            MarkupNode::Text { text } => out.push_str(text),
            MarkupNode::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
            MarkupNode::Comment { .. } => {}
        }
    }

    fn is_blank_text(&self) -> bool {
        matches!(self, MarkupNode::Text { text } if text.trim().is_empty())
    }
}

/// A parsed page: always an `html` root holding exactly one `head` and one
/// `body`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedDocument {
    pub doctype: Option<String>,
    pub html: MarkupNode,
}

impl ParsedDocument {
    pub fn head(&self) -> &MarkupNode {
        &self.html.children()[0]
    }

    pub fn body(&self) -> &MarkupNode {
        &self.html.children()[1]
    }
}

/// Parse a complete page, normalizing it to `html > (head, body)`.
pub fn parse_document(input: &str) -> ParsedDocument {
    let mut builder = TreeBuilder::new(Mode::Document);
    for token in Tokenizer::new(input) {
        builder.feed(token);
    }
    let doctype = builder.doctype.take();
    let roots = builder.finish();
    ParsedDocument {
        doctype,
        html: normalize_document(roots),
    }
}

/// Parse markup meant for insertion into an existing element
/// (`innerHTML`). Document-level tags are ignored.
pub fn parse_fragment(input: &str) -> Vec<MarkupNode> {
    let mut builder = TreeBuilder::new(Mode::Fragment);
    for token in Tokenizer::new(input) {
        builder.feed(token);
    }
    builder.finish()
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Doctype(String),
    StartTag {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag(String),
    Text(String),
    Comment(String),
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Set after a raw-text start tag: the next token is its literal content.
    raw_text: Option<(String, bool)>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw_text: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn read_raw_text(&mut self, name: &str, decode: bool) -> Option<Token> {
        let rest = self.rest();
        let close = format!("</{}", name);
        let end = find_ignore_ascii_case(rest, &close).unwrap_or(rest.len());
        self.pos += end;
        if end == 0 {
            return None;
        }
        let text = &rest[..end];
        Some(Token::Text(if decode {
            decode_entities(text).into_owned()
        } else {
            text.to_string()
        }))
    }

    fn read_text(&mut self) -> Token {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        // A lone '<' that does not open markup is plain text.
        let mut end = 1;
        while end < bytes.len() {
            if bytes[end] == b'<' && opens_markup(&rest[end..]) {
                break;
            }
            end += 1;
        }
        self.pos += end;
        Token::Text(decode_entities(&rest[..end]).into_owned())
    }

    fn read_comment(&mut self) -> Token {
        let body = &self.rest()[4..];
        match body.find("-->") {
            Some(end) => {
                self.pos += 4 + end + 3;
                Token::Comment(body[..end].to_string())
            }
            None => {
                self.pos = self.input.len();
                Token::Comment(body.to_string())
            }
        }
    }

    /// `<!...>` and `<?...>`: doctype or a bogus comment.
    fn read_declaration(&mut self) -> Token {
        let rest = self.rest();
        let end = rest.find('>').unwrap_or(rest.len());
        let inner = &rest[2..end];
        self.pos += (end + 1).min(rest.len());
        let is_doctype = inner
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("doctype"));
        match inner.get(7..) {
            Some(name) if is_doctype => Token::Doctype(name.trim().to_string()),
            _ => Token::Comment(inner.to_string()),
        }
    }

    fn read_end_tag(&mut self) -> Token {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut i = 2;
        while i < bytes.len() && !is_tag_name_end(bytes[i]) {
            i += 1;
        }
        let name = rest[2..i].to_ascii_lowercase();
        let end = rest[i..].find('>').map(|p| i + p + 1).unwrap_or(rest.len());
        self.pos += end;
        Token::EndTag(name)
    }

    fn read_start_tag(&mut self) -> Token {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut i = 1;
        while i < bytes.len() && !is_tag_name_end(bytes[i]) {
            i += 1;
        }
        let name = rest[1..i].to_ascii_lowercase();
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut self_closing = false;

        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    i += 1;
                    if bytes.get(i) == Some(&b'>') {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                    continue;
                }
                _ => {}
            }

            let name_start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            // '=' with no name in front: consume it so the loop advances.
            if i == name_start {
                i += 1;
                continue;
            }
            let attr_name = rest[name_start..i].to_ascii_lowercase();

            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let mut value = String::new();
            if bytes.get(j) == Some(&b'=') {
                j += 1;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                match bytes.get(j) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let start = j + 1;
                        let close = rest[start..]
                            .find(quote as char)
                            .map(|p| start + p)
                            .unwrap_or(rest.len());
                        value = decode_entities(&rest[start..close]).into_owned();
                        j = (close + 1).min(rest.len());
                    }
                    _ => {
                        let start = j;
                        while j < bytes.len() && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>'
                        {
                            j += 1;
                        }
                        value = decode_entities(&rest[start..j]).into_owned();
                    }
                }
                i = j;
            }

            if !attributes.iter().any(|a| a.name == attr_name) {
                attributes.push(Attribute {
                    name: attr_name,
                    value,
                });
            }
        }

        self.pos += i;
        if !self_closing {
            if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                self.raw_text = Some((name.clone(), false));
            } else if RCDATA_ELEMENTS.contains(&name.as_str()) {
                self.raw_text = Some((name.clone(), true));
            }
        }
        Token::StartTag {
            name,
            attributes,
            self_closing,
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some((name, decode)) = self.raw_text.take() {
            if let Some(text) = self.read_raw_text(&name, decode) {
                return Some(text);
            }
        }

        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }
        if !rest.starts_with('<') || !opens_markup(rest) {
            return Some(self.read_text());
        }
        let token = if rest.starts_with("<!--") {
            self.read_comment()
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            self.read_declaration()
        } else if rest.starts_with("</") {
            self.read_end_tag()
        } else {
            self.read_start_tag()
        };
        Some(token)
    }
}

fn opens_markup(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes.get(1) {
        Some(b'!') | Some(b'?') => true,
        Some(b'/') => bytes.get(2).is_some_and(|b| b.is_ascii_alphabetic()),
        Some(b) => b.is_ascii_alphabetic(),
        None => false,
    }
}

fn is_tag_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>'
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Decode character references. Unknown or unterminated references are kept
/// as written.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];
        let decoded = candidate
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 32)
            .and_then(|semi| decode_reference(&candidate[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(numeric) = reference.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code).filter(|&c| c != '\0');
    }
    let c = match reference {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        "deg" => '\u{b0}',
        "euro" => '\u{20ac}',
        "larr" => '\u{2190}',
        "rarr" => '\u{2192}',
        "uarr" => '\u{2191}',
        "darr" => '\u{2193}',
        "hearts" => '\u{2665}',
        "check" => '\u{2713}',
        _ => return None,
    };
    Some(c)
}

// ============================================================================
// Tree builder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Document,
    Fragment,
}

struct OpenElement {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<MarkupNode>,
}

struct TreeBuilder {
    mode: Mode,
    stack: Vec<OpenElement>,
    /// How many elements of each name are on the stack
    open_counts: HashMap<String, usize>,
    roots: Vec<MarkupNode>,
    doctype: Option<String>,
    seen: [bool; 3],
}

impl TreeBuilder {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            stack: Vec::new(),
            open_counts: HashMap::new(),
            roots: Vec::new(),
            doctype: None,
            seen: [false; 3],
        }
    }

    fn insert(&mut self, node: MarkupNode) {
        let siblings = match self.stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        // Adjacent text merges into one node.
        if let MarkupNode::Text { text } = &node {
            if let Some(MarkupNode::Text { text: previous }) = siblings.last_mut() {
                previous.push_str(text);
                return;
            }
        }
        siblings.push(node);
    }

    fn push(&mut self, open: OpenElement) {
        *self.open_counts.entry(open.name.clone()).or_default() += 1;
        self.stack.push(open);
    }

    fn pop(&mut self) {
        if let Some(open) = self.stack.pop() {
            if let Some(count) = self.open_counts.get_mut(&open.name) {
                *count = count.saturating_sub(1);
            }
            self.insert(MarkupNode::Element {
                name: open.name,
                attributes: open.attributes,
                children: open.children,
            });
        }
    }

    fn position_of(&self, name: &str, boundaries: &[&str]) -> Option<usize> {
        // Skip the walk when nothing by that name is open; deep nesting would
        // otherwise rescan the whole stack on every start tag.
        if self.open_counts.get(name).copied().unwrap_or(0) == 0 {
            return None;
        }
        for (index, open) in self.stack.iter().enumerate().rev() {
            if open.name == name {
                return Some(index);
            }
            if boundaries.contains(&open.name.as_str()) {
                return None;
            }
        }
        None
    }

    fn close_through(&mut self, index: usize) {
        while self.stack.len() > index {
            self.pop();
        }
    }

    fn close_nearest(&mut self, names: &[&str], boundaries: &[&str]) {
        let found = names
            .iter()
            .filter_map(|name| self.position_of(name, boundaries))
            .max();
        if let Some(index) = found {
            self.close_through(index);
        }
    }

    fn close_implied(&mut self, name: &str) {
        match name {
            "li" => self.close_nearest(&["li"], &["ul", "ol"]),
            "dt" | "dd" => self.close_nearest(&["dt", "dd"], &["dl"]),
            "option" => self.close_nearest(&["option"], &["select", "datalist"]),
            "tr" => self.close_nearest(&["tr"], &["table", "thead", "tbody", "tfoot"]),
            "td" | "th" => self.close_nearest(&["td", "th"], &["tr", "table"]),
            "thead" | "tbody" | "tfoot" => {
                self.close_nearest(&["thead", "tbody", "tfoot"], &["table"])
            }
            _ => {}
        }
        if CLOSES_PARAGRAPH.contains(&name) {
            self.close_nearest(&["p"], &["button", "td", "th", "li"]);
        }
    }

    /// Returns true when a document-level tag was absorbed.
    fn handle_document_tag(&mut self, name: &str, is_end: bool) -> bool {
        let slot = match name {
            "html" => 0,
            "head" => 1,
            "body" => 2,
            _ => return false,
        };
        if self.mode == Mode::Fragment {
            return true;
        }
        if is_end {
            // </head> closes the head; </body> and </html> are left implicit
            // so trailing content still lands in the body.
            if slot == 1 {
                if let Some(index) = self.position_of("head", &[]) {
                    self.close_through(index);
                }
            }
            return true;
        }
        if self.seen[slot] || (slot == 1 && self.seen[2]) {
            return true;
        }
        self.seen[slot] = true;
        if slot == 2 {
            if let Some(index) = self.position_of("head", &[]) {
                self.close_through(index);
            }
        }
        false
    }

    fn feed(&mut self, token: Token) {
        match token {
            Token::Doctype(name) => {
                if self.doctype.is_none() && self.mode == Mode::Document {
                    self.doctype = Some(name);
                }
            }
            Token::Text(text) => self.insert(MarkupNode::Text { text }),
            Token::Comment(text) => self.insert(MarkupNode::Comment { text }),
            Token::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                if self.handle_document_tag(&name, false) {
                    return;
                }
                self.close_implied(&name);
                if VOID_ELEMENTS.contains(&name.as_str()) || self_closing {
                    self.insert(MarkupNode::element(&name, attributes, Vec::new()));
                } else {
                    self.push(OpenElement {
                        name,
                        attributes,
                        children: Vec::new(),
                    });
                }
            }
            Token::EndTag(name) => {
                if self.handle_document_tag(&name, true) {
                    return;
                }
                match self.position_of(&name, &[]) {
                    Some(index) => self.close_through(index),
                    None if name == "p" => {
                        self.insert(MarkupNode::element("p", Vec::new(), Vec::new()))
                    }
                    None if name == "br" => {
                        self.insert(MarkupNode::element("br", Vec::new(), Vec::new()))
                    }
                    None => {}
                }
            }
        }
    }

    fn finish(mut self) -> Vec<MarkupNode> {
        while !self.stack.is_empty() {
            self.pop();
        }
        self.roots
    }
}

/// Rearrange whatever the builder produced into `html > (head, body)`.
fn normalize_document(roots: Vec<MarkupNode>) -> MarkupNode {
    let mut html_attributes = Vec::new();
    let mut loose = Vec::new();
    for node in roots {
        match node {
            MarkupNode::Element {
                name,
                attributes,
                children,
            } if name == "html" => {
                html_attributes = attributes;
                loose.extend(children);
            }
            other => loose.push(other),
        }
    }

    let mut head: Option<MarkupNode> = None;
    let mut body: Option<MarkupNode> = None;
    let mut before_body = Vec::new();
    let mut after_body = Vec::new();
    for node in loose {
        match node.name() {
            Some("head") if head.is_none() => head = Some(node),
            Some("body") if body.is_none() => body = Some(node),
            _ if node.is_blank_text() => {}
            _ if body.is_none() => before_body.push(node),
            _ => after_body.push(node),
        }
    }

    let (head_attributes, mut head_children) = match head {
        Some(MarkupNode::Element {
            attributes,
            children,
            ..
        }) => (attributes, children),
        _ => (Vec::new(), Vec::new()),
    };
    let (body_attributes, mut body_children) = match body {
        Some(MarkupNode::Element {
            attributes,
            children,
            ..
        }) => (attributes, children),
        _ => (Vec::new(), Vec::new()),
    };

    // Head-only content that precedes the body stays in the head; everything
    // else is body content, in order.
    let mut leading = Vec::new();
    let mut in_head = true;
    for node in before_body {
        let head_like = matches!(node.name(), Some(n) if HEAD_CONTENT.contains(&n))
            || matches!(node, MarkupNode::Comment { .. });
        if in_head && head_like {
            head_children.push(node);
        } else {
            in_head = false;
            leading.push(node);
        }
    }
    leading.append(&mut body_children);
    leading.extend(after_body);

    MarkupNode::element(
        "html",
        html_attributes,
        vec![
            MarkupNode::element("head", head_attributes, head_children),
            MarkupNode::element("body", body_attributes, leading),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[MarkupNode]) -> Vec<&str> {
        nodes.iter().filter_map(|n| n.name()).collect()
    }

    #[test]
    fn test_document_shape() {
        let doc = parse_document(
            "<!DOCTYPE html><html><head><style>p{}</style></head><body><p>hi</p></body></html>",
        );
        assert_eq!(doc.doctype.as_deref(), Some("html"));
        assert_eq!(names(doc.html.children()), ["head", "body"]);
        assert_eq!(names(doc.head().children()), ["style"]);
        assert_eq!(doc.body().text_content(), "hi");
    }

    #[test]
    fn test_bare_markup_gets_head_and_body() {
        let doc = parse_document("<title>T</title><p>one</p>");
        assert_eq!(names(doc.head().children()), ["title"]);
        assert_eq!(names(doc.body().children()), ["p"]);
    }

    #[test]
    fn test_script_content_is_raw() {
        let nodes = parse_fragment("<script>if (a < b && c > d) { x = '</div>'; }</script>");
        let script = &nodes[0];
        assert_eq!(script.name(), Some("script"));
        assert_eq!(script.text_content(), "if (a < b && c > d) { x = '</div>'; }");
    }

    #[test]
    fn test_script_ends_at_first_close_tag() {
        let nodes = parse_fragment("<script>a = '</SCRIPT>'; b</script>");
        assert_eq!(nodes[0].text_content(), "a = '");
    }

    #[test]
    fn test_attributes() {
        let nodes = parse_fragment(
            r#"<input type=checkbox checked data-x='a "b"' id="one" id="two" title="&lt;ok&gt;">"#,
        );
        let input = &nodes[0];
        assert_eq!(input.attribute("type"), Some("checkbox"));
        assert_eq!(input.attribute("checked"), Some(""));
        assert_eq!(input.attribute("data-x"), Some(r#"a "b""#));
        assert_eq!(input.attribute("id"), Some("one"));
        assert_eq!(input.attribute("title"), Some("<ok>"));
        assert!(input.children().is_empty());
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &amp; b &#65;&#x42; &nbsp;"), "a & b AB \u{a0}");
        assert_eq!(decode_entities("fish & chips &unknown; &"), "fish & chips &unknown; &");
    }

    #[test]
    fn test_implied_end_tags() {
        let nodes = parse_fragment("<ul><li>one<li>two</ul><p>a<p>b<div>c</div>");
        assert_eq!(names(nodes[0].children()), ["li", "li"]);
        assert_eq!(names(&nodes), ["ul", "p", "p", "div"]);
    }

    #[test]
    fn test_stray_end_tags_are_ignored() {
        let nodes = parse_fragment("<div>a</span>b</div></div>c");
        assert_eq!(nodes[0].text_content(), "ab");
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_unclosed_elements_are_closed_at_eof() {
        let nodes = parse_fragment("<div><span>open");
        assert_eq!(nodes[0].text_content(), "open");
        assert_eq!(names(nodes[0].children()), ["span"]);
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let nodes = parse_fragment("<p>1 < 2 and 3 <= 4</p>");
        assert_eq!(nodes[0].text_content(), "1 < 2 and 3 <= 4");
    }

    #[test]
    fn test_nested_document_tags_in_body_are_absorbed() {
        let doc = parse_document("<html><body><html><body><p>x</p></body></html><p>after</p>");
        assert_eq!(names(doc.body().children()), ["p", "p"]);
        assert_eq!(doc.body().text_content(), "xafter");
    }

    #[test]
    fn test_multibyte_declaration_is_a_comment() {
        let nodes = parse_fragment("<!dé€é><p>x</p>");
        assert_eq!(
            nodes[0],
            MarkupNode::Comment {
                text: "dé€é".to_string()
            }
        );
        assert_eq!(names(&nodes), ["p"]);

        let doc = parse_document("<!dé€é><p>x</p>");
        assert_eq!(doc.doctype, None);
        assert_eq!(doc.body().text_content(), "x");

        let doc = parse_document("<!€><!doctypé html>");
        assert_eq!(doc.doctype, None);
    }

    #[test]
    fn test_deep_nesting_stays_linear() {
        let depth = 5_000;
        let markup = format!("{}x{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let started = std::time::Instant::now();
        let nodes = parse_fragment(&markup);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let mut level = 0;
        let mut current = &nodes[..];
        while let [MarkupNode::Element { name, children, .. }] = current {
            assert_eq!(name, "div");
            level += 1;
            current = children;
        }
        assert_eq!(level, depth);
        assert_eq!(current, [MarkupNode::Text { text: "x".to_string() }]);
    }

    #[test]
    fn test_comments_are_kept() {
        let nodes = parse_fragment("<!-- note --><b>x</b>");
        assert_eq!(
            nodes[0],
            MarkupNode::Comment {
                text: " note ".to_string()
            }
        );
    }
}
