//! Template document model – a small DOM parsed from the controlled HTML
//! subset used by requisition templates, plus the handles and mutators the
//! merge stages need.
//!
//! Supported elements:
//! - Structural: div, p, h1-h3, ul, ol, li, table, tr, td, th, img
//! - Inline: span
//! - Styling via `class` and `style` attributes
//!
//! The tree can be written back out with [`to_html`], which is how a mutated
//! working copy is persisted before export.

use std::collections::HashMap;
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    Ul,
    Ol,
    Li,
    Table,
    Tr,
    Td,
    Th,
    Span,
    Img,
    Body,
    Html,
    Head,
    /// Catch-all for unknown tags – kept in the tree, hidden by the styler.
    Unknown(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            other => Tag::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::Img => "img",
            Tag::Body => "body",
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Unknown(name) => name,
        }
    }

    pub fn is_block(&self) -> bool {
        !matches!(self, Tag::Span | Tag::Img | Tag::Head)
    }

    pub fn is_table_part(&self) -> bool {
        matches!(self, Tag::Table | Tag::Tr | Tag::Td | Tag::Th)
    }

    pub fn is_cell(&self) -> bool {
        matches!(self, Tag::Td | Tag::Th)
    }

    /// Elements written without a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Img)
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

impl DomNode {
    pub fn text(s: impl Into<String>) -> Self {
        DomNode::Text(s.into())
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            DomNode::Element(e) => Some(e),
            DomNode::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            DomNode::Element(e) => Some(e),
            DomNode::Text(_) => None,
        }
    }
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<DomNode>) -> Self {
        self.children = children;
        self
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }

    /// Value of one declaration in the `style` attribute.
    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.inline_style()?
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .find(|(p, _)| p.trim() == property)
            .map(|(_, v)| v.trim())
    }

    /// Insert or replace one declaration in the `style` attribute, keeping
    /// the order of the others.
    pub fn set_style(&mut self, property: &str, value: &str) {
        let mut decls: Vec<(String, String)> = self
            .inline_style()
            .unwrap_or("")
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .map(|(p, v)| (p.trim().to_string(), v.trim().to_string()))
            .collect();
        match decls.iter_mut().find(|(p, _)| p == property) {
            Some(existing) => existing.1 = value.to_string(),
            None => decls.push((property.to_string(), value.to_string())),
        }
        let joined = decls
            .iter()
            .map(|(p, v)| format!("{p}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.attributes.insert("style".to_string(), joined);
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => collect_text(&e.children, out),
        }
    }
}

// ---------------------------------------------------------------------------
// Node handles
// ---------------------------------------------------------------------------

/// Child-index path from the document root to a node. The empty path names
/// the root list itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parent(&self) -> Option<NodePath> {
        let (_, head) = self.0.split_last()?;
        Some(NodePath(head.to_vec()))
    }

    /// Index of this node within its parent's children.
    pub fn index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Where this node sits once a node has been inserted at `inserted`:
    /// later siblings of the insertion point, and everything under them,
    /// move up by one.
    pub fn after_insert(&self, inserted: &NodePath) -> NodePath {
        let Some((&at, parent)) = inserted.0.split_last() else {
            return self.clone();
        };
        let mut indices = self.0.clone();
        let depth = parent.len();
        if indices.len() > depth && indices.starts_with(parent) && indices[depth] >= at {
            indices[depth] += 1;
        }
        NodePath(indices)
    }

    pub fn child(&self, index: usize) -> NodePath {
        let mut v = self.0.clone();
        v.push(index);
        NodePath(v)
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

/// Find the first text node (document order) containing `needle`.
pub fn find_text(nodes: &[DomNode], needle: &str) -> Option<NodePath> {
    fn walk(nodes: &[DomNode], needle: &str, prefix: &mut Vec<usize>) -> bool {
        for (i, node) in nodes.iter().enumerate() {
            prefix.push(i);
            let hit = match node {
                DomNode::Text(t) => t.contains(needle),
                DomNode::Element(e) => walk(&e.children, needle, prefix),
            };
            if hit {
                return true;
            }
            prefix.pop();
        }
        false
    }

    let mut prefix = Vec::new();
    walk(nodes, needle, &mut prefix).then(|| NodePath(prefix))
}

pub fn node_at<'a>(nodes: &'a [DomNode], path: &NodePath) -> Option<&'a DomNode> {
    let (first, rest) = path.0.split_first()?;
    let mut node = nodes.get(*first)?;
    for &i in rest {
        node = node.as_element()?.children.get(i)?;
    }
    Some(node)
}

pub fn node_at_mut<'a>(nodes: &'a mut [DomNode], path: &NodePath) -> Option<&'a mut DomNode> {
    let (first, rest) = path.0.split_first()?;
    let mut node = nodes.get_mut(*first)?;
    for &i in rest {
        node = node.as_element_mut()?.children.get_mut(i)?;
    }
    Some(node)
}

/// The child list addressed by `parent`: the root list for the empty path,
/// otherwise the children of the element at that path.
pub fn children_at_mut<'a>(
    nodes: &'a mut Vec<DomNode>,
    parent: &NodePath,
) -> Option<&'a mut Vec<DomNode>> {
    if parent.is_root() {
        return Some(nodes);
    }
    match node_at_mut(nodes, parent)? {
        DomNode::Element(e) => Some(&mut e.children),
        DomNode::Text(_) => None,
    }
}

/// Walk up from `path` to the nearest enclosing block element that can take
/// a sibling (not a table part, not body/html). Falls back to `path` itself
/// when the node sits directly in the root or body.
pub fn containing_block(nodes: &[DomNode], path: &NodePath) -> NodePath {
    let mut current = path.parent();
    while let Some(candidate) = current {
        if candidate.is_root() {
            break;
        }
        if let Some(DomNode::Element(e)) = node_at(nodes, &candidate) {
            let structural = matches!(e.tag, Tag::Body | Tag::Html) || e.tag.is_table_part();
            if e.tag.is_block() && !structural {
                return candidate;
            }
            if structural {
                break;
            }
        }
        current = candidate.parent();
    }
    path.clone()
}

/// Apply `f` to every text node in document order.
pub fn for_each_text_mut(nodes: &mut [DomNode], f: &mut dyn FnMut(&mut String)) {
    for node in nodes {
        match node {
            DomNode::Text(t) => f(t),
            DomNode::Element(e) => for_each_text_mut(&mut e.children, f),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser { input: html, pos: 0 };
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        loop {
            self.skip_inter_element_whitespace();
            if self.eof() || self.starts_with("</") {
                break;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // doctype / processing instruction
            self.skip_past(">");
            return None;
        }
        if self.starts_with("<") {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        let end = self.input[start..]
            .find('<')
            .map(|i| start + i)
            .unwrap_or(self.input.len());
        self.pos = end;
        DomNode::Text(decode_entities(&self.input[start..end]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.advance_char(); // '<'
        let tag = Tag::from_name(&self.parse_name());
        let mut elem = ElementNode::new(tag);

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if self.pos == before {
                // Stray character inside a tag; step over it.
                self.advance_char();
                continue;
            }
            elem.attributes.insert(key, value);
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.pos += 1;
        }
        if elem.tag.is_void() {
            return DomNode::Element(elem);
        }

        elem.children = self.parse_nodes();

        if self.starts_with("</") {
            self.pos += 2;
            self.parse_name();
            self.skip_whitespace();
            if self.starts_with(">") {
                self.pos += 1;
            }
        }

        DomNode::Element(elem)
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.pos += 1;
        self.skip_whitespace();
        (key, self.parse_attr_value())
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ['"', '\''] {
            if self.current_char() == Some(quote) {
                self.pos += 1;
                let start = self.pos;
                let end = self.input[start..]
                    .find(quote)
                    .map(|i| start + i)
                    .unwrap_or(self.input.len());
                self.pos = (end + 1).min(self.input.len());
                return decode_entities(&self.input[start..end]);
            }
        }
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || c == '>' || c == '/' {
                break;
            }
            self.advance_char();
        }
        self.input[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    /// Skip runs of pure whitespace between elements; whitespace that leads
    /// into text is kept as part of that text.
    fn skip_inter_element_whitespace(&mut self) {
        let saved = self.pos;
        self.skip_whitespace();
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_past(&mut self, terminator: &str) {
        self.pos = match self.input[self.pos..].find(terminator) {
            Some(i) => self.pos + i + terminator.len(),
            None => self.input.len(),
        };
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += c.len_utf8();
        }
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Write a node list back out as HTML. Attributes are emitted in sorted
/// order so the output is stable.
pub fn to_html(nodes: &[DomNode]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn write_nodes(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(&escape_text(t)),
            DomNode::Element(e) => {
                let _ = write!(out, "<{}", e.tag.name());
                let mut keys: Vec<&String> = e.attributes.keys().collect();
                keys.sort();
                for key in keys {
                    let _ = write!(out, " {}=\"{}\"", key, escape_attr(&e.attributes[key]));
                }
                if e.tag.is_void() {
                    out.push_str(" />");
                    continue;
                }
                out.push('>');
                write_nodes(&e.children, out);
                let _ = write!(out, "</{}>", e.tag.name());
            }
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\u{00A0}', "&nbsp;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Body {
                return e.children.clone();
            }
            if e.tag == Tag::Html {
                let inner = body_children(&e.children);
                if !inner.is_empty() {
                    return inner;
                }
            }
        }
    }
    nodes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_div() {
        let nodes = parse_html(r#"<div class="flex p-4"><p>Hello</p></div>"#);
        assert_eq!(nodes.len(), 1);
        let div = nodes[0].as_element().unwrap();
        assert_eq!(div.tag, Tag::Div);
        assert_eq!(div.classes(), vec!["flex", "p-4"]);
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn parse_self_closing_img() {
        let nodes = parse_html(r#"<img src="logo.png" />"#);
        let img = nodes[0].as_element().unwrap();
        assert_eq!(img.tag, Tag::Img);
        assert_eq!(img.src(), Some("logo.png"));
    }

    #[test]
    fn find_text_returns_path_to_token() {
        let nodes = parse_html("<div><p>Branch</p><p>Items: {{ITEMS}}</p></div>");
        let path = find_text(&nodes, "{{ITEMS}}").unwrap();
        assert_eq!(path.indices(), &[0, 1, 0]);
        assert_eq!(
            node_at(&nodes, &path),
            Some(&DomNode::text("Items: {{ITEMS}}"))
        );
        assert!(find_text(&nodes, "{{MISSING}}").is_none());
    }

    #[test]
    fn containing_block_skips_inline_wrappers() {
        let nodes = parse_html("<div><p><span>{{ITEMS}}</span></p></div>");
        let anchor = find_text(&nodes, "{{ITEMS}}").unwrap();
        assert_eq!(containing_block(&nodes, &anchor).indices(), &[0, 0]);
    }

    #[test]
    fn paths_shift_past_an_insert() {
        let inserted = NodePath::new(vec![0, 2]);
        // later sibling and its subtree move
        assert_eq!(NodePath::new(vec![0, 2, 1]).after_insert(&inserted).indices(), &[0, 3, 1]);
        assert_eq!(NodePath::new(vec![0, 5]).after_insert(&inserted).indices(), &[0, 6]);
        // earlier siblings, ancestors and other branches stay
        assert_eq!(NodePath::new(vec![0, 1, 4]).after_insert(&inserted).indices(), &[0, 1, 4]);
        assert_eq!(NodePath::new(vec![0]).after_insert(&inserted).indices(), &[0]);
        assert_eq!(NodePath::new(vec![1, 3]).after_insert(&inserted).indices(), &[1, 3]);
    }

    #[test]
    fn containing_block_of_root_text_is_itself() {
        let nodes = parse_html("{{ITEMS}}");
        let anchor = find_text(&nodes, "{{ITEMS}}").unwrap();
        assert_eq!(containing_block(&nodes, &anchor), anchor);
    }

    #[test]
    fn set_style_replaces_existing_declaration() {
        let mut td = ElementNode::new(Tag::Td).with_attr("style", "width: 10px; color: #000");
        td.set_style("width", "40px");
        td.set_style("text-align", "center");
        assert_eq!(td.style_value("width"), Some("40px"));
        assert_eq!(td.style_value("color"), Some("#000"));
        assert_eq!(td.style_value("text-align"), Some("center"));
    }

    #[test]
    fn serializer_escapes_and_reparses() {
        let html = r#"<p class="note">Bolts &amp; nuts &lt;M6&gt;</p><img src="a.png" />"#;
        let nodes = parse_html(html);
        let out = to_html(&nodes);
        assert_eq!(parse_html(&out), nodes);
        assert!(out.contains("Bolts &amp; nuts &lt;M6&gt;"));
    }
}
