//! Minimal mutable html tree.
//!
//! `scraper` does the parsing (html5ever underneath) but its tree is awkward to mutate, so the
//! parsed document is copied into this arena and everything the sanitizer needs goes through the
//! [`Dom`] trait. Tests can build trees by hand through the same trait without touching a parser.

use std::fmt::Write as _;

pub type NodeId = usize;

/// the handful of tree operations the sanitizer relies on
pub trait Dom {
    fn root(&self) -> NodeId;

    /// every element still attached to the document, in document order
    fn elements(&self) -> Vec<NodeId>;

    /// tag name as the parser reports it, `None` for anything that isn't an element
    fn tag_name(&self, id: NodeId) -> Option<&str>;

    fn attr(&self, id: NodeId, name: &str) -> Option<&str>;

    fn attr_names(&self, id: NodeId) -> Vec<String>;

    fn set_attr(&mut self, id: NodeId, name: &str, value: &str);

    fn remove_attr(&mut self, id: NodeId, name: &str);

    /// detaches the node together with its subtree
    fn remove(&mut self, id: NodeId);

    /// false once the node or one of its ancestors has been removed
    fn is_attached(&self, id: NodeId) -> bool;

    /// creates a detached element
    fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId;

    fn append_child(&mut self, parent: NodeId, child: NodeId);

    fn prepend_child(&mut self, parent: NodeId, child: NodeId);

    fn append_text(&mut self, parent: NodeId, text: &str);

    fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|&id| self.tag_name(id) == Some(tag))
            .collect()
    }

    fn first_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&id| self.tag_name(id) == Some(tag))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Document,
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// elements that never get a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// a single leading newline in these is eaten by the parser, so the serializer has to put it back
const NEWLINE_EATING_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// text inside these is written back verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

#[derive(Debug, Clone)]
pub struct HtmlTree {
    nodes: Vec<NodeData>,
}

impl Default for HtmlTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlTree {
    /// empty document, only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// parses a full document, html5ever fills in html/head/body when the input lacks them
    pub fn parse(html: &str) -> Self {
        let document = scraper::Html::parse_document(html);
        let mut tree = Self::new();

        // explicit stack, upstream pages can nest deep enough to make recursion a bad idea
        let mut stack = vec![(document.tree.root(), tree.root())];

        while let Some((node, parent)) = stack.pop() {
            for child in node.children() {
                let kind = match child.value() {
                    scraper::Node::Doctype(doctype) => NodeKind::Doctype {
                        name: doctype.name().to_string(),
                        public_id: doctype.public_id().to_string(),
                        system_id: doctype.system_id().to_string(),
                    },
                    scraper::Node::Element(element) => NodeKind::Element {
                        name: element.name().to_string(),
                        // foreign attributes keep their prefix, `xlink:href` is not `href`
                        attrs: element
                            .attrs
                            .iter()
                            .map(|(qual, value)| {
                                let prefix = match &*qual.ns {
                                    XML_NS => "xml:",
                                    XMLNS_NS if &*qual.local != "xmlns" => "xmlns:",
                                    XLINK_NS => "xlink:",
                                    _ => "",
                                };
                                (format!("{}{}", prefix, &*qual.local), (**value).to_string())
                            })
                            .collect(),
                    },
                    scraper::Node::Text(text) => NodeKind::Text((**text).to_string()),
                    scraper::Node::Comment(comment) => NodeKind::Comment((**comment).to_string()),
                    _ => continue,
                };

                let id = tree.push(kind);
                tree.append_child(parent, id);
                stack.push((child, id));
            }
        }

        tree
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    fn element_attrs_mut(&mut self, id: NodeId) -> Option<&mut Vec<(String, String)>> {
        match self.nodes.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Element { attrs, .. }) => Some(attrs),
            _ => None,
        }
    }

    /// concatenated text of a subtree
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            match &self.nodes[current].kind {
                NodeKind::Text(text) => out.push_str(text),
                _ => stack.extend(self.nodes[current].children.iter().rev()),
            }
        }

        out
    }

    /// serializes the attached part of the tree back into html
    pub fn to_html(&self) -> String {
        enum Step {
            Open(NodeId),
            Close(NodeId),
        }

        let mut out = String::new();
        let mut stack = vec![Step::Open(self.root())];

        while let Some(step) = stack.pop() {
            match step {
                Step::Open(id) => {
                    let node = &self.nodes[id];
                    match &node.kind {
                        NodeKind::Document => {}
                        NodeKind::Doctype {
                            name,
                            public_id,
                            system_id,
                        } => {
                            let _ = write!(out, "<!DOCTYPE {}", name);
                            if !public_id.is_empty() {
                                let _ = write!(out, " PUBLIC \"{}\"", public_id);
                                if !system_id.is_empty() {
                                    let _ = write!(out, " \"{}\"", system_id);
                                }
                            } else if !system_id.is_empty() {
                                let _ = write!(out, " SYSTEM \"{}\"", system_id);
                            }
                            out.push('>');
                        }
                        NodeKind::Comment(comment) => {
                            let _ = write!(out, "<!--{}-->", comment);
                        }
                        NodeKind::Text(text) => {
                            if self.parent_is_raw_text(id) {
                                out.push_str(text);
                            } else {
                                escape_into(&mut out, text, false);
                            }
                        }
                        NodeKind::Element { name, attrs } => {
                            out.push('<');
                            out.push_str(name);

                            // parsers reorder attributes, writing them sorted keeps a reparse of
                            // this output byte-identical
                            let mut attrs: Vec<&(String, String)> = attrs.iter().collect();
                            attrs.sort_by(|a, b| a.0.cmp(&b.0));
                            for (key, value) in attrs {
                                out.push(' ');
                                out.push_str(key);
                                out.push_str("=\"");
                                escape_into(&mut out, value, true);
                                out.push('"');
                            }
                            out.push('>');

                            if NEWLINE_EATING_ELEMENTS.contains(&name.as_str())
                                && self.starts_with_newline(id)
                            {
                                out.push('\n');
                            }

                            if VOID_ELEMENTS.contains(&name.as_str()) {
                                continue;
                            }
                            stack.push(Step::Close(id));
                        }
                    }

                    stack.extend(node.children.iter().rev().map(|&c| Step::Open(c)));
                }
                Step::Close(id) => {
                    if let NodeKind::Element { name, .. } = &self.nodes[id].kind {
                        let _ = write!(out, "</{}>", name);
                    }
                }
            }
        }

        out
    }

    fn starts_with_newline(&self, id: NodeId) -> bool {
        self.nodes[id]
            .children
            .first()
            .is_some_and(|&c| matches!(&self.nodes[c].kind, NodeKind::Text(t) if t.starts_with('\n')))
    }

    fn parent_is_raw_text(&self, id: NodeId) -> bool {
        self.nodes[id]
            .parent
            .and_then(|p| self.tag_name(p))
            .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag))
    }
}

fn escape_into(out: &mut String, value: &str, attribute: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

impl Dom for HtmlTree {
    fn root(&self) -> NodeId {
        0
    }

    fn elements(&self) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root()];

        while let Some(id) = stack.pop() {
            if matches!(self.nodes[id].kind, NodeKind::Element { .. }) {
                found.push(id);
            }
            stack.extend(self.nodes[id].children.iter().rev());
        }

        found
    }

    fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    fn attr_names(&self, id: NodeId) -> Vec<String> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }

    fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(attrs) = self.element_attrs_mut(id) {
            match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some((_, existing)) => *existing = value.to_string(),
                None => attrs.push((name.to_ascii_lowercase(), value.to_string())),
            }
        }
    }

    fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(attrs) = self.element_attrs_mut(id) {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    fn remove(&mut self, id: NodeId) {
        if id != self.root() && id < self.nodes.len() {
            self.detach(id);
        }
    }

    fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes.get(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeKind::Element {
            name: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
        })
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(0, child);
    }

    fn append_text(&mut self, parent: NodeId, text: &str) {
        let id = self.push(NodeKind::Text(text.to_string()));
        self.append_child(parent, id);
    }
}
