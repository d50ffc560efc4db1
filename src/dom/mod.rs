//! Minimal live document: the parts of the result page the controllers
//! read and mutate.
//!
//! Elements own their children directly, except confirmation blocks, which
//! live behind a shared [`BlockHandle`] so that a confirmation controller
//! can mutate its own block without reaching through the area.

pub mod area;
pub mod block;
pub mod event;
pub mod parser;

pub use area::ConfirmationArea;
pub use block::{BlockHandle, FormLocation, SubmittableBlock};
pub use event::SubmitEvent;
pub use parser::{parse_document, parse_fragment};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Elements that never have children or an end tag.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    Block(BlockHandle),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn write_html(&self, out: &mut String) {
        match self {
            Node::Element(el) => el.write_outer_html(out),
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Node::Block(block) => out.push_str(&block.outer_html()),
        }
    }

    pub fn write_text(&self, out: &mut String) {
        match self {
            Node::Element(el) => el.write_text(out),
            Node::Text(text) => out.push_str(text),
            Node::Comment(_) => {}
            Node::Block(block) => out.push_str(&block.text_content()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_ascii_lowercase(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Class tokens are whitespace separated and compared exactly.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Path (child indices) to the first descendant with `tag`, in
    /// document order. Blocks are opaque.
    pub fn find_path(&self, tag: &str) -> Option<Vec<usize>> {
        for (idx, child) in self.children.iter().enumerate() {
            if let Node::Element(el) = child {
                if el.is(tag) {
                    return Some(vec![idx]);
                }
                if let Some(mut rest) = el.find_path(tag) {
                    rest.insert(0, idx);
                    return Some(rest);
                }
            }
        }
        None
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        match path.split_first() {
            None => Some(self),
            Some((idx, rest)) => match self.children.get(*idx)? {
                Node::Element(el) => el.at_path(rest),
                _ => None,
            },
        }
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        match path.split_first() {
            None => Some(self),
            Some((idx, rest)) => match self.children.get_mut(*idx)? {
                Node::Element(el) => el.at_path_mut(rest),
                _ => None,
            },
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.child_elements().find_map(|el| el.find_by_id(id))
    }

    /// Pre-order walk over descendant elements (blocks excluded).
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        for child in &self.children {
            child.write_text(out);
        }
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_outer_html(&mut out);
        out
    }

    fn write_outer_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        out.push('>');
        if is_void_tag(&self.tag) {
            return;
        }
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in el.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

/// Blocks reachable from `nodes`, nested ones included, in document order
/// (an outer block precedes the blocks inside it).
pub fn collect_blocks(nodes: &[Node]) -> Vec<BlockHandle> {
    let mut out = Vec::new();
    collect_blocks_into(nodes, &mut out);
    out
}

fn collect_blocks_into(nodes: &[Node], out: &mut Vec<BlockHandle>) {
    for node in nodes {
        match node {
            Node::Block(block) => {
                out.push(block.clone());
                block.with_element(|el| collect_blocks_into(&el.children, out));
            }
            Node::Element(el) => collect_blocks_into(&el.children, out),
            _ => {}
        }
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Locks a document mutex. A panic while holding the lock cannot leave a
/// node half-written, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
