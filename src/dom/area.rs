//! The confirmation area: the region of the page the primary controller
//! owns and replaces wholesale.

use super::{collect_blocks, lock, parser, BlockHandle, Node};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Default)]
struct AreaInner {
    children: Vec<Node>,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationArea {
    inner: Arc<Mutex<AreaInner>>,
}

impl ConfirmationArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: Vec<Node>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AreaInner {
                children,
                generation: 0,
            })),
        }
    }

    /// Replaces all content with a single text node.
    pub fn replace_text(&self, text: &str) {
        self.replace(vec![Node::text(text)]);
    }

    /// Replaces all content with the parse of `html` and returns the
    /// confirmation blocks it contains, in document order.
    pub fn replace_html(&self, html: &str, marker: &str) -> Vec<BlockHandle> {
        let children = parser::parse_fragment(html, Some(marker));
        let blocks = collect_blocks(&children);
        self.replace(children);
        blocks
    }

    fn replace(&self, children: Vec<Node>) {
        let old = {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            std::mem::replace(&mut inner.children, children)
        };
        let stale = collect_blocks(&old);
        if !stale.is_empty() {
            debug!(count = stale.len(), "detaching superseded confirmation blocks");
        }
        for block in stale {
            block.detach();
        }
    }

    pub fn blocks(&self) -> Vec<BlockHandle> {
        collect_blocks(&lock(&self.inner).children)
    }

    /// Number of full replacements performed so far.
    pub fn generation(&self) -> u64 {
        lock(&self.inner).generation
    }

    pub fn inner_html(&self) -> String {
        let children = lock(&self.inner).children.clone();
        let mut out = String::new();
        for child in &children {
            child.write_html(&mut out);
        }
        out
    }

    pub fn text_content(&self) -> String {
        let children = lock(&self.inner).children.clone();
        let mut out = String::new();
        for child in &children {
            child.write_text(&mut out);
        }
        out
    }
}
