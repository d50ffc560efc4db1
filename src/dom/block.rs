//! Confirmation blocks: server-rendered containers for one pending
//! confirmable action.

use super::{lock, Element, Node};
use std::sync::{Arc, Mutex};

/// A confirmation container. Blocks nested inside it are separate
/// [`BlockHandle`]s reachable through `Node::Block` children.
#[derive(Debug)]
pub struct SubmittableBlock {
    element: Element,
    attached: bool,
}

impl SubmittableBlock {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            attached: true,
        }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }
}

/// The first form under a block, in document order. The form may live in
/// a block nested inside it, in which case `owner` is that inner block.
#[derive(Debug, Clone)]
pub struct FormLocation {
    owner: BlockHandle,
    path: Arc<[usize]>,
}

impl FormLocation {
    pub fn owner(&self) -> &BlockHandle {
        &self.owner
    }

    /// Child indices from the owner's element down to the form.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// `None` once the form is no longer at its recorded place.
    pub fn with_form<R>(&self, f: impl FnOnce(&Element) -> R) -> Option<R> {
        self.owner
            .with_element(|el| el.at_path(&self.path).filter(|form| form.is("form")).map(f))
    }

    pub fn with_form_mut<R>(&self, f: impl FnOnce(&mut Element) -> R) -> Option<R> {
        self.owner.with_element_mut(|el| {
            el.at_path_mut(&self.path)
                .filter(|form| form.is("form"))
                .map(f)
        })
    }
}

/// Shared handle to a block. The area holds one clone, the block's
/// confirmation controller another.
#[derive(Debug, Clone)]
pub struct BlockHandle(Arc<Mutex<SubmittableBlock>>);

impl BlockHandle {
    pub fn new(element: Element) -> Self {
        Self(Arc::new(Mutex::new(SubmittableBlock::new(element))))
    }

    /// First descendant form, looking through nested blocks as well.
    pub fn first_form(&self) -> Option<FormLocation> {
        let block = lock(&self.0);
        locate_form(self, &block.element.children, &mut Vec::new())
    }

    pub fn has_form(&self) -> bool {
        self.first_form().is_some()
    }

    /// Appends one text node. Returns whether the block was still part of
    /// the area; appending to a detached block has no visible effect.
    pub fn append_text(&self, text: &str) -> bool {
        let mut block = lock(&self.0);
        block.element.children.push(Node::text(text));
        block.attached
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.0).attached
    }

    pub(crate) fn detach(&self) {
        lock(&self.0).attached = false;
    }

    pub fn with_element<R>(&self, f: impl FnOnce(&Element) -> R) -> R {
        f(&lock(&self.0).element)
    }

    pub fn with_element_mut<R>(&self, f: impl FnOnce(&mut Element) -> R) -> R {
        f(&mut lock(&self.0).element)
    }

    pub fn outer_html(&self) -> String {
        lock(&self.0).element.outer_html()
    }

    pub fn inner_html(&self) -> String {
        lock(&self.0).element.inner_html()
    }

    pub fn text_content(&self) -> String {
        lock(&self.0).element.text_content()
    }

    /// Text of the trailing child, if it is a text node.
    pub fn last_text(&self) -> Option<String> {
        match lock(&self.0).element.children.last() {
            Some(Node::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &BlockHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn locate_form(
    owner: &BlockHandle,
    nodes: &[Node],
    path: &mut Vec<usize>,
) -> Option<FormLocation> {
    for (idx, node) in nodes.iter().enumerate() {
        match node {
            Node::Element(el) => {
                path.push(idx);
                if el.is("form") {
                    return Some(FormLocation {
                        owner: owner.clone(),
                        path: path.as_slice().into(),
                    });
                }
                if let Some(found) = locate_form(owner, &el.children, path) {
                    return Some(found);
                }
                path.pop();
            }
            // Lock order is always outer block before inner block.
            Node::Block(inner) => {
                if let Some(found) = inner.first_form() {
                    return Some(found);
                }
            }
            Node::Text(_) | Node::Comment(_) => {}
        }
    }
    None
}
