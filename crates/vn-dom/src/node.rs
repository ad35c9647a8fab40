//! Owned node tree.
//!
//! [`NodeRef`] is the host side of a DOM node. Tree operations here are raw:
//! they never pass through the realm's dispatch table, so interception code
//! can use them without re-entering its own hooks.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use vn_core::{HostRef, Object, Value};

use crate::error::DomError;

/// Elements whose start tag never has content or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Fragment,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        /// The `content` fragment of a `<template>`.
        content: Option<NodeRef>,
    },
    Text(String),
    Comment(String),
}

pub struct NodeData {
    kind: NodeKind,
    parent: Weak<RefCell<NodeData>>,
    children: Vec<NodeRef>,
    object: Object,
}

/// Shared handle to a node. Cloning shares identity.
#[derive(Clone)]
pub struct NodeRef(Rc<RefCell<NodeData>>);

impl NodeRef {
    /// Create a detached node whose expando object inherits from `proto`.
    pub fn new(kind: NodeKind, proto: &Object) -> Self {
        let kind = match kind {
            NodeKind::Element { tag, attributes, .. } => {
                let tag = tag.to_ascii_lowercase();
                let content = (tag == "template").then(|| NodeRef::new(NodeKind::Fragment, proto));
                NodeKind::Element { tag, attributes, content }
            }
            other => other,
        };
        Self(Rc::new(RefCell::new(NodeData {
            kind,
            parent: Weak::new(),
            children: Vec::new(),
            object: Object::with_proto(proto),
        })))
    }

    pub fn element(tag: &str, proto: &Object) -> Self {
        Self::new(
            NodeKind::Element {
                tag: tag.to_string(),
                attributes: Vec::new(),
                content: None,
            },
            proto,
        )
    }

    pub fn text(data: &str, proto: &Object) -> Self {
        Self::new(NodeKind::Text(data.to_string()), proto)
    }

    /// The node behind a page value, if it is one.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.downcast_host::<RefCell<NodeData>>().map(Self)
    }

    /// The page-facing value; property access goes to the expando object.
    pub fn to_value(&self) -> Value {
        Value::Host(HostRef::new(self.0.clone()).with_object(self.object()))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn object(&self) -> Object {
        self.0.borrow().object.clone()
    }

    pub fn kind(&self) -> NodeKind {
        self.0.borrow().kind.clone()
    }

    /// Upper-cased tag for elements, `#text` and friends otherwise.
    pub fn node_name(&self) -> String {
        match &self.0.borrow().kind {
            NodeKind::Document => "#document".to_string(),
            NodeKind::Fragment => "#document-fragment".to_string(),
            NodeKind::Element { tag, .. } => tag.to_ascii_uppercase(),
            NodeKind::Text(_) => "#text".to_string(),
            NodeKind::Comment(_) => "#comment".to_string(),
        }
    }

    pub fn tag_name(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Element { .. })
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Fragment)
    }

    pub fn template_content(&self) -> Option<NodeRef> {
        match &self.0.borrow().kind {
            NodeKind::Element { content, .. } => content.clone(),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone()),
            _ => None,
        }
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.0.borrow_mut().kind {
            let name = name.to_ascii_lowercase();
            match attributes.iter_mut().find(|(key, _)| *key == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attributes.push((name, value.to_string())),
            }
        }
    }

    /// Character data of a text or comment node.
    pub fn data(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Text(data) | NodeKind::Comment(data) => Some(data.clone()),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        match &self.0.borrow().kind {
            NodeKind::Text(data) => return data.clone(),
            NodeKind::Comment(_) => return String::new(),
            _ => {}
        }
        self.children().iter().map(NodeRef::text_content).collect()
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.0.borrow().parent.upgrade().map(NodeRef)
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<NodeRef> {
        self.0.borrow().children.clone()
    }

    pub fn first_child(&self) -> Option<NodeRef> {
        self.0.borrow().children.first().cloned()
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_inclusive_ancestor_of(&self, other: &NodeRef) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if NodeRef::ptr_eq(&node, self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    fn index_of(&self, child: &NodeRef) -> Option<usize> {
        self.0
            .borrow()
            .children
            .iter()
            .position(|c| NodeRef::ptr_eq(c, child))
    }

    fn can_hold_children(&self) -> bool {
        !matches!(self.0.borrow().kind, NodeKind::Text(_) | NodeKind::Comment(_))
    }

    fn detach(&self) {
        if let Some(parent) = self.parent() {
            if let Some(index) = parent.index_of(self) {
                parent.0.borrow_mut().children.remove(index);
            }
        }
        self.0.borrow_mut().parent = Weak::new();
    }

    /// The nodes actually inserted for `node`: a fragment's children move
    /// instead of the fragment itself.
    fn insertion_set(node: &NodeRef) -> Vec<NodeRef> {
        if node.is_fragment() {
            node.children()
        } else {
            vec![node.clone()]
        }
    }

    fn check_insert(&self, node: &NodeRef) -> Result<(), DomError> {
        if !self.can_hold_children() {
            return Err(DomError::HierarchyRequest(format!(
                "{} cannot have children",
                self.node_name()
            )));
        }
        if node.is_inclusive_ancestor_of(self) {
            return Err(DomError::HierarchyRequest(
                "The new child element contains the parent.".to_string(),
            ));
        }
        if matches!(node.0.borrow().kind, NodeKind::Document) {
            return Err(DomError::HierarchyRequest(
                "Nodes of type '#document' may not be inserted".to_string(),
            ));
        }
        Ok(())
    }

    /// Insert `node` before `reference`, or at the end when `reference` is `None`.
    pub fn insert_before(&self, node: &NodeRef, reference: Option<&NodeRef>) -> Result<(), DomError> {
        self.check_insert(node)?;
        if let Some(reference) = reference {
            if self.index_of(reference).is_none() {
                return Err(DomError::NotFound(
                    "The node before which the new node is to be inserted is not a child of this node."
                        .to_string(),
                ));
            }
        }
        for item in Self::insertion_set(node) {
            item.detach();
            let index = match reference {
                Some(reference) => self.index_of(reference).unwrap_or(self.0.borrow().children.len()),
                None => self.0.borrow().children.len(),
            };
            item.0.borrow_mut().parent = Rc::downgrade(&self.0);
            self.0.borrow_mut().children.insert(index, item);
        }
        Ok(())
    }

    pub fn append(&self, node: &NodeRef) -> Result<(), DomError> {
        self.insert_before(node, None)
    }

    /// Append a node created for this tree that has no parent yet.
    pub(crate) fn adopt(&self, node: NodeRef) {
        debug_assert!(node.parent().is_none() && !node.is_fragment());
        node.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(node);
    }

    /// Put `node` where `old` is, detaching `old`.
    pub fn replace(&self, node: &NodeRef, old: &NodeRef) -> Result<(), DomError> {
        if self.index_of(old).is_none() {
            return Err(DomError::NotFound(
                "The node to be replaced is not a child of this node.".to_string(),
            ));
        }
        if NodeRef::ptr_eq(node, old) {
            return Ok(());
        }
        self.insert_before(node, Some(old))?;
        old.detach();
        Ok(())
    }

    pub fn remove(&self, child: &NodeRef) -> Result<(), DomError> {
        if self.index_of(child).is_none() {
            return Err(DomError::NotFound(
                "The node to be removed is not a child of this node.".to_string(),
            ));
        }
        child.detach();
        Ok(())
    }

    /// Drop every child (template content is left alone).
    pub fn clear(&self) {
        for child in self.children() {
            child.detach();
        }
    }

    /// Copy this node (and, if `deep`, its subtree). Template content is
    /// copied along with a deep clone. Expando properties are not.
    pub fn clone_node(&self, deep: bool) -> NodeRef {
        let proto = self.object().proto().unwrap_or_default();
        let kind = match self.kind() {
            NodeKind::Element { tag, attributes, .. } => NodeKind::Element {
                tag,
                attributes,
                content: None,
            },
            other => other,
        };
        let copy = NodeRef::new(kind, &proto);
        if deep {
            if let (Some(source), Some(target)) = (self.template_content(), copy.template_content()) {
                for child in source.children() {
                    target.adopt(child.clone_node(true));
                }
            }
            for child in self.children() {
                copy.adopt(child.clone_node(true));
            }
        }
        copy
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            NodeKind::Text(data) => write!(f, "#text {data:?}"),
            _ => write!(f, "<{}> ({} children)", self.node_name(), self.0.borrow().children.len()),
        }
    }
}
