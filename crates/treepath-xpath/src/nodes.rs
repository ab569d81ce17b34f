//! The XDM node arena.
//!
//! Nodes live in a `NodeTree`, a vector arena indexed by `NodeId`. Parent
//! links are plain optional ids, so the cycles of a pointer-based tree never
//! arise. Builders append nodes in pre-order with attribute and namespace
//! nodes directly after their owning element, which makes the arena index
//! order coincide with document order; the explicit `position` field is the
//! value used for ordering comparisons.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::xdm::{ExpandedName, QName, XdmAtomicValue};

/// Index of a node within its `NodeTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The seven XDM node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Namespace,
    Comment,
    ProcessingInstruction,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: Option<NodeId>,
    position: u32,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
    namespaces: Vec<NodeId>,
    /// Typed value from schema annotation (attribute and element nodes only).
    typed_value: Option<XdmAtomicValue>,
    /// XSD type annotation name, set by the schema tree builder.
    type_name: Option<String>,
    /// Reference target for schema element nodes declared by reference.
    ref_target: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind, position: u32, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            name: None,
            value: None,
            parent,
            position,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            typed_value: None,
            type_name: None,
            ref_target: None,
        }
    }
}

/// An immutable tree of XPath nodes wrapping one host XML document or
/// element. Built once, then shared (`Arc`) across evaluations.
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
}

impl NodeTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root.expect("node tree has no root")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.data(id).kind
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.data(id).name.as_ref()
    }

    pub fn expanded_name(&self, id: NodeId) -> Option<ExpandedName> {
        self.data(id).name.as_ref().map(|q| q.expanded())
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.data(id).value.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn position(&self, id: NodeId) -> u32 {
        self.data(id).position
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).children
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).attributes
    }

    pub fn namespaces(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).namespaces
    }

    pub fn type_name(&self, id: NodeId) -> Option<&str> {
        self.data(id).type_name.as_deref()
    }

    pub fn ref_target(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).ref_target
    }

    /// Document order comparison. Total over a single tree.
    pub fn compare_order(&self, a: NodeId, b: NodeId) -> Ordering {
        self.position(a).cmp(&self.position(b))
    }

    /// The root element: the tree root itself, or the single element child
    /// of a document root.
    pub fn document_root_element(&self) -> Option<NodeId> {
        let root = self.root();
        match self.kind(root) {
            NodeKind::Element => Some(root),
            NodeKind::Document => self
                .children(root)
                .iter()
                .copied()
                .find(|&c| self.kind(c) == NodeKind::Element),
            _ => None,
        }
    }

    /// The string value, as computed by fn:string() on a node.
    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Text
            | NodeKind::Attribute
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction
            | NodeKind::Namespace => self.value(id).unwrap_or_default().to_string(),
            NodeKind::Element | NodeKind::Document => {
                let mut out = String::new();
                for d in self.iter_descendants(id, false) {
                    if self.kind(d) == NodeKind::Text
                        && let Some(v) = self.value(d)
                    {
                        out.push_str(v);
                    }
                }
                out
            }
        }
    }

    /// The typed value, as computed by fn:data() on a node: the schema
    /// annotation when present, otherwise untyped (or plain string for
    /// comments, processing instructions and namespace nodes).
    pub fn typed_value(&self, id: NodeId) -> XdmAtomicValue {
        match self.kind(id) {
            NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                XdmAtomicValue::String(self.value(id).unwrap_or_default().to_string())
            }
            NodeKind::Text => XdmAtomicValue::untyped(self.value(id).unwrap_or_default()),
            NodeKind::Attribute | NodeKind::Element | NodeKind::Document => {
                if let Some(tv) = &self.data(id).typed_value {
                    tv.clone()
                } else {
                    XdmAtomicValue::untyped(self.string_value(id))
                }
            }
        }
    }

    ///
    /// Axes. Each returns node ids in the order the axis presents them:
    /// forward axes in document order, reverse axes in proximity order
    /// (reverse document order).
    ///
    pub fn axis_child(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied()
    }

    pub fn axis_attribute(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.attributes(id).iter().copied()
    }

    pub fn axis_namespace(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.namespaces(id).iter().copied()
    }

    pub fn iter_descendants(&self, id: NodeId, with_self: bool) -> Descendants<'_> {
        let stack = if with_self {
            vec![id]
        } else {
            let mut v: Vec<NodeId> = self.children(id).to_vec();
            v.reverse();
            v
        };
        Descendants { tree: self, stack }
    }

    pub fn iter_ancestors(&self, id: NodeId, with_self: bool) -> Ancestors<'_> {
        let next = if with_self { Some(id) } else { self.parent(id) };
        Ancestors { tree: self, next }
    }

    /// `following-sibling` (forward) or `preceding-sibling` (reverse,
    /// proximity order). Attribute and namespace nodes have no siblings.
    pub fn axis_siblings(&self, id: NodeId, forward: bool) -> Vec<NodeId> {
        if matches!(self.kind(id), NodeKind::Attribute | NodeKind::Namespace) {
            return Vec::new();
        }
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let siblings = self.children(parent);
        let Some(idx) = siblings.iter().position(|&s| s == id) else {
            return Vec::new();
        };
        if forward {
            siblings[idx + 1..].to_vec()
        } else {
            let mut v = siblings[..idx].to_vec();
            v.reverse();
            v
        }
    }

    /// `following`: nodes after this node in document order, excluding its
    /// descendants and all attribute/namespace nodes.
    pub fn axis_following(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(start) = self.subtree_end(id) else {
            return out;
        };
        for i in start.index()..self.nodes.len() {
            let node = NodeId(i as u32);
            if !matches!(self.kind(node), NodeKind::Attribute | NodeKind::Namespace) {
                out.push(node);
            }
        }
        out
    }

    /// `preceding`: nodes before this node in document order, excluding its
    /// ancestors and all attribute/namespace nodes. Proximity order.
    pub fn axis_preceding(&self, id: NodeId) -> Vec<NodeId> {
        let ancestors: Vec<NodeId> = self.iter_ancestors(id, false).collect();
        let origin = match self.kind(id) {
            // Attributes and namespaces share their element's position slot.
            NodeKind::Attribute | NodeKind::Namespace => match self.parent(id) {
                Some(p) => p,
                None => return Vec::new(),
            },
            _ => id,
        };
        let mut out = Vec::new();
        for i in (0..origin.index()).rev() {
            let node = NodeId(i as u32);
            if matches!(self.kind(node), NodeKind::Attribute | NodeKind::Namespace) {
                continue;
            }
            if ancestors.contains(&node) {
                continue;
            }
            out.push(node);
        }
        out
    }

    /// First arena index after the subtree rooted at `id`, or `None` when
    /// the subtree extends to the end of the tree.
    fn subtree_end(&self, id: NodeId) -> Option<NodeId> {
        let mut node = id;
        loop {
            let parent = self.parent(node)?;
            let siblings = self.children(parent);
            if let Some(idx) = siblings.iter().position(|&s| s == node)
                && idx + 1 < siblings.len()
            {
                return Some(siblings[idx + 1]);
            }
            node = parent;
        }
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.iter_ancestors(node, false).any(|a| a == ancestor)
    }

    ///
    /// Builder surface, used by the tree builders only.
    ///
    fn push(&mut self, mut data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        data.position = self.nodes.len() as u32 + 1;
        self.nodes.push(data);
        id
    }

    pub(crate) fn add_document(&mut self) -> NodeId {
        let id = self.push(NodeData::new(NodeKind::Document, 0, None));
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    pub(crate) fn add_element(&mut self, parent: Option<NodeId>, name: QName) -> NodeId {
        let mut data = NodeData::new(NodeKind::Element, 0, parent);
        data.name = Some(name);
        let id = self.push(data);
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        } else if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    pub(crate) fn add_attribute(&mut self, elem: NodeId, name: QName, value: String) -> NodeId {
        let mut data = NodeData::new(NodeKind::Attribute, 0, Some(elem));
        data.name = Some(name);
        data.value = Some(value);
        let id = self.push(data);
        self.nodes[elem.index()].attributes.push(id);
        id
    }

    pub(crate) fn add_namespace(&mut self, elem: NodeId, prefix: &str, uri: &str) -> NodeId {
        let mut data = NodeData::new(NodeKind::Namespace, 0, Some(elem));
        data.name = Some(QName {
            prefix: Some(prefix.to_string()),
            local: prefix.to_string(),
            ns_uri: Some(uri.to_string()),
        });
        data.value = Some(uri.to_string());
        let id = self.push(data);
        self.nodes[elem.index()].namespaces.push(id);
        id
    }

    pub(crate) fn add_text(&mut self, parent: NodeId, value: String) -> NodeId {
        let mut data = NodeData::new(NodeKind::Text, 0, Some(parent));
        data.value = Some(value);
        let id = self.push(data);
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub(crate) fn add_comment(&mut self, parent: NodeId, value: String) -> NodeId {
        let mut data = NodeData::new(NodeKind::Comment, 0, Some(parent));
        data.value = Some(value);
        let id = self.push(data);
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub(crate) fn add_processing_instruction(
        &mut self,
        parent: NodeId,
        target: String,
        data_str: String,
    ) -> NodeId {
        let mut data = NodeData::new(NodeKind::ProcessingInstruction, 0, Some(parent));
        data.name = Some(QName::local(target));
        data.value = Some(data_str);
        let id = self.push(data);
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub(crate) fn set_typed_value(&mut self, id: NodeId, value: XdmAtomicValue) {
        self.nodes[id.index()].typed_value = Some(value);
    }

    pub(crate) fn set_type_name(&mut self, id: NodeId, name: String) {
        self.nodes[id.index()].type_name = Some(name);
    }

    pub(crate) fn set_ref_target(&mut self, id: NodeId, target: NodeId) {
        self.nodes[id.index()].ref_target = Some(target);
    }
}

/// Pre-order descendant traversal.
pub struct Descendants<'a> {
    tree: &'a NodeTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let children = self.tree.children(id);
        self.stack.extend(children.iter().rev().copied());
        Some(id)
    }
}

/// Parent-link climb, nearest ancestor first.
pub struct Ancestors<'a> {
    tree: &'a NodeTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.parent(id);
        Some(id)
    }
}

/// A shared handle to a node, handed out by the selector facade when the
/// caller asks for XDM nodes instead of host values.
#[derive(Debug, Clone)]
pub struct XdmNodeRef {
    pub tree: Arc<NodeTree>,
    pub id: NodeId,
}

impl XdmNodeRef {
    pub fn kind(&self) -> NodeKind {
        self.tree.kind(self.id)
    }

    pub fn name(&self) -> Option<QName> {
        self.tree.name(self.id).cloned()
    }

    pub fn string_value(&self) -> String {
        self.tree.string_value(self.id)
    }
}

impl PartialEq for XdmNodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for XdmNodeRef {}
