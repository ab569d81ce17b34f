//! Builders that wrap a host XML tree into a `NodeTree`.
//!
//! Each builder performs one pre-order traversal, allocating arena nodes
//! with monotonically increasing document-order positions. Namespace and
//! attribute nodes are created directly after their owning element so they
//! sort after the element start and before its first child.
//!
//! Trailing text ("tails") is preserved wherever the host exposes it; hosts
//! without a tail concept simply report none.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::consts::XML_URI;
use crate::host::{DocumentLike, ElementLike, HostChild};
use crate::nodes::{NodeId, NodeTree};
use crate::schema::SchemaElementLike;
use crate::xdm::QName;

/// A built arena plus the map from element/document node ids back to the
/// host handles they wrap, used by the selector facade for unwrapping.
#[derive(Debug, Clone)]
pub struct BuiltTree<E> {
    pub tree: Arc<NodeTree>,
    pub host: Vec<Option<E>>,
}

impl<E> BuiltTree<E> {
    pub fn host_of(&self, id: NodeId) -> Option<&E> {
        self.host.get(id.index()).and_then(|h| h.as_ref())
    }
}

/// Root input for the generic dispatcher.
pub enum XmlInput<E: ElementLike, D: DocumentLike<Element = E>> {
    Element(E),
    Document(D),
}

/// Dispatch on the host capability, as the selector facade does.
pub fn get_node_tree<E, D>(input: &XmlInput<E, D>) -> BuiltTree<E>
where
    E: ElementLike,
    D: DocumentLike<Element = E>,
{
    match input {
        XmlInput::Element(e) => build_node_tree(e),
        XmlInput::Document(d) => build_lxml_node_tree(d),
    }
}

type Scope = Vec<(String, String)>;

fn parse_name(name: &str, scope: &Scope, apply_default: bool) -> QName {
    if let Some(rest) = name.strip_prefix('{')
        && let Some((uri, local)) = rest.split_once('}')
    {
        let prefix = scope
            .iter()
            .find(|(p, u)| u == uri && !p.is_empty())
            .map(|(p, _)| p.clone());
        return QName {
            prefix,
            local: local.to_string(),
            ns_uri: Some(uri.to_string()),
        };
    }
    if let Some((prefix, local)) = name.split_once(':') {
        let ns_uri = scope
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.clone());
        return QName {
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
            ns_uri,
        };
    }
    let ns_uri = if apply_default {
        scope
            .iter()
            .rev()
            .find(|(p, _)| p.is_empty())
            .map(|(_, u)| u.clone())
            .filter(|u| !u.is_empty())
    } else {
        None
    };
    QName {
        prefix: None,
        local: name.to_string(),
        ns_uri,
    }
}

fn merged_scope(parent: &Scope, declarations: &[(String, String)]) -> Scope {
    if declarations.is_empty() {
        return parent.clone();
    }
    let mut scope = parent.clone();
    for (prefix, uri) in declarations {
        if prefix == "xml" {
            continue;
        }
        scope.retain(|(p, _)| p != prefix);
        scope.push((prefix.clone(), uri.clone()));
    }
    scope
}

struct Builder<E> {
    tree: NodeTree,
    host: Vec<Option<E>>,
}

impl<E: ElementLike> Builder<E> {
    fn new() -> Self {
        Self {
            tree: NodeTree::new(),
            host: Vec::new(),
        }
    }

    fn record_host(&mut self, id: NodeId, handle: Option<E>) {
        let idx = id.index();
        if self.host.len() <= idx {
            self.host.resize_with(idx + 1, || None);
        }
        self.host[idx] = handle;
    }

    fn build_element(&mut self, elem: &E, parent: Option<NodeId>, scope: &Scope) -> NodeId {
        let scope = merged_scope(scope, &elem.namespace_declarations());
        let name = parse_name(&elem.tag(), &scope, true);
        let id = self.tree.add_element(parent, name);
        self.record_host(id, Some(elem.clone()));

        for (prefix, uri) in &scope {
            self.tree.add_namespace(id, prefix, uri);
        }
        for (attr_name, attr_value) in elem.attributes() {
            let qname = parse_name(&attr_name, &scope, false);
            self.tree.add_attribute(id, qname, attr_value);
        }
        if let Some(t) = elem.text() {
            self.tree.add_text(id, t);
        }
        for (child, tail) in elem.children_with_tails() {
            match child {
                HostChild::Element(e) => {
                    self.build_element(&e, Some(id), &scope);
                }
                HostChild::Comment(c) => {
                    self.tree.add_comment(id, c);
                }
                HostChild::ProcessingInstruction { target, data } => {
                    self.tree.add_processing_instruction(id, target, data);
                }
            }
            if let Some(t) = tail {
                self.tree.add_text(id, t);
            }
        }
        id
    }

    fn finish(self) -> BuiltTree<E> {
        let mut host = self.host;
        host.resize_with(self.tree.len(), || None);
        debug!(nodes = self.tree.len(), "node tree built");
        BuiltTree {
            tree: Arc::new(self.tree),
            host,
        }
    }
}

fn base_scope() -> Scope {
    vec![("xml".to_string(), XML_URI.to_string())]
}

/// Build an element-rooted node tree (ElementTree-style input).
pub fn build_node_tree<E: ElementLike>(root: &E) -> BuiltTree<E> {
    let mut b = Builder::new();
    b.build_element(root, None, &base_scope());
    b.finish()
}

/// Build a document-rooted node tree (lxml-style input): top-level comments
/// and processing instructions around the root element become children of
/// the document node, and element tails become following text siblings.
pub fn build_lxml_node_tree<D: DocumentLike>(document: &D) -> BuiltTree<D::Element> {
    let mut b = Builder::new();
    let doc = b.tree.add_document();
    b.record_host(doc, None);

    let scope = base_scope();
    for part in document.prolog() {
        add_host_child(&mut b.tree, doc, part);
    }
    if let Some(root) = document.root_element() {
        b.build_element(&root, Some(doc), &scope);
    }
    for part in document.epilog() {
        add_host_child(&mut b.tree, doc, part);
    }
    b.finish()
}

fn add_host_child<E: ElementLike>(tree: &mut NodeTree, parent: NodeId, child: HostChild<E>) {
    match child {
        HostChild::Comment(c) => {
            tree.add_comment(parent, c);
        }
        HostChild::ProcessingInstruction { target, data } => {
            tree.add_processing_instruction(parent, target, data);
        }
        // Top-level elements other than the root are not representable.
        HostChild::Element(_) => {}
    }
}

/// Build a node tree over an XSD schema structure. Traversal follows the
/// particle model; an element already built under the same name is linked
/// by reference instead of being traversed again, which keeps circular
/// content models finite.
pub fn build_schema_node_tree<S: SchemaElementLike>(root: &S) -> BuiltTree<S> {
    struct SchemaBuilder<S> {
        tree: NodeTree,
        host: Vec<Option<S>>,
        by_name: HashMap<String, NodeId>,
    }

    impl<S: SchemaElementLike> SchemaBuilder<S> {
        fn build(&mut self, elem: &S, parent: Option<NodeId>) -> NodeId {
            let scope = base_scope();
            let name = elem.name().unwrap_or_else(|| "*".to_string());
            let qname = parse_name(&name, &scope, false);
            let id = self.tree.add_element(parent, qname);

            let idx = id.index();
            if self.host.len() <= idx {
                self.host.resize_with(idx + 1, || None);
            }
            self.host[idx] = Some(elem.clone());

            if let Some(t) = elem.type_name() {
                self.tree.set_type_name(id, t);
            }
            for (attr_name, attr_type) in elem.attributes() {
                let qn = parse_name(&attr_name, &scope, false);
                let attr_id = self.tree.add_attribute(id, qn, String::new());
                self.tree.set_type_name(attr_id, attr_type);
            }

            if let Some(ref_name) = elem.ref_name() {
                if let Some(&target) = self.by_name.get(&ref_name) {
                    self.tree.set_ref_target(id, target);
                }
                return id;
            }

            let first_seen = !self.by_name.contains_key(&name);
            if first_seen {
                self.by_name.insert(name.clone(), id);
                for child in elem.particle_children() {
                    self.build(&child, Some(id));
                }
            } else if let Some(&target) = self.by_name.get(&name) {
                self.tree.set_ref_target(id, target);
            }
            id
        }
    }

    let mut b = SchemaBuilder {
        tree: NodeTree::new(),
        host: Vec::new(),
        by_name: HashMap::new(),
    };
    b.build(root, None);
    let mut host = b.host;
    host.resize_with(b.tree.len(), || None);
    BuiltTree {
        tree: Arc::new(b.tree),
        host,
    }
}
