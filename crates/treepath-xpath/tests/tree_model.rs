mod support;

use treepath_xpath::host::{comment, doc, elem, pi, text};
use treepath_xpath::schema::SchemaElementLike;
use treepath_xpath::tree_builders::{build_lxml_node_tree, build_node_tree, build_schema_node_tree};
use treepath_xpath::{NodeKind, XdmAtomicValue};

#[test]
fn positions_increase_in_preorder() {
    let root = elem("A")
        .child(elem("B1").attr("a", "1"))
        .child(elem("B2").child(elem("C1")))
        .build();
    let built = build_node_tree(&root);
    let tree = &built.tree;

    let mut last = 0;
    for id in tree.iter_descendants(tree.root(), true) {
        let pos = tree.position(id);
        assert!(pos > last, "document order positions must increase");
        last = pos;
        // Attribute and namespace nodes sort after the element start and
        // before its first child.
        for &attr in tree.attributes(id) {
            assert!(tree.position(attr) > pos);
            if let Some(&first) = tree.children(id).first() {
                assert!(tree.position(attr) < tree.position(first));
            }
        }
    }
}

#[test]
fn parent_links_are_consistent() {
    let root = elem("A")
        .child(elem("B").child(elem("C")))
        .build();
    let built = build_node_tree(&root);
    let tree = &built.tree;
    assert!(tree.parent(tree.root()).is_none());
    for id in tree.iter_descendants(tree.root(), false) {
        let parent = tree.parent(id).expect("non-root nodes have a parent");
        assert!(tree.children(parent).contains(&id) || tree.kind(id) == NodeKind::Attribute);
    }
}

#[test]
fn string_values_concatenate_descendant_text() {
    let root = elem("r")
        .child(elem("a").child(text("Hello")))
        .child(elem("b").child(text(" world")))
        .build();
    let built = build_node_tree(&root);
    let tree = &built.tree;
    assert_eq!(tree.string_value(tree.root()), "Hello world");
}

#[test]
fn typed_values_default_to_untyped_atomic() {
    let root = elem("r").attr("a", "42").build();
    let built = build_node_tree(&root);
    let tree = &built.tree;
    let attr = tree.attributes(tree.root())[0];
    assert_eq!(
        tree.typed_value(attr),
        XdmAtomicValue::UntypedAtomic("42".to_string())
    );
}

#[test]
fn document_builds_attach_prolog_and_epilog() {
    let document = doc()
        .child(comment(" start "))
        .child(pi("target", "data"))
        .child(elem("r"))
        .child(comment(" end "))
        .build();
    let built = build_lxml_node_tree(&document);
    let tree = &built.tree;
    assert_eq!(tree.kind(tree.root()), NodeKind::Document);
    let kinds: Vec<NodeKind> = tree
        .children(tree.root())
        .iter()
        .map(|&c| tree.kind(c))
        .collect();
    assert_eq!(
        kinds,
        [
            NodeKind::Comment,
            NodeKind::ProcessingInstruction,
            NodeKind::Element,
            NodeKind::Comment
        ]
    );
    assert_eq!(tree.document_root_element(), Some(tree.children(tree.root())[2]));
}

#[test]
fn host_handles_map_back_to_elements() {
    let child = elem("c").build();
    let root = elem("r").child(child.clone()).build();
    let built = build_node_tree(&root);
    let tree = built.tree.clone();
    let c = tree.children(tree.root())[0];
    assert_eq!(built.host_of(c), Some(&child));
}

#[derive(Debug, Clone)]
struct FakeSchemaElement {
    name: &'static str,
    type_name: &'static str,
    reference: Option<&'static str>,
    children: Vec<FakeSchemaElement>,
}

impl SchemaElementLike for FakeSchemaElement {
    fn name(&self) -> Option<String> {
        Some(self.name.to_string())
    }

    fn type_name(&self) -> Option<String> {
        Some(self.type_name.to_string())
    }

    fn ref_name(&self) -> Option<String> {
        self.reference.map(str::to_string)
    }

    fn particle_children(&self) -> Vec<Self> {
        self.children.clone()
    }

    fn attributes(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[test]
fn schema_trees_link_references_instead_of_recursing() {
    // <item> contains itself by reference; the builder must terminate.
    let item = FakeSchemaElement {
        name: "item",
        type_name: "itemType",
        reference: None,
        children: vec![FakeSchemaElement {
            name: "item",
            type_name: "itemType",
            reference: Some("item"),
            children: vec![],
        }],
    };
    let root = FakeSchemaElement {
        name: "list",
        type_name: "listType",
        reference: None,
        children: vec![item],
    };
    let built = build_schema_node_tree(&root);
    let tree = &built.tree;
    assert_eq!(tree.kind(tree.root()), NodeKind::Element);
    assert_eq!(tree.type_name(tree.root()), Some("listType"));

    let item_node = tree.children(tree.root())[0];
    let nested = tree.children(item_node)[0];
    assert_eq!(tree.ref_target(nested), Some(item_node));
    assert!(tree.children(nested).is_empty());
}
