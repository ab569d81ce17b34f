#![allow(dead_code)]

use std::sync::Arc;

use treepath_xpath::host::{elem, SimpleElement};
use treepath_xpath::tree_builders::build_node_tree;
use treepath_xpath::{
    CompiledXPath, DynamicContextBuilder, Error, NodeTree, XPath2Parser, XdmAtomicValue, XdmItem,
    XdmSequence,
};

pub fn compile(path: &str) -> CompiledXPath {
    XPath2Parser::new()
        .parse(path)
        .unwrap_or_else(|e| panic!("cannot parse {path:?}: {e}"))
}

/// Evaluate with the default XPath 2.0 parser over an element-rooted tree.
pub fn eval(root: &SimpleElement, path: &str) -> (Arc<NodeTree>, XdmSequence) {
    let built = build_node_tree(root);
    let compiled = compile(path);
    let mut ctx = DynamicContextBuilder::new()
        .with_tree(built.tree.clone())
        .build();
    let seq = compiled
        .evaluate(&mut ctx)
        .unwrap_or_else(|e| panic!("cannot evaluate {path:?}: {e}"));
    (built.tree, seq)
}

pub fn eval_err(root: &SimpleElement, path: &str) -> Error {
    let built = build_node_tree(root);
    let compiled = compile(path);
    let mut ctx = DynamicContextBuilder::new()
        .with_tree(built.tree.clone())
        .build();
    compiled
        .evaluate(&mut ctx)
        .expect_err("an evaluation error was expected")
}

/// Evaluate without any XML tree in the dynamic context.
pub fn eval_no_context(path: &str) -> XdmSequence {
    let compiled = compile(path);
    let mut ctx = DynamicContextBuilder::new().build();
    compiled
        .evaluate(&mut ctx)
        .unwrap_or_else(|e| panic!("cannot evaluate {path:?}: {e}"))
}

/// Local names of the node items of a sequence.
pub fn names(tree: &NodeTree, seq: &XdmSequence) -> Vec<String> {
    seq.iter()
        .filter_map(|item| match item {
            XdmItem::Node(id) => tree.name(*id).map(|n| n.local.clone()),
            XdmItem::Atomic(_) => None,
        })
        .collect()
}

/// String values of the atomic items of a sequence.
pub fn strings(seq: &XdmSequence) -> Vec<String> {
    seq.iter()
        .filter_map(|item| item.as_atomic().map(XdmAtomicValue::string_value))
        .collect()
}

pub fn single_atomic(seq: &XdmSequence) -> XdmAtomicValue {
    assert_eq!(seq.len(), 1, "a singleton sequence expected: {seq:?}");
    seq[0]
        .as_atomic()
        .expect("an atomic item expected")
        .clone()
}

/// `<A><B1/><B2><C1/><C2/><C3/></B2></A>`
pub fn scenario_tree() -> SimpleElement {
    elem("A")
        .child(elem("B1"))
        .child(
            elem("B2")
                .child(elem("C1"))
                .child(elem("C2"))
                .child(elem("C3")),
        )
        .build()
}

/// `<r><x a="10"/><x a="20"/></r>`
pub fn attributes_tree() -> SimpleElement {
    elem("r")
        .child(elem("x").attr("a", "10"))
        .child(elem("x").attr("a", "20"))
        .build()
}
