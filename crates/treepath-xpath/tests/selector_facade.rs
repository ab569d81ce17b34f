mod support;

use std::collections::HashMap;

use treepath_xpath::host::{comment, doc, elem, text};
use treepath_xpath::{
    iter_select, select, select_with, ErrorCode, NodeKind, Selector, XPath1Parser, XPath2Parser,
    XPathResult, XdmAtomicValue, XdmItem, XdmResult,
};

#[test]
fn select_unwraps_attribute_values() {
    let root = elem("r")
        .child(elem("x").attr("a", "10"))
        .child(elem("x").attr("a", "20"))
        .build();
    let results = select(&root, "/r/x[@a>15]/@a").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_str(), Some("20"));
}

#[test]
fn select_returns_host_element_handles() {
    let c = elem("c").build();
    let root = elem("r")
        .child(elem("a"))
        .child(elem("b"))
        .child(c.clone())
        .build();
    let results = select(&root, "/r/*[last()]").unwrap();
    assert_eq!(results.len(), 1);
    // Host handles compare by reference identity.
    assert_eq!(results[0].as_element(), Some(&c));
}

#[test]
fn literal_results_come_back_as_atomics() {
    let root = elem("r").build();
    let results = select(&root, "concat('foo', ' ', 'bar')").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_str(), Some("foo bar"));

    let results = select(&root, "count(/r)").unwrap();
    assert_eq!(
        results[0],
        XPathResult::Atomic(XdmAtomicValue::Integer(1))
    );
}

#[test]
fn selectors_are_reusable_across_documents() {
    let selector = Selector::new("count(/r/x)").unwrap();
    let one = elem("r").child(elem("x")).build();
    let three = elem("r")
        .child(elem("x"))
        .child(elem("x"))
        .child(elem("x"))
        .build();
    assert_eq!(
        selector.select(&one).unwrap()[0],
        XPathResult::Atomic(XdmAtomicValue::Integer(1))
    );
    assert_eq!(
        selector.select(&three).unwrap()[0],
        XPathResult::Atomic(XdmAtomicValue::Integer(3))
    );
}

#[test]
fn iter_select_streams_the_results() {
    let root = elem("r")
        .child(elem("x"))
        .child(elem("x"))
        .build();
    let count = iter_select(&root, "/r/x").unwrap().count();
    assert_eq!(count, 2);
}

#[test]
fn select_with_an_xpath1_parser() {
    let root = elem("r").child(elem("x").attr("a", "3")).build();
    let parser = XPath1Parser::new();
    let results = select_with(&root, "/r/x/@a", &parser, &HashMap::new()).unwrap();
    assert_eq!(results[0].as_str(), Some("3"));
}

#[test]
fn declared_variables_are_checked_and_bound() {
    let root = elem("r").build();
    let parser = XPath2Parser::new().with_variable("x", "xs:integer");
    let mut variables = HashMap::new();
    variables.insert(
        "x".to_string(),
        vec![XdmItem::Atomic(XdmAtomicValue::Integer(5))],
    );
    let results = select_with(&root, "$x + 1", &parser, &variables).unwrap();
    assert_eq!(
        results[0],
        XPathResult::Atomic(XdmAtomicValue::Integer(6))
    );

    // A missing binding for a declared variable.
    let err = select_with(&root, "$x + 1", &parser, &HashMap::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);

    // A binding that does not match the declared sequence type.
    let mut wrong = HashMap::new();
    wrong.insert(
        "x".to_string(),
        vec![XdmItem::Atomic(XdmAtomicValue::String("five".to_string()))],
    );
    let err = select_with(&root, "$x + 1", &parser, &wrong).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPDY0050);

    // A binding nobody declared.
    let mut undeclared = variables.clone();
    undeclared.insert(
        "y".to_string(),
        vec![XdmItem::Atomic(XdmAtomicValue::Integer(1))],
    );
    let err = select_with(&root, "$x + 1", &parser, &undeclared).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);
}

#[test]
fn document_inputs_expose_the_document_node() {
    let document = doc()
        .child(comment(" prolog "))
        .child(elem("r").child(elem("a")))
        .child(comment(" epilog "))
        .build();

    let results = select(&document, "/").unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        XPathResult::Node(node) => assert_eq!(node.kind(), NodeKind::Document),
        other => panic!("a document node was expected, got {other:?}"),
    }

    // Top-level comments are children of the document node.
    let results = select(&document, "/comment()").unwrap();
    assert_eq!(results.len(), 2);

    let results = select(&document, "/r/a").unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn tails_become_text_siblings_in_document_builds() {
    let document = doc()
        .child(
            elem("r")
                .child(text("head"))
                .child(elem("a"))
                .child(text("tail")),
        )
        .build();
    let results = select(&document, "/r/text()").unwrap();
    let values: Vec<&str> = results.iter().filter_map(|r| r.as_str()).collect();
    assert_eq!(values, ["head", "tail"]);
}

#[test]
fn braced_uri_names_require_non_strict_parsing() {
    let root = elem("r").child(elem("{urn:x}e")).build();
    let err = select(&root, "/r/{urn:x}e").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003);

    let parser = XPath2Parser::new().with_strict(false);
    let results = select_with(&root, "/r/{urn:x}e", &parser, &HashMap::new()).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn select_xdm_keeps_node_handles() {
    let root = elem("r").child(elem("a")).build();
    let selector = Selector::new("/r/a").unwrap();
    let results = selector.select_xdm(&root).unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        XdmResult::Node(node) => {
            assert_eq!(node.kind(), NodeKind::Element);
            assert_eq!(node.name().unwrap().local, "a");
        }
        other => panic!("a node was expected, got {other:?}"),
    }
}

#[test]
fn parsers_adopt_prebuilt_static_contexts() {
    use treepath_xpath::StaticContextBuilder;

    let sctx = StaticContextBuilder::xpath2()
        .with_namespace("p", "urn:one")
        .with_compatibility_mode(true)
        .build();
    let parser = XPath2Parser::with_static_context(sctx);
    let root = elem("r").child(elem("{urn:one}a")).build();
    let results = select_with(&root, "/r/p:a", &parser, &HashMap::new()).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn default_element_namespace_applies_to_unprefixed_tests() {
    let root = elem("{urn:d}r").child(elem("{urn:d}a")).build();
    let plain = select(&root, "/r/a").unwrap();
    assert!(plain.is_empty());

    let parser = XPath2Parser::new().with_default_namespace("urn:d");
    let results = select_with(&root, "/r/a", &parser, &HashMap::new()).unwrap();
    assert_eq!(results.len(), 1);
}
