mod support;

use support::{eval, names, scenario_tree};
use treepath_xpath::host::{elem, text};
use treepath_xpath::NodeKind;

#[test]
fn forward_axes() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "/A/child::*");
    assert_eq!(names(&tree, &seq), ["B1", "B2"]);

    let (tree, seq) = eval(&root, "/A/descendant::*");
    assert_eq!(names(&tree, &seq), ["B1", "B2", "C1", "C2", "C3"]);

    let (tree, seq) = eval(&root, "/A/B1/following-sibling::*");
    assert_eq!(names(&tree, &seq), ["B2"]);

    let (tree, seq) = eval(&root, "/A/B1/following::*");
    assert_eq!(names(&tree, &seq), ["B2", "C1", "C2", "C3"]);

    let (tree, seq) = eval(&root, "/A/descendant-or-self::*");
    assert_eq!(names(&tree, &seq), ["A", "B1", "B2", "C1", "C2", "C3"]);
}

#[test]
fn reverse_axes_present_proximity_order() {
    let root = scenario_tree();
    // Path output is re-sorted into document order.
    let (tree, seq) = eval(&root, "//C2/ancestor::*");
    assert_eq!(names(&tree, &seq), ["A", "B2"]);

    // A positional predicate counts in proximity order.
    let (tree, seq) = eval(&root, "//C2/ancestor::*[1]");
    assert_eq!(names(&tree, &seq), ["B2"]);

    let (tree, seq) = eval(&root, "//C3/preceding-sibling::*[1]");
    assert_eq!(names(&tree, &seq), ["C2"]);

    let (tree, seq) = eval(&root, "//C1/preceding::*");
    assert_eq!(names(&tree, &seq), ["B1"]);

    let (tree, seq) = eval(&root, "//C2/ancestor-or-self::*");
    assert_eq!(names(&tree, &seq), ["A", "B2", "C2"]);
}

#[test]
fn self_and_parent_shorthands() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "/A/B2/.");
    assert_eq!(names(&tree, &seq), ["B2"]);

    let (tree, seq) = eval(&root, "/A/B2/..");
    assert_eq!(names(&tree, &seq), ["A"]);

    let (tree, seq) = eval(&root, "/A/B2/self::B2");
    assert_eq!(names(&tree, &seq), ["B2"]);

    let (_, seq) = eval(&root, "/A/B2/self::B1");
    assert!(seq.is_empty());
}

#[test]
fn child_then_parent_returns_the_context_element() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "/A/B2/child::*/parent::node()");
    assert_eq!(names(&tree, &seq), ["B2"]);
}

#[test]
fn attribute_axis() {
    let root = elem("r")
        .child(elem("x").attr("a", "1").attr("b", "2"))
        .build();
    let (tree, seq) = eval(&root, "/r/x/attribute::*");
    assert_eq!(seq.len(), 2);
    for item in &seq {
        assert_eq!(tree.kind(item.as_node().unwrap()), NodeKind::Attribute);
    }
    let (tree, seq) = eval(&root, "/r/x/@b");
    assert_eq!(seq.len(), 1);
    assert_eq!(tree.value(seq[0].as_node().unwrap()), Some("2"));
}

#[test]
fn attributes_are_not_children() {
    let root = elem("r").child(elem("x").attr("a", "1")).build();
    let (_, seq) = eval(&root, "/r/x/child::node()");
    assert!(seq.is_empty());
    let (_, seq) = eval(&root, "/r/x/attribute::a");
    assert_eq!(seq.len(), 1);
}

#[test]
fn namespace_axis_includes_the_implicit_xml_binding() {
    let root = elem("r").namespace("p", "urn:one").build();
    let (tree, seq) = eval(&root, "/r/namespace::*");
    let mut uris: Vec<String> = seq
        .iter()
        .map(|i| tree.value(i.as_node().unwrap()).unwrap().to_string())
        .collect();
    uris.sort();
    assert_eq!(
        uris,
        ["http://www.w3.org/XML/1998/namespace", "urn:one"]
    );
}

#[test]
fn kind_tests_in_steps() {
    let root = elem("r")
        .child(text("head"))
        .child(elem("a"))
        .child(text("tail"))
        .build();
    // Element-rooted builds preserve the leading text; a document build
    // would also keep the tail.
    let (tree, seq) = eval(&root, "/r/text()");
    assert!(!seq.is_empty());
    for item in &seq {
        assert_eq!(tree.kind(item.as_node().unwrap()), NodeKind::Text);
    }

    let (_, seq) = eval(&root, "/r/node()");
    assert!(seq.len() >= 2);

    let (_, seq) = eval(&root, "/r/comment()");
    assert!(seq.is_empty());
}

#[test]
fn descendant_axis_from_nested_context() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "/A/B2/descendant-or-self::node()");
    assert_eq!(names(&tree, &seq), ["B2", "C1", "C2", "C3"]);
}
