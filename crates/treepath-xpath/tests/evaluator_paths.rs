mod support;

use rstest::rstest;
use support::{attributes_tree, eval, eval_err, names, scenario_tree, single_atomic};
use treepath_xpath::host::elem;
use treepath_xpath::{ErrorCode, XdmAtomicValue, XdmItem};

#[test]
fn child_steps_select_in_document_order() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "/A/B2/*");
    assert_eq!(names(&tree, &seq), ["C1", "C2", "C3"]);
}

#[test]
fn descendant_shorthand_finds_nested_elements() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "//C2");
    assert_eq!(names(&tree, &seq), ["C2"]);
}

#[test]
fn last_predicate_selects_the_final_item() {
    let root = elem("r")
        .child(elem("a"))
        .child(elem("b"))
        .child(elem("c"))
        .build();
    let (tree, seq) = eval(&root, "/r/*[last()]");
    assert_eq!(names(&tree, &seq), ["c"]);
}

#[test]
fn attribute_predicate_with_numeric_comparison() {
    let root = attributes_tree();
    let (tree, seq) = eval(&root, "/r/x[@a>15]/@a");
    assert_eq!(seq.len(), 1);
    let id = seq[0].as_node().unwrap();
    assert_eq!(tree.value(id), Some("20"));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
fn numeric_predicates_equal_position_comparison(#[case] k: usize) {
    let root = scenario_tree();
    let positional = format!("/A/B2/*[{k}]");
    let explicit = format!("/A/B2/*[position() = {k}]");
    let (tree, a) = eval(&root, &positional);
    let (_, b) = eval(&root, &explicit);
    assert_eq!(names(&tree, &a), names(&tree, &b));
    assert_eq!(a.len(), 1);
}

#[test]
fn non_integer_numeric_predicates_select_nothing() {
    let root = scenario_tree();
    let (_, seq) = eval(&root, "/A/B2/*[1.5]");
    assert!(seq.is_empty());
    let (_, seq) = eval(&root, "/A/B2/*[0.5 + 0.5]");
    assert_eq!(seq.len(), 1);
}

#[test]
fn node_results_are_document_ordered_and_distinct() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "//C2 | //B1 | /A/B2 | //C2");
    let positions: Vec<u32> = seq
        .iter()
        .map(|item| tree.position(item.as_node().unwrap()))
        .collect();
    let mut sorted = positions.clone();
    sorted.dedup();
    sorted.sort_unstable();
    assert_eq!(positions, sorted, "positions must be strictly increasing");
    assert_eq!(names(&tree, &seq), ["B1", "B2", "C2"]);
}

#[test]
fn descendant_predicate_counts_within_each_parent() {
    // <r><x/><y><x/><x/></y></r>
    let root = elem("r")
        .child(elem("x"))
        .child(elem("y").child(elem("x")).child(elem("x")))
        .build();
    let (tree, seq) = eval(&root, "//x[1]");
    // The first x child of r and the first x child of y.
    assert_eq!(seq.len(), 2);
    let parents: Vec<String> = seq
        .iter()
        .map(|item| {
            let parent = tree.parent(item.as_node().unwrap()).unwrap();
            tree.name(parent).unwrap().local.clone()
        })
        .collect();
    assert_eq!(parents, ["r", "y"]);
}

#[test]
fn predicates_over_atomic_sequences() {
    let root = scenario_tree();
    let (_, seq) = eval(&root, "(1 to 5)[. > 2]");
    let values: Vec<i64> = seq
        .iter()
        .map(|item| match item {
            XdmItem::Atomic(XdmAtomicValue::Integer(i)) => *i,
            other => panic!("unexpected item {other:?}"),
        })
        .collect();
    assert_eq!(values, [3, 4, 5]);
}

#[test]
fn atomic_values_in_intermediate_steps_are_rejected() {
    let root = scenario_tree();
    let err = eval_err(&root, "(1, 2)/a");
    assert_eq!(err.code, ErrorCode::XPTY0019);
}

#[test]
fn mixed_path_results_are_rejected() {
    let root = scenario_tree();
    let err = eval_err(&root, "/A/B2/(C1, 2)");
    assert_eq!(err.code, ErrorCode::XPTY0018);
}

#[test]
fn absolute_paths_reset_the_focus_inside_predicates() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "//C2[/A/B1]");
    assert_eq!(names(&tree, &seq), ["C2"]);
}

#[test]
fn relative_multi_step_paths() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "B2/C3");
    assert_eq!(names(&tree, &seq), ["C3"]);
}

#[test]
fn count_over_paths() {
    let root = elem("r")
        .child(elem("x"))
        .child(elem("x"))
        .child(elem("x"))
        .build();
    let (_, seq) = eval(&root, "count(/r/x)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Integer(3));
}
