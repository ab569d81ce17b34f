mod support;

use rstest::rstest;
use support::{eval, eval_no_context, scenario_tree, single_atomic};
use treepath_xpath::host::elem;
use treepath_xpath::tree_builders::build_node_tree;
use treepath_xpath::{
    DynamicContextBuilder, ErrorCode, XPath1Parser, XPath2Parser, XdmAtomicValue,
};

fn check_bool(path: &str, expected: bool) {
    let seq = eval_no_context(path);
    assert_eq!(
        single_atomic(&seq),
        XdmAtomicValue::Boolean(expected),
        "{path}"
    );
}

#[rstest]
#[case("(1, 2, 3) = (3, 4)", true)]
#[case("(1, 2) = (3, 4)", false)]
#[case("(1, 2) != (2)", true)]
#[case("(1, 2) < (1)", false)]
#[case("(0, 3) > (2, 10)", true)]
#[case("() = (1, 2)", false)]
fn general_comparisons_are_existential(#[case] path: &str, #[case] expected: bool) {
    check_bool(path, expected);
}

#[rstest]
#[case("1 eq 1", true)]
#[case("1 eq 2", false)]
#[case("'a' lt 'b'", true)]
#[case("5.0 eq 5", true)]
#[case("1e0 ge 1", true)]
#[case("xs:untypedAtomic('10') eq '10'", true)]
#[case("xs:anyURI('urn:x') eq 'urn:x'", true)]
#[case("true() ne false()", true)]
fn value_comparisons(#[case] path: &str, #[case] expected: bool) {
    check_bool(path, expected);
}

#[test]
fn value_comparisons_on_empty_sequences_are_empty() {
    assert!(eval_no_context("() eq 1").is_empty());
    assert!(eval_no_context("1 le ()").is_empty());
}

#[test]
fn value_comparisons_require_singletons() {
    let err = XPath2Parser::new().parse("(1, 2) eq 1").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[test]
fn incomparable_types_raise_type_errors() {
    let err = XPath2Parser::new().parse("1 eq 'a'").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    let err = XPath2Parser::new().parse("1 = 'a'").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[test]
fn untyped_attribute_compares_numerically_in_general_comparison() {
    let root = elem("r")
        .child(elem("x").attr("a", "10"))
        .child(elem("x").attr("a", "20"))
        .build();
    let (_, seq) = eval(&root, "/r/x/@a > 15");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "/r/x/@a > 25");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
}

#[test]
fn nan_never_compares_equal() {
    check_bool("number('x') = number('x')", false);
    check_bool("number('x') != number('x')", true);
}

#[test]
fn compatibility_mode_coerces_numbers_and_booleans() {
    let parser = XPath1Parser::new();
    let root = scenario_tree();
    let built = build_node_tree(&root);

    let mut run = |path: &str| {
        let compiled = parser.parse(path).unwrap();
        let mut ctx = DynamicContextBuilder::new()
            .with_tree(built.tree.clone())
            .build();
        compiled.evaluate(&mut ctx).unwrap()
    };

    assert_eq!(
        single_atomic(&run("'3' = 3")),
        XdmAtomicValue::Boolean(true)
    );
    assert_eq!(
        single_atomic(&run("4 > '3'")),
        XdmAtomicValue::Boolean(true)
    );
    // A singleton boolean compares against the other side's EBV.
    assert_eq!(
        single_atomic(&run("true() = '1'")),
        XdmAtomicValue::Boolean(true)
    );
    // In 1.0, a string/number mismatch is NaN, not a type error.
    assert_eq!(
        single_atomic(&run("'a' = 1")),
        XdmAtomicValue::Boolean(false)
    );
}

#[test]
fn node_comparisons() {
    let root = scenario_tree();
    let (_, seq) = eval(&root, "/A/B1 is /A/B1");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "/A/B1 is /A/B2");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
    let (_, seq) = eval(&root, "/A/B1 << /A/B2");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "//C3 >> //C1");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    // An empty operand gives an empty result.
    let (_, seq) = eval(&root, "/A/nosuch is /A/B1");
    assert!(seq.is_empty());
}

#[test]
fn effective_boolean_value_rules() {
    check_bool("boolean(())", false);
    check_bool("boolean('')", false);
    check_bool("boolean('x')", true);
    check_bool("boolean(0)", false);
    check_bool("boolean(0.0e0)", false);
    check_bool("boolean(number('nope'))", false);
    check_bool("boolean(1)", true);
    check_bool("not(())", true);

    let root = scenario_tree();
    let (_, seq) = eval(&root, "boolean(/A/B1)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "boolean(/A/nosuch)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));

    let err = XPath2Parser::new().parse("boolean((1, 2))").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[test]
fn ebv_is_deterministic() {
    for _ in 0..3 {
        check_bool("boolean((0))", false);
        check_bool("boolean(('x'))", true);
    }
}

#[test]
fn logical_operators_use_ebv() {
    check_bool("1 and 'x'", true);
    check_bool("1 and ''", false);
    check_bool("0 or ''", false);
    check_bool("0 or 'x'", true);
}
