mod support;

use rstest::rstest;
use support::{eval, eval_err, eval_no_context, names, scenario_tree, single_atomic, strings};
use treepath_xpath::host::elem;
use treepath_xpath::{ErrorCode, XPath2Parser, XdmAtomicValue, XdmItem};

fn integers(seq: &[XdmItem]) -> Vec<i64> {
    seq.iter()
        .map(|item| match item {
            XdmItem::Atomic(XdmAtomicValue::Integer(i)) => *i,
            other => panic!("unexpected item {other:?}"),
        })
        .collect()
}

#[test]
fn for_expressions_follow_the_driving_sequence() {
    let root = elem("r").child(elem("a")).child(elem("b")).build();
    let (_, seq) = eval(&root, "for $x in /r/* return name($x)");
    assert_eq!(strings(&seq), ["a", "b"]);
}

#[test]
fn for_expressions_build_cartesian_products() {
    let seq = eval_no_context("for $x in (1, 2), $y in (3, 4) return $x * $y");
    assert_eq!(integers(&seq), [3, 4, 6, 8]);
}

#[test]
fn later_clauses_see_earlier_bindings() {
    let seq = eval_no_context("for $x in (1, 2), $y in (1 to $x) return $y");
    assert_eq!(integers(&seq), [1, 1, 2]);
}

#[test]
fn binding_scopes_nest_and_unwind() {
    let seq = eval_no_context("for $x in (1) return for $x in (5) return $x");
    assert_eq!(integers(&seq), [5]);
}

#[rstest]
#[case("some $x in (1, 2, 3) satisfies $x > 2", true)]
#[case("every $x in (1, 2, 3) satisfies $x > 2", false)]
#[case("every $x in (1, 2, 3) satisfies $x > 0", true)]
#[case("some $x in () satisfies $x", false)]
#[case("every $x in () satisfies $x", true)]
#[case("some $x in (1, 2), $y in (2, 3) satisfies $x = $y", true)]
fn quantified_expressions(#[case] path: &str, #[case] expected: bool) {
    let seq = eval_no_context(path);
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(expected));
}

#[test]
fn conditional_expressions() {
    let seq = eval_no_context("if (1) then 'a' else 'b'");
    assert_eq!(strings(&seq), ["a"]);
    let seq = eval_no_context("if (()) then 'a' else 'b'");
    assert_eq!(strings(&seq), ["b"]);
}

#[test]
fn range_expressions() {
    assert_eq!(integers(&eval_no_context("1 to 4")), [1, 2, 3, 4]);
    assert!(eval_no_context("5 to 3").is_empty());
    assert_eq!(
        single_atomic(&eval_no_context("count(1 to 100)")),
        XdmAtomicValue::Integer(100)
    );
}

#[test]
fn sequences_flatten_on_construction() {
    let seq = eval_no_context("(1, (2, 3), ())");
    assert_eq!(integers(&seq), [1, 2, 3]);
    assert!(eval_no_context("()").is_empty());
}

#[rstest]
#[case("5 instance of xs:integer", true)]
#[case("5 instance of xs:decimal", true)]
#[case("5.0 instance of xs:integer", false)]
#[case("'x' instance of xs:string", true)]
#[case("5 instance of xs:string", false)]
#[case("(1, 2) instance of xs:integer+", true)]
#[case("(1, 2) instance of xs:integer?", false)]
#[case("() instance of empty-sequence()", true)]
#[case("() instance of xs:integer*", true)]
#[case("5 instance of item()", true)]
fn instance_of_expressions(#[case] path: &str, #[case] expected: bool) {
    let seq = eval_no_context(path);
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(expected), "{path}");
}

#[test]
fn instance_of_node_kinds() {
    let root = scenario_tree();
    let (_, seq) = eval(&root, "/A instance of element()");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "/A instance of element(A)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "/A instance of element(B1)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
    let (_, seq) = eval(&root, "/A/B2/* instance of element()+");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let (_, seq) = eval(&root, "5 instance of node()");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
}

#[test]
fn unknown_atomic_types_are_static_errors() {
    let err = XPath2Parser::new()
        .parse("'x' instance of xs:nosuch")
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0051);
}

#[test]
fn cast_and_constructor_functions() {
    assert_eq!(
        single_atomic(&eval_no_context("xs:integer('12')")),
        XdmAtomicValue::Integer(12)
    );
    assert_eq!(
        single_atomic(&eval_no_context("'12' cast as xs:integer")),
        XdmAtomicValue::Integer(12)
    );
    assert_eq!(
        single_atomic(&eval_no_context("xs:double('1e2')")),
        XdmAtomicValue::Double(100.0)
    );
    assert_eq!(
        single_atomic(&eval_no_context("xs:string(3.5)")),
        XdmAtomicValue::String("3.5".to_string())
    );
    assert_eq!(
        single_atomic(&eval_no_context("xs:boolean('true')")),
        XdmAtomicValue::Boolean(true)
    );
    assert!(eval_no_context("() cast as xs:integer?").is_empty());
}

#[test]
fn castable_expressions() {
    let seq = eval_no_context("'abc' castable as xs:integer");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
    let seq = eval_no_context("'42' castable as xs:integer");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let seq = eval_no_context("() castable as xs:integer?");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let seq = eval_no_context("() castable as xs:integer");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
}

#[test]
fn invalid_casts_raise_value_errors() {
    let err = XPath2Parser::new().parse("'abc' cast as xs:integer").unwrap_err();
    assert_eq!(err.code, ErrorCode::FORG0001);
    let err = XPath2Parser::new().parse("'x' cast as xs:NOTATION").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0080);
}

#[test]
fn treat_as_checks_without_converting() {
    let seq = eval_no_context("(1, 2) treat as xs:integer+");
    assert_eq!(integers(&seq), [1, 2]);
    let err = XPath2Parser::new().parse("(1, 2) treat as xs:integer").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPDY0050);
}

#[test]
fn integer_division() {
    assert_eq!(
        single_atomic(&eval_no_context("7 idiv 2")),
        XdmAtomicValue::Integer(3)
    );
    assert_eq!(
        single_atomic(&eval_no_context("-7 idiv 2")),
        XdmAtomicValue::Integer(-3)
    );
    let err = XPath2Parser::new().parse("1 idiv 0").unwrap_err();
    assert_eq!(err.code, ErrorCode::FOAR0001);
}

#[test]
fn arithmetic_promotion_and_errors() {
    assert_eq!(
        single_atomic(&eval_no_context("1 + 2")),
        XdmAtomicValue::Integer(3)
    );
    assert_eq!(
        single_atomic(&eval_no_context("1 div 2")),
        XdmAtomicValue::Decimal(0.5)
    );
    assert_eq!(
        single_atomic(&eval_no_context("1.5 + 1")),
        XdmAtomicValue::Decimal(2.5)
    );
    assert_eq!(
        single_atomic(&eval_no_context("1e0 + 1")),
        XdmAtomicValue::Double(2.0)
    );
    assert!(eval_no_context("() + 1").is_empty());
    let err = XPath2Parser::new().parse("1 div 0").unwrap_err();
    assert_eq!(err.code, ErrorCode::FOAR0001);
    // Double division follows IEEE rules instead.
    assert_eq!(
        single_atomic(&eval_no_context("1e0 div 0")),
        XdmAtomicValue::Double(f64::INFINITY)
    );
    assert_eq!(
        single_atomic(&eval_no_context("5 mod 3")),
        XdmAtomicValue::Integer(2)
    );
    assert_eq!(
        single_atomic(&eval_no_context("-5 mod 3")),
        XdmAtomicValue::Integer(-2)
    );
}

#[test]
fn set_operators_on_node_sequences() {
    let root = scenario_tree();
    let (tree, seq) = eval(&root, "//C1 | //C3 | //C2");
    assert_eq!(names(&tree, &seq), ["C1", "C2", "C3"]);

    let (tree, seq) = eval(&root, "/A/B2/* intersect (//C2 | //C3)");
    assert_eq!(names(&tree, &seq), ["C2", "C3"]);

    let (tree, seq) = eval(&root, "/A/B2/* except //C2");
    assert_eq!(names(&tree, &seq), ["C1", "C3"]);

    let (tree, seq) = eval(&root, "/A/B1 union /A/B2");
    assert_eq!(names(&tree, &seq), ["B1", "B2"]);

    let err = eval_err(&root, "(1, 2) intersect (2)");
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[test]
fn variables_resolve_through_the_dynamic_scope() {
    let err = eval_err(&scenario_tree(), "$nosuch");
    assert_eq!(err.code, ErrorCode::XPST0008);
}
