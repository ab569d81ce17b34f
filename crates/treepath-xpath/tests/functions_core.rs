mod support;

use rstest::rstest;
use support::{eval, eval_no_context, names, single_atomic, strings};
use treepath_xpath::host::{elem, text};
use treepath_xpath::{ErrorCode, XPath2Parser, XdmAtomicValue};

fn check_string(path: &str, expected: &str) {
    let seq = eval_no_context(path);
    assert_eq!(
        single_atomic(&seq),
        XdmAtomicValue::String(expected.to_string()),
        "{path}"
    );
}

#[test]
fn concat_joins_string_values() {
    check_string("concat('foo', ' ', 'bar')", "foo bar");
    check_string("concat('a', 1, 'b')", "a1b");
}

#[rstest]
#[case("starts-with('abcd', 'ab')", true)]
#[case("starts-with('abcd', 'cd')", false)]
#[case("contains('abcd', 'bc')", true)]
#[case("contains('abcd', 'x')", false)]
fn string_predicates(#[case] path: &str, #[case] expected: bool) {
    let seq = eval_no_context(path);
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(expected));
}

#[test]
fn substring_family() {
    check_string("substring('12345', 2)", "2345");
    check_string("substring('12345', 2, 3)", "234");
    check_string("substring('12345', 0)", "12345");
    check_string("substring('12345', 1.5, 2.6)", "234");
    check_string("substring('12345', number('x'))", "");
    check_string("substring-before('1999/04/01', '/')", "1999");
    check_string("substring-after('1999/04/01', '/')", "04/01");
    check_string("substring-before('abc', 'x')", "");
}

#[test]
fn string_length_and_normalization() {
    let seq = eval_no_context("string-length('abc')");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Integer(3));
    check_string("normalize-space('  a \t  b  ')", "a b");
    check_string("translate('bar', 'abc', 'ABC')", "BAr");
    check_string("translate('--aaa--', 'abc-', 'ABC')", "AAA");
}

#[test]
fn string_of_nodes_concatenates_descendant_text() {
    let root = elem("r")
        .child(elem("a").child(text("one ")))
        .child(elem("b").child(text("two")))
        .build();
    let (_, seq) = eval(&root, "string(/r)");
    assert_eq!(strings(&seq), ["one two"]);
}

#[test]
fn number_and_numeric_functions() {
    let seq = eval_no_context("number('12.5')");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Double(12.5));
    check_string("string(number('abc'))", "NaN");

    let seq = eval_no_context("floor(2.6)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Decimal(2.0));
    let seq = eval_no_context("ceiling(2.2)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Decimal(3.0));
    let seq = eval_no_context("round(2.5)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Decimal(3.0));
    // Halves round toward positive infinity.
    let seq = eval_no_context("round(-2.5)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Decimal(-2.0));
    let seq = eval_no_context("floor(3)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Integer(3));
}

#[test]
fn sum_follows_the_operand_types() {
    let seq = eval_no_context("sum((1, 2, 3))");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Integer(6));
    let seq = eval_no_context("sum(())");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Integer(0));
    let seq = eval_no_context("sum((), 'zero')");
    assert_eq!(
        single_atomic(&seq),
        XdmAtomicValue::String("zero".to_string())
    );
    let seq = eval_no_context("sum((1.5, 2.5))");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Decimal(4.0));
    let err = XPath2Parser::new().parse("sum((1, 'x'))").unwrap_err();
    assert_eq!(err.code, ErrorCode::FORG0006);
}

#[test]
fn sum_over_attribute_values() {
    let root = elem("r")
        .child(elem("x").attr("v", "1"))
        .child(elem("x").attr("v", "2"))
        .build();
    let (_, seq) = eval(&root, "sum(/r/x/@v)");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Double(3.0));
}

#[test]
fn name_functions_report_qualified_names() {
    let root = elem("r")
        .namespace("p", "urn:one")
        .child(elem("{urn:one}child"))
        .build();
    let parser = XPath2Parser::new().with_namespace("p", "urn:one");
    let compiled = parser.parse("name(/r/p:child)").unwrap();
    let built = treepath_xpath::tree_builders::build_node_tree(&root);
    let mut ctx = treepath_xpath::DynamicContextBuilder::new()
        .with_tree(built.tree.clone())
        .build();
    let seq = compiled.evaluate(&mut ctx).unwrap();
    assert_eq!(strings(&seq), ["p:child"]);

    let compiled = parser.parse("local-name(/r/p:child)").unwrap();
    let mut ctx = treepath_xpath::DynamicContextBuilder::new()
        .with_tree(built.tree.clone())
        .build();
    assert_eq!(strings(&compiled.evaluate(&mut ctx).unwrap()), ["child"]);

    let compiled = parser.parse("namespace-uri(/r/p:child)").unwrap();
    let mut ctx = treepath_xpath::DynamicContextBuilder::new()
        .with_tree(built.tree.clone())
        .build();
    assert_eq!(strings(&compiled.evaluate(&mut ctx).unwrap()), ["urn:one"]);
}

#[test]
fn position_and_last_in_predicates() {
    let root = elem("r")
        .child(elem("a"))
        .child(elem("b"))
        .child(elem("c"))
        .build();
    let (tree, seq) = eval(&root, "/r/*[position() > 1]");
    assert_eq!(names(&tree, &seq), ["b", "c"]);
    let (tree, seq) = eval(&root, "/r/*[position() = last()]");
    assert_eq!(names(&tree, &seq), ["c"]);
}

#[test]
fn id_matches_xml_id_attributes() {
    let root = elem("r")
        .child(elem("a").attr("{http://www.w3.org/XML/1998/namespace}id", "one"))
        .child(elem("b").attr("{http://www.w3.org/XML/1998/namespace}id", "two"))
        .build();
    let (tree, seq) = eval(&root, "id('two')");
    assert_eq!(names(&tree, &seq), ["b"]);
    let (tree, seq) = eval(&root, "id('one two')");
    assert_eq!(names(&tree, &seq), ["a", "b"]);
}

#[test]
fn lang_checks_the_ancestor_language() {
    let root = elem("r")
        .attr("{http://www.w3.org/XML/1998/namespace}lang", "en-US")
        .child(elem("a"))
        .build();
    let (_, seq) = eval(&root, "/r/a[lang('en')]");
    assert_eq!(seq.len(), 1);
    let (_, seq) = eval(&root, "/r/a[lang('de')]");
    assert!(seq.is_empty());
}

#[test]
fn boolean_constants() {
    let seq = eval_no_context("true()");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(true));
    let seq = eval_no_context("false()");
    assert_eq!(single_atomic(&seq), XdmAtomicValue::Boolean(false));
}
