mod support;

use rstest::rstest;
use support::compile;
use treepath_xpath::{ErrorCode, XPath1Parser, XPath2Parser};

#[rstest]
#[case("/A/B2/*")]
#[case("//C2")]
#[case("count(/r/x)")]
#[case("concat('foo', ' ', 'bar')")]
#[case("1 + 2 * 3")]
#[case("for $x in /r/* return name($x)")]
#[case("some $v in (1, 2) satisfies $v gt 1")]
#[case("a/b[2]/c")]
#[case("//C2[@a = '1']")]
#[case("5 cast as xs:integer?")]
#[case("$x instance of xs:integer+")]
#[case("if (1) then 'a' else 'b'")]
#[case("child::*/parent::node()")]
#[case("- 3")]
fn canonical_source_round_trips(#[case] path: &str) {
    let first = compile(path);
    let canonical = first.canonical_source();
    let second = compile(&canonical);
    assert_eq!(
        first.root, second.root,
        "{path:?} -> {canonical:?} did not re-parse to an equal tree"
    );
    assert_eq!(canonical, second.canonical_source());
}

#[test]
fn precedence_shapes() {
    let compiled = compile("1 + 2 * 3");
    assert_eq!(compiled.root.symbol, "+");
    assert_eq!(compiled.root.operands[1].symbol, "*");

    let compiled = compile("1 < 2 or 3 < 4 and 5 < 6");
    assert_eq!(compiled.root.symbol, "or");
    assert_eq!(compiled.root.operands[1].symbol, "and");

    // Unary minus binds looser than a path.
    let compiled = compile("-a/b");
    assert_eq!(compiled.root.symbol, "-");
    assert_eq!(compiled.root.operands[0].symbol, "/");
}

#[test]
fn predicates_bind_to_the_step() {
    let compiled = compile("/a/b[1]");
    assert_eq!(compiled.root.symbol, "/");
    let step = &compiled.root.operands[1];
    assert_eq!(step.symbol, "[");
    assert_eq!(step.operands[0].symbol, "(name)");
}

#[rstest]
#[case("1 +")]
#[case(")")]
#[case("child::")]
#[case("a b")]
#[case("/a/")]
#[case("1 = 2 = 3")]
#[case("fn: count(1)")]
fn syntax_errors(#[case] path: &str) {
    let err = XPath2Parser::new().parse(path).expect_err(path);
    assert!(
        matches!(
            err.code,
            ErrorCode::XPST0003 | ErrorCode::XPST0017 | ErrorCode::XPST0010
        ),
        "{path:?} raised {err}"
    );
}

#[test]
fn arithmetic_type_errors_surface_at_parse_time() {
    let err = XPath2Parser::new().parse("1 + \"1\"").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[test]
fn unknown_function_and_prefix() {
    let err = XPath2Parser::new().parse("nosuch()").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017);

    let err = XPath2Parser::new().parse("p:a").unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0081);
}

#[test]
fn keywords_parse_as_element_names_in_steps() {
    for path in ["/div/mod", "/and/or", "@and", "/if", "//union"] {
        compile(path);
    }
}

#[test]
fn nested_comments_are_skipped() {
    let compiled = compile("(: outer (: inner :) still outer :) 1 + (: x :) 2");
    assert_eq!(compiled.root.symbol, "+");
}

#[test]
fn xpath1_rejects_xpath2_grammar() {
    let parser = XPath1Parser::new();
    assert!(parser.parse("for $x in a return $x").is_err());
    assert!(parser.parse("1 eq 1").is_err());
    assert!(parser.parse("()").is_err());
    // The 1.0 grammar itself still works.
    parser.parse("/A/B2/*[last()]").unwrap();
    parser.parse("count(/r/x)").unwrap();
}

#[test]
fn variable_syntax() {
    compile("$x");
    compile("$x + 1");
    // Qualified variable names are a 2.0 feature.
    let err = XPath1Parser::new()
        .with_namespace("p", "urn:p")
        .parse("$p:x")
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003);
    XPath2Parser::new()
        .with_namespace("p", "urn:p")
        .parse("$p:x")
        .unwrap();
}

#[test]
fn error_positions_are_reported() {
    let err = XPath2Parser::new().parse("1 +\n  )").unwrap_err();
    let pos = err.position.expect("a position was expected");
    assert_eq!(pos.line, 2);
}
