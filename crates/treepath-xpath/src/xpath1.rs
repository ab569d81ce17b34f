//! XPath 1.0 symbol table: operators, axes, node tests, predicates and the
//! core function library, registered against the TDOP framework.
//!
//! The XPath 2.0 table starts from this one and re-registers what the 2.0
//! grammar changes.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::consts::{XML_URI, XSD_URI};
use crate::context::{Axis, EvalContext, StaticContext};
use crate::errors::{Error, ErrorCode};
use crate::evaluator::{
    self, atomize, atomized_singleton, doc_order_distinct, effective_boolean_value,
    number_value_of, string_value_of, ArithOp, ComparisonOp,
};
use crate::nodes::{NodeId, NodeKind, NodeTree};
use crate::sequence_types::{NameOrWildcard, NodeTest};
use crate::tdop::{
    nud_prefix, CompiledXPath, Label, Parser, SymbolTable, Token, TokenValue,
};
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};

/// Symbols a path step may start with (besides axis/kind-test labels).
pub(crate) const PATH_STEP_SYMBOLS: &[&str] = &[
    "(integer)",
    "(string)",
    "(decimal)",
    "(double)",
    "(name)",
    "*",
    "@",
    "..",
    ".",
    "{",
];

const AXES: &[&str] = &[
    "child",
    "descendant",
    "attribute",
    "self",
    "descendant-or-self",
    "following-sibling",
    "following",
    "namespace",
    "parent",
    "ancestor",
    "preceding-sibling",
    "preceding",
    "ancestor-or-self",
];

pub(crate) fn axis_from_symbol(symbol: &str) -> Option<Axis> {
    Some(match symbol {
        "child" => Axis::Child,
        "descendant" => Axis::Descendant,
        "attribute" | "@" => Axis::Attribute,
        "self" => Axis::SelfAxis,
        "descendant-or-self" => Axis::DescendantOrSelf,
        "following-sibling" => Axis::FollowingSibling,
        "following" => Axis::Following,
        "namespace" => Axis::Namespace,
        "parent" => Axis::Parent,
        "ancestor" => Axis::Ancestor,
        "preceding-sibling" => Axis::PrecedingSibling,
        "preceding" => Axis::Preceding,
        "ancestor-or-self" => Axis::AncestorOrSelf,
        _ => return None,
    })
}

/// The shared XPath 1.0 grammar.
pub fn symbol_table() -> &'static SymbolTable {
    static TABLE: Lazy<SymbolTable> = Lazy::new(build_symbol_table);
    &TABLE
}

/// XPath 1.0 parser facade: a configured static context over the shared
/// symbol table.
#[derive(Debug, Clone)]
pub struct XPath1Parser {
    sctx: StaticContext,
}

impl Default for XPath1Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl XPath1Parser {
    pub fn new() -> Self {
        Self {
            sctx: StaticContext::xpath1(),
        }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix != "xml" {
            self.sctx.namespaces.insert(prefix, uri.into());
        }
        self
    }

    pub fn with_namespaces(mut self, namespaces: &HashMap<String, String>) -> Self {
        for (p, u) in namespaces {
            if p != "xml" {
                self.sctx.namespaces.insert(p.clone(), u.clone());
            }
        }
        self
    }

    /// Declare an in-scope variable name. XPath 1.0 variables carry no
    /// static type beyond `item()*`.
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.sctx.variable_types.insert(
            name.into(),
            crate::sequence_types::SequenceType::Typed {
                item: crate::sequence_types::ItemType::AnyItem,
                occurrence: crate::sequence_types::Occurrence::ZeroOrMore,
            },
        );
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.sctx.strict = strict;
        self
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.sctx
    }

    pub fn parse(&self, source: &str) -> Result<CompiledXPath, Error> {
        parse_with(&self.sctx, symbol_table(), source)
    }
}

/// Parse and statically analyze: evaluation without data runs over the
/// fresh tree, and only a genuine missing-context condition is absorbed.
pub(crate) fn parse_with(
    sctx: &StaticContext,
    table: &SymbolTable,
    source: &str,
) -> Result<CompiledXPath, Error> {
    let mut parser = Parser::new(sctx, table);
    let root = parser.parse(source)?;
    let compiled = CompiledXPath {
        root,
        static_ctx: Arc::new(sctx.clone()),
        source: source.to_string(),
    };
    match compiled.evaluate_static() {
        Ok(_) => {}
        Err(e) if e.is_missing_context() => {}
        Err(e) => return Err(e),
    }
    tracing::debug!(source, "expression compiled");
    Ok(compiled)
}

pub(crate) fn build_symbol_table() -> SymbolTable {
    let mut t = SymbolTable::new();

    // Plain symbols.
    for s in [",", ")", "]", "::", "}", "(end)"] {
        t.symbol(s);
    }

    // Literals.
    t.literal("(string)");
    t.literal("(integer)");
    t.literal("(decimal)");
    t.literal("(double)");

    // Names.
    {
        let spec = t.register("(name)");
        spec.label = Label::Literal;
        spec.lbp = 10;
    }
    t.set_nud("(name)", nud_name);
    t.set_eval("(name)", eval_name);

    // QName composition.
    {
        let spec = t.register(":");
        spec.lbp = 110;
        spec.rbp = 100;
        spec.label = Label::Operator;
    }
    t.set_led(":", led_colon);
    t.set_eval(":", eval_colon);

    // Braced URI name (ElementTree-style extension, strict = false only).
    {
        let spec = t.register("{");
        spec.lbp = 110;
        spec.rbp = 100;
        spec.label = Label::Operator;
    }
    t.set_nud("{", nud_braced_uri);
    t.set_eval("{", eval_braced_uri);

    // Variable reference.
    {
        let spec = t.register("$");
        spec.lbp = 90;
        spec.rbp = 100;
        spec.label = Label::Operator;
    }
    t.set_nud("$", nud_var_reference);
    t.set_eval("$", eval_var_reference);

    // Wildcard and context-item shorthands.
    t.nullary("*");
    t.set_eval("*", eval_star);
    t.nullary(".");
    t.set_eval(".", eval_context_item);
    t.nullary("..");
    t.set_eval("..", eval_parent_shorthand);

    // Logical operators.
    t.infix("or", 25);
    t.set_eval("or", eval_or);
    t.infix("and", 30);
    t.set_eval("and", eval_and);

    // General comparisons (non-associative).
    for s in ["=", "!=", "<", "<=", ">", ">="] {
        let spec = t.register(s);
        spec.label = Label::Operator;
        spec.lbp = 40;
        spec.rbp = 40;
        t.set_led(s, led_comparison);
        t.set_eval(s, eval_general_comparison);
    }

    // Arithmetic. `+` and `-` double as unary prefixes with a tighter
    // right binding power.
    for s in ["+", "-"] {
        let spec = t.register(s);
        spec.label = Label::Operator;
        spec.lbp = 50;
        spec.rbp = 75;
        t.set_nud(s, nud_prefix);
        t.set_led(s, led_additive);
        t.set_eval(s, eval_arithmetic);
    }
    {
        let spec = t.register("*");
        spec.lbp = 55;
        t.set_led("*", led_multiplicative);
        // eval_star dispatches between product and wildcard.
    }
    t.infix("div", 55);
    t.set_eval("div", eval_arithmetic);
    t.infix("mod", 55);
    t.set_eval("mod", eval_arithmetic);

    // Union.
    t.infix("|", 60);
    t.set_eval("|", eval_union);

    // Paths.
    {
        let spec = t.register("/");
        spec.label = Label::Operator;
        spec.lbp = 90;
        spec.rbp = 90;
    }
    t.set_nud("/", nud_slash);
    t.set_led("/", led_slash);
    t.set_eval("/", eval_slash);
    {
        let spec = t.register("//");
        spec.label = Label::Operator;
        spec.lbp = 90;
        spec.rbp = 90;
    }
    t.set_nud("//", nud_double_slash);
    t.set_led("//", led_slash);
    t.set_eval("//", eval_double_slash);

    // Predicate filter.
    {
        let spec = t.register("[");
        spec.label = Label::Operator;
        spec.lbp = 100;
    }
    t.set_led("[", led_predicate);
    t.set_eval("[", eval_predicate);

    // Parenthesized expression.
    {
        let spec = t.register("(");
        spec.label = Label::Operator;
        spec.lbp = 105;
    }
    t.set_nud("(", nud_group);
    t.set_eval("(", eval_group);

    // Attribute shorthand.
    {
        let spec = t.register("@");
        spec.label = Label::Operator;
        spec.lbp = 90;
        spec.rbp = 100;
    }
    t.set_nud("@", nud_attribute_shorthand);
    t.set_eval("@", eval_axis_step);

    // Axes.
    for axis in AXES {
        t.axis(axis, 90);
        t.register(axis).rbp = 100;
        t.set_eval(axis, eval_axis_step);
    }

    // Kind tests.
    t.function("node", 0, Some(0), Label::KindTest, 90);
    t.set_eval("node", eval_kind_test);
    t.function("text", 0, Some(0), Label::KindTest, 90);
    t.set_eval("text", eval_kind_test);
    t.function("comment", 0, Some(0), Label::KindTest, 90);
    t.set_eval("comment", eval_kind_test);
    t.function("processing-instruction", 0, Some(1), Label::KindTest, 90);
    t.set_nud("processing-instruction", nud_pi_kind_test);
    t.set_eval("processing-instruction", eval_kind_test);

    // Node set functions.
    t.function("last", 0, Some(0), Label::Function, 90);
    t.set_eval("last", eval_fn_last);
    t.function("position", 0, Some(0), Label::Function, 90);
    t.set_eval("position", eval_fn_position);
    t.function("count", 1, Some(1), Label::Function, 90);
    t.set_eval("count", eval_fn_count);
    t.function("id", 1, Some(1), Label::Function, 90);
    t.set_eval("id", eval_fn_id);
    t.function("name", 0, Some(1), Label::Function, 90);
    t.set_eval("name", eval_fn_name);
    t.function("local-name", 0, Some(1), Label::Function, 90);
    t.set_eval("local-name", eval_fn_name);
    t.function("namespace-uri", 0, Some(1), Label::Function, 90);
    t.set_eval("namespace-uri", eval_fn_name);

    // String functions.
    t.function("string", 0, Some(1), Label::Function, 90);
    t.set_eval("string", eval_fn_string);
    t.function("concat", 2, None, Label::Function, 90);
    t.set_eval("concat", eval_fn_concat);
    t.function("starts-with", 2, Some(2), Label::Function, 90);
    t.set_eval("starts-with", eval_fn_starts_with);
    t.function("contains", 2, Some(2), Label::Function, 90);
    t.set_eval("contains", eval_fn_contains);
    t.function("substring-before", 2, Some(2), Label::Function, 90);
    t.set_eval("substring-before", eval_fn_substring_before_after);
    t.function("substring-after", 2, Some(2), Label::Function, 90);
    t.set_eval("substring-after", eval_fn_substring_before_after);
    t.function("substring", 2, Some(3), Label::Function, 90);
    t.set_eval("substring", eval_fn_substring);
    t.function("string-length", 0, Some(1), Label::Function, 90);
    t.set_eval("string-length", eval_fn_string_length);
    t.function("normalize-space", 0, Some(1), Label::Function, 90);
    t.set_eval("normalize-space", eval_fn_normalize_space);
    t.function("translate", 3, Some(3), Label::Function, 90);
    t.set_eval("translate", eval_fn_translate);

    // Boolean functions.
    t.function("boolean", 1, Some(1), Label::Function, 90);
    t.set_eval("boolean", eval_fn_boolean);
    t.function("not", 1, Some(1), Label::Function, 90);
    t.set_eval("not", eval_fn_not);
    t.function("true", 0, Some(0), Label::Function, 90);
    t.set_eval("true", eval_fn_true);
    t.function("false", 0, Some(0), Label::Function, 90);
    t.set_eval("false", eval_fn_false);
    t.function("lang", 1, Some(1), Label::Function, 90);
    t.set_eval("lang", eval_fn_lang);

    // Number functions.
    t.function("number", 0, Some(1), Label::Function, 90);
    t.set_eval("number", eval_fn_number);
    t.function("sum", 1, Some(2), Label::Function, 90);
    t.set_eval("sum", eval_fn_sum);
    t.function("floor", 1, Some(1), Label::Function, 90);
    t.set_eval("floor", eval_fn_floor_ceiling);
    t.function("ceiling", 1, Some(1), Label::Function, 90);
    t.set_eval("ceiling", eval_fn_floor_ceiling);
    t.function("round", 1, Some(1), Label::Function, 90);
    t.set_eval("round", eval_fn_round);

    t
}

//
// Parse routines.
//

fn nud_name(parser: &mut Parser<'_>, token: Token) -> Result<Token, Error> {
    if parser.next_is("(") {
        return Err(token.error(
            ErrorCode::XPST0017,
            format!(
                "unknown function '{}'",
                token.value.as_str().unwrap_or_default()
            ),
        ));
    }
    if parser.next_is("::") {
        let code = if parser.sctx.compatibility_mode {
            ErrorCode::XPST0010
        } else {
            ErrorCode::XPST0003
        };
        return Err(token.error(
            code,
            format!("axis '{}::' not found", token.value.as_str().unwrap_or_default()),
        ));
    }
    Ok(token)
}

/// Local names of the function tokens that double as `xs:` constructors.
const CONSTRUCTOR_FN_LOCALS: &[&str] = &["string", "boolean", "QName"];

fn led_colon(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    match left.symbol.as_str() {
        "(name)" => {}
        "*" if parser.sctx.version == crate::context::XPathVersion::V2 => {}
        _ => return Err(token.wrong_syntax("invalid left operand for ':'")),
    }
    if parser.is_spaced() {
        return Err(token.wrong_syntax("a QName cannot contain spaces before or after ':'"));
    }
    if !parser.next_label().is_callable() {
        parser.expected_name(&["(name)", "*"], "a name or a wildcard expected")?;
    }

    if left.symbol == "(name)" {
        let prefix = left.value.as_str().unwrap_or_default().to_string();
        let namespace = parser
            .sctx
            .namespaces
            .get(&prefix)
            .cloned()
            .ok_or_else(|| {
                token.error(
                    ErrorCode::XPST0081,
                    format!("prefix '{prefix}' is not declared"),
                )
            })?;
        // Function and constructor names are limited to their namespaces.
        let next_label = parser.next_label();
        if next_label.is_callable() {
            if Some(namespace.as_str()) == parser.sctx.function_namespace.as_deref() {
                if next_label != Label::Function {
                    return Err(token.error(
                        ErrorCode::XPST0017,
                        "a function name expected after a function-namespace prefix",
                    ));
                }
            } else if namespace == XSD_URI {
                let symbol = parser.next_token.symbol.clone();
                if next_label != Label::ConstructorFunction
                    && !CONSTRUCTOR_FN_LOCALS.contains(&symbol.as_str())
                {
                    return Err(token.error(
                        ErrorCode::XPST0017,
                        format!("unknown constructor function 'xs:{symbol}'"),
                    ));
                }
            } else {
                return Err(token.wrong_syntax("a name or a wildcard expected"));
            }
        }
    }

    let right = parser.expression(token.rbp)?;
    if right.symbol == ":" {
        return Err(token.wrong_syntax("a QName cannot contain multiple ':'"));
    }
    let left_text = match left.symbol.as_str() {
        "(name)" => left.value.as_str().unwrap_or_default().to_string(),
        other => other.to_string(),
    };
    let right_text = match right.symbol.as_str() {
        "(name)" => right.value.as_str().unwrap_or_default().to_string(),
        other => other.to_string(),
    };
    token.value = TokenValue::Str(format!("{left_text}:{right_text}"));
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

fn nud_braced_uri(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    if parser.sctx.strict {
        return Err(token.wrong_syntax("braced URI names require a non-strict parser"));
    }
    let uri = parser.advance_until(&["}"])?;
    parser.advance()?;
    if !parser.next_label().is_callable() {
        parser.expected_name(&["(name)", "*"], "a name or a wildcard expected")?;
    }
    let uri_token = parser.new_token("(string)", TokenValue::Str(uri))?;
    let right = parser.expression(token.rbp)?;
    token.operands.push(uri_token);
    token.operands.push(right);
    Ok(token)
}

fn eval_braced_uri(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let right = &token.operands[1];
    if right.label.is_callable() {
        return right.evaluate(ec);
    }
    let uri = token.operands[0].value.as_str().unwrap_or_default().to_string();
    let local = match right.symbol.as_str() {
        "(name)" => right.value.as_str().unwrap_or_default().to_string(),
        _ => "*".to_string(),
    };
    let test = if local == "*" {
        NameTestKind::NsWildcard(uri)
    } else {
        NameTestKind::Exact {
            ns_uri: Some(uri),
            local,
        }
    };
    select_by_name(token, ec, test)
}

fn nud_var_reference(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.expected_name(&["(name)"], "a variable name expected")?;
    let operand = parser.expression(token.rbp)?;
    if operand.symbol == ":" && parser.sctx.version == crate::context::XPathVersion::V1 {
        return Err(
            operand.wrong_syntax("a variable reference requires a simple reference name")
        );
    }
    token.operands.push(operand);
    Ok(token)
}

fn eval_var_reference(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    // Both `(name)` and qualified `:` operands carry the reference name in
    // their value.
    let name = token.operands[0]
        .value
        .as_str()
        .unwrap_or_default()
        .to_string();
    let dctx = ec.dyn_ctx()?;
    match dctx.variable(&name) {
        Some(value) => Ok(value.clone()),
        None => Err(token.missing_name(format!("unknown variable '{name}'"))),
    }
}

fn eval_or(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let left = effective_boolean_value(&token.operands[0].evaluate(ec)?)?;
    let value = left || effective_boolean_value(&token.operands[1].evaluate(ec)?)?;
    Ok(vec![XdmAtomicValue::Boolean(value).into()])
}

fn eval_and(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let left = effective_boolean_value(&token.operands[0].evaluate(ec)?)?;
    let value = left && effective_boolean_value(&token.operands[1].evaluate(ec)?)?;
    Ok(vec![XdmAtomicValue::Boolean(value).into()])
}

fn led_comparison(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    if ComparisonOp::from_general_symbol(&left.symbol).is_some() {
        return Err(token.wrong_syntax("comparison operators are not associative"));
    }
    let right = parser.expression(40)?;
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

fn eval_general_comparison(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let op = ComparisonOp::from_general_symbol(&token.symbol)
        .expect("registered for comparison symbols only");
    let left = token.operands[0].evaluate(ec)?;
    let right = token.operands[1].evaluate(ec)?;
    let tree = ec.tree().ok();
    let timezone = ec.dyn_ref().ok().and_then(|d| d.timezone);
    let value = evaluator::general_compare(
        &left,
        &right,
        op,
        ec.sctx.compatibility_mode,
        tree.as_deref(),
        timezone,
    )?;
    Ok(vec![XdmAtomicValue::Boolean(value).into()])
}

fn led_additive(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    let right = parser.expression(50)?;
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

fn led_multiplicative(
    parser: &mut Parser<'_>,
    mut token: Token,
    left: Token,
) -> Result<Token, Error> {
    let right = parser.expression(55)?;
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

pub(crate) fn eval_arithmetic(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let op = match token.symbol.as_str() {
        "+" => ArithOp::Add,
        "-" => ArithOp::Sub,
        "*" => ArithOp::Mul,
        "div" => ArithOp::Div,
        "idiv" => ArithOp::IDiv,
        "mod" => ArithOp::Mod,
        other => return Err(token.wrong_syntax(format!("not an arithmetic operator: {other}"))),
    };
    let timezone = ec.dyn_ref().ok().and_then(|d| d.timezone);

    if token.arity() == 1 {
        let seq = token.operands[0].evaluate(ec)?;
        let tree = ec.tree().ok();
        let Some(value) = atomized_singleton(&seq, tree.as_deref())? else {
            return Ok(Vec::new());
        };
        let negate = token.symbol == "-";
        return Ok(vec![evaluator::numeric_unary(value, negate)?.into()]);
    }

    let left = token.operands[0].evaluate(ec)?;
    let right = token.operands[1].evaluate(ec)?;
    let tree = ec.tree().ok();
    let Some(mut a) = atomized_singleton(&left, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    let Some(mut b) = atomized_singleton(&right, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    // XPath 1.0 arithmetic coerces every operand through fn:number.
    if ec.sctx.version == crate::context::XPathVersion::V1 {
        a = XdmAtomicValue::Double(a.number_value());
        b = XdmAtomicValue::Double(b.number_value());
    }
    Ok(vec![evaluator::arithmetic(op, a, b, timezone)?.into()])
}

fn eval_union(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let mut combined = token.operands[0].evaluate(ec)?;
    combined.extend(token.operands[1].evaluate(ec)?);
    if combined.is_empty() {
        return Ok(combined);
    }
    let tree = ec.tree()?;
    doc_order_distinct(combined, &tree)
        .map_err(|_| token.wrong_context_type("union operands must be node sequences"))
}

//
// Paths and steps.
//

fn step_starts_here(parser: &Parser<'_>) -> bool {
    let label = parser.next_label();
    if matches!(label, Label::Axis | Label::KindTest) {
        return true;
    }
    if parser.sctx.version == crate::context::XPathVersion::V2
        && matches!(label, Label::Function | Label::ConstructorFunction)
    {
        return true;
    }
    false
}

fn nud_slash(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    if !step_starts_here(parser) {
        let mut symbols: Vec<&str> = PATH_STEP_SYMBOLS.to_vec();
        if parser.sctx.version == crate::context::XPathVersion::V2 {
            symbols.push("(");
        }
        if parser
            .expected_name(&symbols, "invalid path step")
            .is_err()
        {
            // A bare '/' selects the document root.
            return Ok(token);
        }
    }
    let operand = parser.expression(token.rbp)?;
    token.operands.push(operand);
    Ok(token)
}

fn nud_double_slash(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    if !step_starts_here(parser) {
        let mut symbols: Vec<&str> = PATH_STEP_SYMBOLS.to_vec();
        if parser.sctx.version == crate::context::XPathVersion::V2 {
            symbols.push("(");
        }
        parser.expected_name(&symbols, "invalid path step")?;
    }
    let operand = parser.expression(token.rbp)?;
    token.operands.push(operand);
    Ok(token)
}

fn led_slash(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    if !step_starts_here(parser) {
        let mut symbols: Vec<&str> = PATH_STEP_SYMBOLS.to_vec();
        if parser.sctx.version == crate::context::XPathVersion::V2 {
            symbols.push("(");
        }
        parser.expected_name(&symbols, "invalid path step")?;
    }
    let right = parser.expression(token.rbp)?;
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

fn eval_slash(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    match token.arity() {
        0 => {
            // A bare '/' selects the document node.
            let root = tree.root();
            if tree.kind(root) == NodeKind::Document {
                Ok(vec![XdmItem::Node(root)])
            } else {
                Ok(Vec::new())
            }
        }
        1 => {
            let saved = ec.dyn_ctx()?.save_focus();
            {
                let dctx = ec.dyn_ctx()?;
                dctx.item = None;
                dctx.axis = None;
            }
            let result = token.operands[0].evaluate(ec);
            ec.dyn_ctx()?.restore_focus(saved);
            normalize_path_result(token, result?, &tree)
        }
        _ => {
            let left = token.operands[0].evaluate(ec)?;
            for item in &left {
                if !item.is_node() {
                    return Err(token.error(
                        ErrorCode::XPTY0019,
                        "an intermediate path step contains an atomic value",
                    ));
                }
            }
            let saved = ec.dyn_ctx()?.save_focus();
            let mut out = Vec::new();
            let n = left.len();
            let result: Result<(), Error> = (|| {
                for (i, item) in left.iter().enumerate() {
                    {
                        let dctx = ec.dyn_ctx()?;
                        dctx.set_focus(Some(item.clone()), i + 1, n);
                        dctx.axis = None;
                    }
                    out.extend(token.operands[1].evaluate(ec)?);
                }
                Ok(())
            })();
            ec.dyn_ctx()?.restore_focus(saved);
            result?;
            normalize_path_result(token, out, &tree)
        }
    }
}

/// Path output normalization: node results become document-ordered and
/// duplicate-free; atomic results are only allowed unmixed.
fn normalize_path_result(
    token: &Token,
    seq: XdmSequence,
    tree: &NodeTree,
) -> Result<XdmSequence, Error> {
    let nodes = seq.iter().filter(|i| i.is_node()).count();
    if nodes == 0 {
        return Ok(seq);
    }
    if nodes != seq.len() {
        return Err(token.error(
            ErrorCode::XPTY0018,
            "a path step result contains both nodes and atomic values",
        ));
    }
    doc_order_distinct(seq, tree)
}

fn eval_double_slash(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let start_nodes: Vec<NodeId> = if token.arity() == 1 {
        vec![tree.root()]
    } else {
        let left = token.operands[0].evaluate(ec)?;
        let mut nodes = Vec::with_capacity(left.len());
        for item in left {
            match item {
                XdmItem::Node(id)
                    if matches!(tree.kind(id), NodeKind::Element | NodeKind::Document) =>
                {
                    nodes.push(id)
                }
                _ => {
                    return Err(token.wrong_type(
                        "the left operand of '//' must return element or document nodes",
                    ));
                }
            }
        }
        nodes
    };

    // `//` is exactly `/descendant-or-self::node()/`: each descendant
    // becomes the context for a default child-axis step.
    let step = &token.operands[token.arity() - 1];
    let saved = ec.dyn_ctx()?.save_focus();
    let mut out = Vec::new();
    let result: Result<(), Error> = (|| {
        for start in start_nodes {
            let members: Vec<NodeId> = tree.iter_descendants(start, true).collect();
            let n = members.len();
            for (i, m) in members.iter().enumerate() {
                {
                    let dctx = ec.dyn_ctx()?;
                    dctx.set_focus(Some(XdmItem::Node(*m)), i + 1, n);
                    dctx.axis = None;
                }
                out.extend(step.evaluate(ec)?);
            }
        }
        Ok(())
    })();
    ec.dyn_ctx()?.restore_focus(saved);
    result?;
    normalize_path_result(token, out, &tree)
}

fn led_predicate(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    let predicate = parser.expression(0)?;
    parser.advance_expected(&["]"])?;
    token.operands.push(left);
    token.operands.push(predicate);
    Ok(token)
}

fn eval_predicate(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let saved = ec.dyn_ctx()?.save_focus();
    // The filtered expression starts its own step: any active axis from an
    // enclosing traversal does not leak into it.
    ec.dyn_ctx()?.axis = None;
    let base = match token.operands[0].evaluate(ec) {
        Ok(seq) => seq,
        Err(e) => {
            ec.dyn_ctx()?.restore_focus(saved);
            return Err(e);
        }
    };
    let mut out = Vec::new();
    let n = base.len();
    let result: Result<(), Error> = (|| {
        for (i, item) in base.iter().enumerate() {
            {
                let dctx = ec.dyn_ctx()?;
                dctx.set_focus(Some(item.clone()), i + 1, n);
                dctx.axis = None;
            }
            let predicate = token.operands[1].evaluate(ec)?;
            let keep = match predicate.as_slice() {
                [XdmItem::Atomic(XdmAtomicValue::Integer(k))] => *k == (i + 1) as i64,
                [XdmItem::Atomic(XdmAtomicValue::Decimal(d))]
                | [XdmItem::Atomic(XdmAtomicValue::Double(d))] => *d == (i + 1) as f64,
                _ => effective_boolean_value(&predicate)?,
            };
            if keep {
                out.push(item.clone());
            }
        }
        Ok(())
    })();
    ec.dyn_ctx()?.restore_focus(saved);
    result?;
    Ok(out)
}

fn nud_group(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    if parser.sctx.version == crate::context::XPathVersion::V2 && parser.next_is(")") {
        parser.advance()?;
        return Ok(token);
    }
    let inner = parser.expression(0)?;
    parser.advance_expected(&[")"])?;
    token.operands.push(inner);
    Ok(token)
}

fn eval_group(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    match token.operands.first() {
        Some(inner) => inner.evaluate(ec),
        None => Ok(Vec::new()),
    }
}

fn nud_attribute_shorthand(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.expected_name(&["*", "(name)"], "invalid attribute specification")?;
    let operand = parser.expression(token.rbp)?;
    token.operands.push(operand);
    Ok(token)
}

//
// Axis and node test machinery.
//

pub(crate) fn axis_members(tree: &NodeTree, axis: Axis, cur: NodeId) -> Vec<NodeId> {
    match axis {
        Axis::Child => tree.children(cur).to_vec(),
        Axis::Descendant => tree.iter_descendants(cur, false).collect(),
        Axis::DescendantOrSelf => tree.iter_descendants(cur, true).collect(),
        Axis::SelfAxis => vec![cur],
        Axis::Attribute => tree.attributes(cur).to_vec(),
        Axis::Namespace => tree.namespaces(cur).to_vec(),
        Axis::Parent => tree.parent(cur).into_iter().collect(),
        Axis::Ancestor => tree.iter_ancestors(cur, false).collect(),
        Axis::AncestorOrSelf => tree.iter_ancestors(cur, true).collect(),
        Axis::FollowingSibling => tree.axis_siblings(cur, true),
        Axis::PrecedingSibling => tree.axis_siblings(cur, false),
        Axis::Following => {
            if matches!(tree.kind(cur), NodeKind::Attribute | NodeKind::Namespace) {
                Vec::new()
            } else {
                tree.axis_following(cur)
            }
        }
        Axis::Preceding => tree.axis_preceding(cur),
    }
}

pub(crate) fn eval_axis_step(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let axis = axis_from_symbol(&token.symbol)
        .expect("registered for axis symbols only");
    let tree = ec.tree()?;
    let cur = {
        let dctx = ec.dyn_ctx()?;
        match &dctx.item {
            None => tree.root(),
            Some(XdmItem::Node(id)) => *id,
            Some(XdmItem::Atomic(_)) => {
                return Err(token.error(
                    ErrorCode::XPTY0020,
                    "the context item for an axis step is not a node",
                ));
            }
        }
    };
    let members = axis_members(&tree, axis, cur);
    let saved = ec.dyn_ctx()?.save_focus();
    let mut out = Vec::new();
    let n = members.len();
    let result: Result<(), Error> = (|| {
        for (i, m) in members.iter().enumerate() {
            {
                let dctx = ec.dyn_ctx()?;
                dctx.set_focus(Some(XdmItem::Node(*m)), i + 1, n);
                dctx.axis = Some(axis);
            }
            out.extend(token.operands[0].evaluate(ec)?);
        }
        Ok(())
    })();
    ec.dyn_ctx()?.restore_focus(saved);
    result?;
    Ok(out)
}

/// The "children or self" iteration behind node tests: with an active axis
/// the test examines just the current item, otherwise the default child
/// axis applies (and an absent item denotes the root).
pub(crate) fn children_or_self(ec: &mut EvalContext<'_>) -> Result<Vec<XdmItem>, Error> {
    let tree = ec.tree()?;
    let dctx = ec.dyn_ctx()?;
    if dctx.axis.is_some() {
        return Ok(dctx.item.iter().cloned().collect());
    }
    match &dctx.item {
        // The absent item denotes the root: a document exposes its
        // children, a bare element root stands in for itself.
        None => {
            let root = tree.root();
            if tree.kind(root) == NodeKind::Document {
                Ok(tree.children(root).iter().map(|c| XdmItem::Node(*c)).collect())
            } else {
                Ok(vec![XdmItem::Node(root)])
            }
        }
        Some(XdmItem::Node(id)) => {
            Ok(tree.children(*id).iter().map(|c| XdmItem::Node(*c)).collect())
        }
        Some(XdmItem::Atomic(_)) => Ok(Vec::new()),
    }
}

pub(crate) fn principal_kind(axis: Option<Axis>) -> NodeKind {
    match axis {
        Some(Axis::Attribute) => NodeKind::Attribute,
        Some(Axis::Namespace) => NodeKind::Namespace,
        _ => NodeKind::Element,
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NameTestKind {
    Exact {
        ns_uri: Option<String>,
        local: String,
    },
    Any,
    NsWildcard(String),
    LocalWildcard(String),
}

fn name_matches(
    tree: &NodeTree,
    id: NodeId,
    principal: NodeKind,
    test: &NameTestKind,
) -> bool {
    if tree.kind(id) != principal {
        return false;
    }
    let name = match tree.name(id) {
        Some(n) => n,
        None => return false,
    };
    if principal == NodeKind::Namespace {
        // The namespace axis matches on the declared prefix.
        return match test {
            NameTestKind::Any => true,
            NameTestKind::Exact { local, .. } => name.local == *local,
            _ => false,
        };
    }
    match test {
        NameTestKind::Any => true,
        NameTestKind::Exact { ns_uri, local } => {
            name.local == *local && name.ns_uri.as_deref() == ns_uri.as_deref()
        }
        NameTestKind::NsWildcard(uri) => name.ns_uri.as_deref() == Some(uri.as_str()),
        NameTestKind::LocalWildcard(local) => name.local == *local,
    }
}

pub(crate) fn select_by_name(
    _token: &Token,
    ec: &mut EvalContext<'_>,
    test: NameTestKind,
) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let members = children_or_self(ec)?;
    let principal = principal_kind(ec.dyn_ref()?.axis);
    let mut out = Vec::new();
    for item in members {
        if let XdmItem::Node(id) = item
            && name_matches(&tree, id, principal, &test)
        {
            out.push(XdmItem::Node(id));
        }
    }
    Ok(out)
}

fn eval_name(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let local = token.value.as_str().unwrap_or_default().to_string();
    // An unprefixed element name test resolves against the default element
    // namespace in XPath 2.0; attribute tests never do.
    let principal_is_element = {
        let axis = ec.dyn_ref()?.axis;
        principal_kind(axis) == NodeKind::Element
    };
    let ns_uri = if principal_is_element
        && ec.sctx.version == crate::context::XPathVersion::V2
    {
        ec.sctx.default_namespace.clone().filter(|u| !u.is_empty())
    } else {
        None
    };
    select_by_name(token, ec, NameTestKind::Exact { ns_uri, local })
}

fn eval_colon(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let left = &token.operands[0];
    let right = &token.operands[1];

    if right.label.is_callable() {
        // `xs:type(...)` is a constructor cast regardless of the right
        // token's own registration; other namespaces delegate.
        if left.symbol == "(name)" {
            let prefix = left.value.as_str().unwrap_or_default();
            if let Some(uri) = ec.sctx.namespaces.get(prefix)
                && uri == XSD_URI
            {
                return crate::xpath2::eval_constructor_for(token, right, ec);
            }
        }
        return right.evaluate(ec);
    }

    let test = if left.symbol == "*" {
        let local = right.value.as_str().unwrap_or_default().to_string();
        NameTestKind::LocalWildcard(local)
    } else {
        let prefix = left.value.as_str().unwrap_or_default().to_string();
        let uri = ec.sctx.namespaces.get(&prefix).cloned().ok_or_else(|| {
            token.error(
                ErrorCode::XPST0081,
                format!("prefix '{prefix}' is not declared"),
            )
        })?;
        if right.symbol == "*" {
            NameTestKind::NsWildcard(uri)
        } else {
            NameTestKind::Exact {
                ns_uri: Some(uri),
                local: right.value.as_str().unwrap_or_default().to_string(),
            }
        }
    };
    select_by_name(token, ec, test)
}

fn eval_star(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    if token.arity() == 2 {
        return eval_arithmetic(token, ec);
    }
    select_by_name(token, ec, NameTestKind::Any)
}

fn eval_context_item(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let dctx = ec.dyn_ctx()?;
    match &dctx.item {
        Some(item) => Ok(vec![item.clone()]),
        None => match &dctx.tree {
            Some(tree) => Ok(vec![XdmItem::Node(tree.root())]),
            None => Err(token.missing_context()),
        },
    }
}

fn eval_parent_shorthand(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let dctx = ec.dyn_ctx()?;
    match &dctx.item {
        Some(XdmItem::Node(id)) => Ok(tree
            .parent(*id)
            .map(XdmItem::Node)
            .into_iter()
            .collect()),
        Some(XdmItem::Atomic(_)) => Err(token.error(
            ErrorCode::XPTY0020,
            "the context item for an axis step is not a node",
        )),
        None => Ok(Vec::new()),
    }
}

//
// Kind tests.
//

fn nud_pi_kind_test(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.advance_expected(&["("])?;
    if !parser.next_is(")") {
        parser.expected_name(&["(name)", "(string)"], "a PI target expected")?;
        token.operands.push(parser.expression(5)?);
    }
    parser.advance_expected(&[")"])?;
    Ok(token)
}

/// Build the structured node test for a kind test token.
pub(crate) fn token_to_node_test(token: &Token, sctx: &StaticContext) -> Result<NodeTest, Error> {
    match token.symbol.as_str() {
        "node" => Ok(NodeTest::AnyKind),
        "text" => Ok(NodeTest::Text),
        "comment" => Ok(NodeTest::Comment),
        "processing-instruction" => {
            let target = token
                .operands
                .first()
                .map(|t| t.value.as_str().unwrap_or_default().to_string());
            Ok(NodeTest::ProcessingInstruction(target))
        }
        "document-node" => {
            let inner = match token.operands.first() {
                Some(t) => Some(Box::new(token_to_node_test(t, sctx)?)),
                None => None,
            };
            Ok(NodeTest::Document(inner))
        }
        "element" | "attribute" => {
            let name = match token.operands.first() {
                None => None,
                Some(t) if t.symbol == "*" => Some(NameOrWildcard::Any),
                Some(t) => Some(NameOrWildcard::Name(resolve_name_token(
                    t,
                    sctx,
                    token.symbol == "element",
                )?)),
            };
            let type_name = match token.operands.get(1) {
                None => None,
                Some(t) => Some(resolve_name_token(t, sctx, false)?),
            };
            if token.symbol == "element" {
                Ok(NodeTest::Element { name, type_name })
            } else {
                Ok(NodeTest::Attribute { name, type_name })
            }
        }
        "schema-element" => {
            let name = token.operands.first().ok_or_else(|| {
                token.wrong_syntax("schema-element() requires a QName argument")
            })?;
            Ok(NodeTest::SchemaElement(resolve_name_token(name, sctx, true)?))
        }
        "schema-attribute" => {
            let name = token.operands.first().ok_or_else(|| {
                token.wrong_syntax("schema-attribute() requires a QName argument")
            })?;
            Ok(NodeTest::SchemaAttribute(resolve_name_token(
                name, sctx, false,
            )?))
        }
        other => Err(token.wrong_syntax(format!("not a kind test: {other}"))),
    }
}

/// Resolve a `(name)` or `prefix:name` token into an expanded name. Element
/// names fall back to the default element namespace.
pub(crate) fn resolve_name_token(
    token: &Token,
    sctx: &StaticContext,
    is_element: bool,
) -> Result<ExpandedName, Error> {
    match token.symbol.as_str() {
        "(name)" => {
            let local = token.value.as_str().unwrap_or_default().to_string();
            let ns_uri = if is_element {
                sctx.default_namespace.clone().filter(|u| !u.is_empty())
            } else {
                None
            };
            Ok(ExpandedName::new(ns_uri, local))
        }
        ":" => {
            let prefix = token.operands[0].value.as_str().unwrap_or_default();
            let local = token.operands[1]
                .value
                .as_str()
                .unwrap_or(token.operands[1].symbol.as_str())
                .to_string();
            let uri = sctx.namespaces.get(prefix).cloned().ok_or_else(|| {
                token.error(
                    ErrorCode::XPST0081,
                    format!("prefix '{prefix}' is not declared"),
                )
            })?;
            Ok(ExpandedName::new(Some(uri), local))
        }
        other => Err(token.wrong_syntax(format!("a QName expected, found '{other}'"))),
    }
}

pub(crate) fn eval_kind_test(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let test = token_to_node_test(token, ec.sctx)?;

    // `/document-node()` examines the root itself.
    if matches!(test, NodeTest::Document(_)) {
        let dctx = ec.dyn_ref()?;
        if dctx.item.is_none() && dctx.axis.is_none() {
            let root = tree.root();
            if test.matches(&tree, root, ec.sctx)? {
                return Ok(vec![XdmItem::Node(root)]);
            }
            return Ok(Vec::new());
        }
    }

    let members = children_or_self(ec)?;
    let mut out = Vec::new();
    for item in members {
        if let XdmItem::Node(id) = item
            && test.matches(&tree, id, ec.sctx)?
        {
            out.push(XdmItem::Node(id));
        }
    }
    Ok(out)
}

//
// Function argument helpers.
//

pub(crate) fn arg_item(
    token: &Token,
    ec: &mut EvalContext<'_>,
    index: usize,
    required: bool,
    default_to_context: bool,
) -> Result<Option<XdmItem>, Error> {
    if index >= token.arity() {
        if default_to_context {
            let dctx = ec.dyn_ctx()?;
            let item = dctx
                .item
                .clone()
                .or_else(|| dctx.tree.as_ref().map(|t| XdmItem::Node(t.root())));
            return Ok(item);
        }
        if required {
            return Err(token.wrong_nargs(format!("missing argument {}", index + 1)));
        }
        return Ok(None);
    }
    let seq = token.operands[index].evaluate(ec)?;
    match seq.len() {
        0 => {
            if required {
                Err(token.wrong_context_type(format!(
                    "a non-empty sequence is required for argument {}",
                    index + 1
                )))
            } else {
                Ok(None)
            }
        }
        1 => Ok(seq.into_iter().next()),
        _ => {
            if ec.sctx.compatibility_mode {
                Ok(seq.into_iter().next())
            } else {
                Err(token.wrong_context_type(
                    "a sequence of more than one item is not allowed as argument",
                ))
            }
        }
    }
}

/// Fetch a string-typed argument with the function conversion rules: in
/// compatibility mode anything converts through fn:string, otherwise only
/// string-like atomics are accepted.
pub(crate) fn arg_string(
    token: &Token,
    ec: &mut EvalContext<'_>,
    index: usize,
    default_to_context: bool,
) -> Result<Option<String>, Error> {
    let Some(item) = arg_item(token, ec, index, false, default_to_context)? else {
        return Ok(None);
    };
    let tree = ec.tree().ok();
    if ec.sctx.compatibility_mode {
        return Ok(Some(string_value_of(&item, tree.as_deref())?));
    }
    let value = evaluator::atomize_item(&item, tree.as_deref())?;
    match value {
        XdmAtomicValue::String(s)
        | XdmAtomicValue::AnyUri(s)
        | XdmAtomicValue::UntypedAtomic(s) => Ok(Some(s)),
        other => Err(token.wrong_context_type(format!(
            "argument {} must be a string, got xs:{}",
            index + 1,
            other.type_local_name()
        ))),
    }
}

pub(crate) fn arg_number(
    token: &Token,
    ec: &mut EvalContext<'_>,
    index: usize,
) -> Result<Option<f64>, Error> {
    let Some(item) = arg_item(token, ec, index, false, false)? else {
        return Ok(None);
    };
    let tree = ec.tree().ok();
    if ec.sctx.compatibility_mode {
        return Ok(Some(number_value_of(&item, tree.as_deref())?));
    }
    let value = evaluator::atomize_item(&item, tree.as_deref())?;
    match value {
        v if v.is_numeric() => Ok(v.as_double()),
        XdmAtomicValue::UntypedAtomic(s) => Ok(Some(
            crate::xdm::parse_double(&s).unwrap_or(f64::NAN),
        )),
        other => Err(token.wrong_context_type(format!(
            "argument {} must be numeric, got xs:{}",
            index + 1,
            other.type_local_name()
        ))),
    }
}

fn string_result(value: String) -> XdmSequence {
    vec![XdmAtomicValue::String(value).into()]
}

fn boolean_result(value: bool) -> XdmSequence {
    vec![XdmAtomicValue::Boolean(value).into()]
}

//
// Node set functions.
//

fn eval_fn_last(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let _ = token;
    let dctx = ec.dyn_ctx()?;
    Ok(vec![XdmAtomicValue::Integer(dctx.size as i64).into()])
}

fn eval_fn_position(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let _ = token;
    let dctx = ec.dyn_ctx()?;
    Ok(vec![XdmAtomicValue::Integer(dctx.position as i64).into()])
}

fn eval_fn_count(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    Ok(vec![XdmAtomicValue::Integer(seq.len() as i64).into()])
}

fn eval_fn_id(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let arg = token.operands[0].evaluate(ec)?;
    let mut ids: Vec<String> = Vec::new();
    for value in atomize(&arg, Some(&tree))? {
        ids.extend(value.string_value().split_whitespace().map(str::to_string));
    }

    let start = {
        let dctx = ec.dyn_ctx()?;
        match &dctx.item {
            Some(XdmItem::Node(id)) if tree.kind(*id) == NodeKind::Element => *id,
            _ => tree.root(),
        }
    };
    let mut out = Vec::new();
    for node in tree.iter_descendants(start, true) {
        if tree.kind(node) != NodeKind::Element {
            continue;
        }
        for &attr in tree.attributes(node) {
            let matches_xml_id = tree
                .name(attr)
                .map(|n| n.local == "id" && n.ns_uri.as_deref() == Some(XML_URI))
                .unwrap_or(false);
            if matches_xml_id
                && tree
                    .value(attr)
                    .map(|v| ids.iter().any(|i| i == v.trim()))
                    .unwrap_or(false)
            {
                out.push(XdmItem::Node(node));
                break;
            }
        }
    }
    Ok(out)
}

fn eval_fn_name(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let Some(item) = arg_item(token, ec, 0, false, true)? else {
        return Ok(string_result(String::new()));
    };
    let XdmItem::Node(id) = item else {
        return Err(token.wrong_context_type("the argument must be a node"));
    };
    let tree = ec.tree()?;
    let name = match tree.kind(id) {
        NodeKind::Element | NodeKind::Attribute | NodeKind::ProcessingInstruction => {
            tree.name(id).cloned()
        }
        NodeKind::Namespace => tree.name(id).cloned(),
        _ => None,
    };
    let Some(name) = name else {
        return Ok(string_result(String::new()));
    };
    let out = match token.symbol.as_str() {
        "local-name" => name.local,
        "namespace-uri" => name.ns_uri.unwrap_or_default(),
        _ => {
            // fn:name: prefixed form, recovering the prefix from the static
            // namespaces when the node carries none.
            match (&name.prefix, &name.ns_uri) {
                (Some(_), _) => name.lexical(),
                (None, Some(uri)) => match ec.sctx.prefix_for_namespace(uri) {
                    Some(prefix) => format!("{}:{}", prefix, name.local),
                    None => name.local,
                },
                (None, None) => name.local,
            }
        }
    };
    Ok(string_result(out))
}

//
// String functions.
//

fn eval_fn_string(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let item = arg_item(token, ec, 0, false, true)?;
    let tree = ec.tree().ok();
    let value = match item {
        None => String::new(),
        Some(item) => string_value_of(&item, tree.as_deref())?,
    };
    Ok(string_result(value))
}

fn eval_fn_concat(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let mut out = String::new();
    for index in 0..token.arity() {
        if let Some(item) = arg_item(token, ec, index, false, false)? {
            let tree = ec.tree().ok();
            out.push_str(&string_value_of(&item, tree.as_deref())?);
        }
    }
    Ok(string_result(out))
}

fn eval_fn_starts_with(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let arg1 = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let arg2 = arg_string(token, ec, 1, false)?.unwrap_or_default();
    Ok(boolean_result(arg1.starts_with(&arg2)))
}

fn eval_fn_contains(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let arg1 = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let arg2 = arg_string(token, ec, 1, false)?.unwrap_or_default();
    Ok(boolean_result(arg1.contains(&arg2)))
}

fn eval_fn_substring_before_after(
    token: &Token,
    ec: &mut EvalContext<'_>,
) -> Result<XdmSequence, Error> {
    let arg1 = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let arg2 = arg_string(token, ec, 1, false)?.unwrap_or_default();
    let out = match arg1.find(&arg2) {
        None => String::new(),
        Some(index) => {
            if token.symbol == "substring-before" {
                arg1[..index].to_string()
            } else {
                arg1[index + arg2.len()..].to_string()
            }
        }
    };
    Ok(string_result(out))
}

fn eval_fn_substring(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let item = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let chars: Vec<char> = item.chars().collect();
    let Some(start) = arg_number(token, ec, 1)? else {
        return Err(token.wrong_type("the second argument must be xs:numeric"));
    };
    if start.is_nan() || start.is_infinite() {
        return Ok(string_result(String::new()));
    }
    let start = start.round() as i64 - 1;

    if token.arity() == 2 {
        let from = start.max(0) as usize;
        let out: String = chars.iter().skip(from).collect();
        return Ok(string_result(out));
    }

    let Some(length) = arg_number(token, ec, 2)? else {
        return Err(token.wrong_type("the third argument must be xs:numeric"));
    };
    if length.is_nan() || length <= 0.0 {
        return Ok(string_result(String::new()));
    }
    let out: String = if length.is_infinite() {
        chars.iter().skip(start.max(0) as usize).collect()
    } else {
        let stop = (start + length.round() as i64).max(0) as usize;
        let from = start.max(0) as usize;
        chars
            .iter()
            .take(stop)
            .skip(from.min(chars.len()))
            .collect()
    };
    Ok(string_result(out))
}

fn eval_fn_string_length(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let value = arg_string(token, ec, 0, true)?.unwrap_or_default();
    Ok(vec![XdmAtomicValue::Integer(value.chars().count() as i64).into()])
}

fn eval_fn_normalize_space(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let value = arg_string(token, ec, 0, true)?.unwrap_or_default();
    let out = value.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(string_result(out))
}

fn eval_fn_translate(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let arg = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let map_string: Vec<char> = arg_string(token, ec, 1, false)?
        .unwrap_or_default()
        .chars()
        .collect();
    let trans_string: Vec<char> = arg_string(token, ec, 2, false)?
        .unwrap_or_default()
        .chars()
        .collect();
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        match map_string.iter().position(|&m| m == c) {
            None => out.push(c),
            Some(i) => {
                if let Some(&r) = trans_string.get(i) {
                    out.push(r);
                }
                // Characters beyond the replacement string are deleted.
            }
        }
    }
    Ok(string_result(out))
}

//
// Boolean functions.
//

fn eval_fn_boolean(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    Ok(boolean_result(effective_boolean_value(&seq)?))
}

fn eval_fn_not(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    Ok(boolean_result(!effective_boolean_value(&seq)?))
}

fn eval_fn_true(_token: &Token, _ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    Ok(boolean_result(true))
}

fn eval_fn_false(_token: &Token, _ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    Ok(boolean_result(false))
}

fn eval_fn_lang(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let requested = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let dctx = ec.dyn_ctx()?;
    let Some(XdmItem::Node(id)) = &dctx.item else {
        return Ok(boolean_result(false));
    };
    if tree.kind(*id) != NodeKind::Element {
        return Ok(boolean_result(false));
    }
    let mut lang: Option<String> = None;
    for node in tree.iter_ancestors(*id, true) {
        for &attr in tree.attributes(node) {
            let is_xml_lang = tree
                .name(attr)
                .map(|n| n.local == "lang" && n.ns_uri.as_deref() == Some(XML_URI))
                .unwrap_or(false);
            if is_xml_lang {
                lang = tree.value(attr).map(|v| v.trim().to_string());
                break;
            }
        }
        if lang.is_some() {
            break;
        }
    }
    let Some(lang) = lang else {
        return Ok(boolean_result(false));
    };
    let primary = lang.split('-').next().unwrap_or("");
    Ok(boolean_result(
        primary.eq_ignore_ascii_case(requested.trim()),
    ))
}

//
// Number functions.
//

fn eval_fn_number(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let item = arg_item(token, ec, 0, false, true)?;
    let tree = ec.tree().ok();
    let value = match item {
        None => f64::NAN,
        Some(item) => number_value_of(&item, tree.as_deref())?,
    };
    Ok(vec![XdmAtomicValue::Double(value).into()])
}

fn eval_fn_sum(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    use XdmAtomicValue as V;
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    let values = atomize(&seq, tree.as_deref())?;

    if values.is_empty() {
        if token.arity() == 2 {
            let zero = arg_item(token, ec, 1, false, false)?;
            return Ok(zero.into_iter().collect());
        }
        return Ok(vec![V::Integer(0).into()]);
    }

    if values.iter().all(|v| matches!(v, V::Integer(_))) {
        let mut total: i64 = 0;
        for v in &values {
            if let V::Integer(i) = v {
                total = total
                    .checked_add(*i)
                    .ok_or_else(|| Error::code_only(ErrorCode::FOAR0002))?;
            }
        }
        return Ok(vec![V::Integer(total).into()]);
    }
    if values.iter().all(|v| matches!(v, V::YearMonthDuration(_))) {
        let mut total: i32 = 0;
        for v in &values {
            if let V::YearMonthDuration(m) = v {
                total = total
                    .checked_add(*m)
                    .ok_or_else(|| Error::code_only(ErrorCode::FODT0002))?;
            }
        }
        return Ok(vec![V::YearMonthDuration(total).into()]);
    }
    if values.iter().all(|v| matches!(v, V::DayTimeDuration(_))) {
        let mut total: i64 = 0;
        for v in &values {
            if let V::DayTimeDuration(ms) = v {
                total = total
                    .checked_add(*ms)
                    .ok_or_else(|| Error::code_only(ErrorCode::FODT0002))?;
            }
        }
        return Ok(vec![V::DayTimeDuration(total).into()]);
    }

    let mut total = 0.0f64;
    let mut decimal_only = true;
    for v in &values {
        let d = match v {
            V::Integer(i) => *i as f64,
            V::Decimal(d) => *d,
            V::Double(d) => {
                decimal_only = false;
                *d
            }
            V::UntypedAtomic(s) => {
                decimal_only = false;
                match crate::xdm::parse_double(s) {
                    Some(d) => d,
                    None => {
                        if ec.sctx.compatibility_mode {
                            f64::NAN
                        } else {
                            return Err(token.error(
                                ErrorCode::FORG0001,
                                format!("cannot cast '{s}' to xs:double"),
                            ));
                        }
                    }
                }
            }
            other => {
                if ec.sctx.compatibility_mode {
                    decimal_only = false;
                    other.number_value()
                } else {
                    return Err(token.error(
                        ErrorCode::FORG0006,
                        format!("cannot sum xs:{} values", other.type_local_name()),
                    ));
                }
            }
        };
        total += d;
    }
    Ok(vec![if decimal_only {
        V::Decimal(total).into()
    } else {
        V::Double(total).into()
    }])
}

/// Numeric argument for floor/ceiling/round with the 1.0/2.0 split on the
/// empty sequence and on non-numeric operands.
fn rounding_argument(
    token: &Token,
    ec: &mut EvalContext<'_>,
) -> Result<Option<XdmAtomicValue>, Error> {
    use XdmAtomicValue as V;
    let Some(item) = arg_item(token, ec, 0, false, false)? else {
        if ec.sctx.version == crate::context::XPathVersion::V1 {
            return Ok(Some(V::Double(f64::NAN)));
        }
        return Ok(None);
    };
    let tree = ec.tree().ok();
    if item.is_node() || ec.sctx.compatibility_mode {
        return Ok(Some(V::Double(number_value_of(&item, tree.as_deref())?)));
    }
    let value = evaluator::atomize_item(&item, tree.as_deref())?;
    match value {
        v if v.is_numeric() => Ok(Some(v)),
        V::UntypedAtomic(s) => Ok(Some(V::Double(
            crate::xdm::parse_double(&s).unwrap_or(f64::NAN),
        ))),
        other => Err(token.wrong_context_type(format!(
            "a numeric value is required, got xs:{}",
            other.type_local_name()
        ))),
    }
}

fn eval_fn_floor_ceiling(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    use XdmAtomicValue as V;
    let Some(value) = rounding_argument(token, ec)? else {
        return Ok(Vec::new());
    };
    let floor = token.symbol == "floor";
    let out = match value {
        V::Integer(i) => V::Integer(i),
        V::Decimal(d) => V::Decimal(apply_rounding(d, floor)),
        V::Double(d) => V::Double(apply_rounding(d, floor)),
        _ => unreachable!("rounding_argument returns numerics only"),
    };
    Ok(vec![out.into()])
}

fn apply_rounding(d: f64, floor: bool) -> f64 {
    if d.is_nan() || d.is_infinite() {
        return d;
    }
    if floor {
        d.floor()
    } else {
        d.ceil()
    }
}

fn eval_fn_round(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    use XdmAtomicValue as V;
    let Some(value) = rounding_argument(token, ec)? else {
        return Ok(Vec::new());
    };
    let out = match value {
        V::Integer(i) => V::Integer(i),
        V::Decimal(d) => V::Decimal(round_half_up(d)),
        V::Double(d) => V::Double(round_half_up(d)),
        _ => unreachable!("rounding_argument returns numerics only"),
    };
    Ok(vec![out.into()])
}

/// XPath rounding: halves round toward positive infinity.
fn round_half_up(d: f64) -> f64 {
    if d.is_nan() || d.is_infinite() {
        return d;
    }
    (d + 0.5).floor()
}
