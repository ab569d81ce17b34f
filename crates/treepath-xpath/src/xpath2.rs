//! XPath 2.0 grammar: the 1.0 symbol table extended with sequence
//! operators, value/node comparisons, FLWOR and quantified expressions,
//! sequence-type operators, the 2.0 kind tests and constructor functions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;
use once_cell::sync::Lazy;

use crate::consts::XSD_URI;
use crate::context::{EvalContext, StaticContext};
use crate::errors::{Error, ErrorCode};
use crate::evaluator::{
    self, atomize, atomize_item, atomized_singleton, doc_order_distinct,
    effective_boolean_value, ComparisonOp, UntypedRule,
};
use crate::nodes::NodeKind;
use crate::schema::SchemaProxy;
use crate::sequence_types::{ItemType, Occurrence, SequenceType};
use crate::tdop::{CompiledXPath, Label, Parser, SymbolTable, Token, NODE_TEST_SYMBOLS};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};
use crate::xpath1::{
    self, arg_item, arg_string, eval_axis_step, eval_kind_test, resolve_name_token,
    token_to_node_test,
};

/// The shared XPath 2.0 grammar.
pub fn symbol_table() -> &'static SymbolTable {
    static TABLE: Lazy<SymbolTable> = Lazy::new(build_symbol_table);
    &TABLE
}

/// XPath 2.0 parser facade. This is the default parser of the selector
/// functions.
#[derive(Debug, Clone)]
pub struct XPath2Parser {
    sctx: StaticContext,
    variables: Vec<(String, String)>,
    build_constructors: bool,
}

impl Default for XPath2Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl XPath2Parser {
    pub fn new() -> Self {
        Self {
            sctx: StaticContext::xpath2(),
            variables: Vec::new(),
            build_constructors: false,
        }
    }

    /// Adopt a pre-built static context (see `StaticContextBuilder`).
    pub fn with_static_context(sctx: StaticContext) -> Self {
        Self {
            sctx,
            variables: Vec::new(),
            build_constructors: false,
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

    /// Default namespace applied to unprefixed element name tests.
    pub fn with_default_namespace(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        self.sctx.namespaces.insert(String::new(), uri.clone());
        self.sctx.default_namespace = Some(uri);
        self
    }

    pub fn with_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.sctx.function_namespace = Some(uri.into());
        self
    }

    /// Declare an in-scope variable with a sequence type string, e.g.
    /// `xs:integer?` or `element()*`. Parsed against the static namespaces
    /// at `parse` time.
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        sequence_type: impl Into<String>,
    ) -> Self {
        self.variables.push((name.into(), sequence_type.into()));
        self
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaProxy>) -> Self {
        schema.bind_parser(&mut self.sctx);
        self.sctx.schema = Some(schema);
        self
    }

    /// Also register constructor functions for the schema proxy's atomic
    /// types.
    pub fn with_build_constructors(mut self, enabled: bool) -> Self {
        self.build_constructors = enabled;
        self
    }

    pub fn with_compatibility_mode(mut self, enabled: bool) -> Self {
        self.sctx.compatibility_mode = enabled;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.sctx.strict = strict;
        self
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.sctx.base_uri = Some(uri.into());
        self
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.sctx
    }

    pub fn parse(&self, source: &str) -> Result<CompiledXPath, Error> {
        let mut sctx = self.sctx.clone();
        for (name, st) in &self.variables {
            let parsed = SequenceType::parse(st, &sctx)?;
            sctx.variable_types.insert(name.clone(), parsed);
        }
        if self.build_constructors && let Some(schema) = sctx.schema.clone() {
            let mut table = symbol_table().clone();
            for type_name in schema.iter_atomic_types() {
                let local = crate::xdm::ExpandedName::from_clark(&type_name).local;
                if !table.contains(&local) {
                    table.function(&local, 1, Some(1), Label::ConstructorFunction, 90);
                    table.set_eval(&local, eval_schema_constructor);
                }
            }
            return xpath1::parse_with(&sctx, &table, source);
        }
        xpath1::parse_with(&sctx, symbol_table(), source)
    }
}

/// Built-in atomic types registered as constructor functions. `string`,
/// `boolean` and `QName` stay function tokens and are dispatched as
/// constructors through the `xs:` prefix.
const CONSTRUCTOR_LOCALS: &[&str] = &[
    "integer",
    "decimal",
    "double",
    "float",
    "anyURI",
    "untypedAtomic",
    "dateTime",
    "date",
    "time",
    "duration",
    "dayTimeDuration",
    "yearMonthDuration",
];

fn build_symbol_table() -> SymbolTable {
    let mut t = xpath1::build_symbol_table();
    t.skip_comments = true;

    // Plain 2.0 symbols.
    for s in [
        "then", "else", "in", "return", "satisfies", "?", "of", "as", "(:", ":)",
    ] {
        t.symbol(s);
    }

    // Comma becomes the sequence constructor.
    t.infix(",", 5);
    t.set_eval(",", eval_comma);

    // Conditional and binding expressions.
    {
        let spec = t.register("if");
        spec.label = Label::Operator;
        spec.lbp = 20;
    }
    t.set_nud("if", nud_if);
    t.set_eval("if", eval_if);
    for s in ["for", "some", "every"] {
        let spec = t.register(s);
        spec.label = Label::Operator;
        spec.lbp = 20;
    }
    t.set_nud("for", nud_binding_expr);
    t.set_eval("for", eval_for);
    t.set_nud("some", nud_binding_expr);
    t.set_eval("some", eval_quantified);
    t.set_nud("every", nud_binding_expr);
    t.set_eval("every", eval_quantified);

    // Sequence set operators.
    t.alias("union", "|");
    t.infix("intersect", 65);
    t.set_eval("intersect", eval_intersect_except);
    t.infix("except", 65);
    t.set_eval("except", eval_intersect_except);

    // Value comparisons.
    for s in ["eq", "ne", "lt", "le", "gt", "ge"] {
        t.infix(s, 40);
        t.set_eval(s, eval_value_comparison);
    }

    // Node comparisons.
    for s in ["is", "<<", ">>"] {
        t.infix(s, 40);
        t.set_eval(s, eval_node_comparison);
    }

    // Range and integer division.
    t.infix("to", 45);
    t.set_eval("to", eval_range);
    t.infix("idiv", 55);
    t.set_eval("idiv", xpath1::eval_arithmetic);

    // Sequence type operators.
    for s in ["instance", "treat", "castable", "cast"] {
        let spec = t.register(s);
        spec.label = Label::Operator;
        spec.lbp = 70;
        spec.rbp = 70;
    }
    t.set_led("instance", led_sequence_type_op);
    t.set_eval("instance", eval_instance);
    t.set_led("treat", led_sequence_type_op);
    t.set_eval("treat", eval_treat);
    t.set_led("castable", led_single_type_op);
    t.set_eval("castable", eval_cast);
    t.set_led("cast", led_single_type_op);
    t.set_eval("cast", eval_cast);

    // 2.0 kind tests and sequence types.
    t.function("document-node", 0, Some(1), Label::KindTest, 90);
    t.set_nud("document-node", nud_document_node);
    t.set_eval("document-node", eval_kind_test);
    t.function("element", 0, Some(2), Label::KindTest, 90);
    t.set_nud("element", nud_element_kind_test);
    t.set_eval("element", eval_kind_test);
    t.function("schema-element", 1, Some(1), Label::KindTest, 90);
    t.set_eval("schema-element", eval_kind_test);
    t.function("schema-attribute", 1, Some(1), Label::KindTest, 90);
    t.set_eval("schema-attribute", eval_kind_test);
    t.function("empty-sequence", 0, Some(0), Label::SequenceType, 90);
    t.function("item", 0, Some(0), Label::SequenceType, 90);

    // `attribute` is both an axis and a kind test in 2.0.
    t.unregister("attribute");
    {
        let spec = t.register("attribute");
        spec.label = Label::KindTest;
        spec.lbp = 90;
        spec.rbp = 100;
        spec.nargs = Some((0, Some(2)));
        spec.pattern = Some(r"\battribute(?=\s*\:\:|\s*\()".to_string());
    }
    t.set_nud("attribute", nud_attribute_multirole);
    t.set_eval("attribute", eval_attribute_multirole);

    // Accessors.
    t.function("node-name", 1, Some(1), Label::Function, 90);
    t.set_eval("node-name", eval_fn_node_name);
    t.function("data", 1, Some(1), Label::Function, 90);
    t.set_eval("data", eval_fn_data);
    t.function("root", 0, Some(1), Label::Function, 90);
    t.set_eval("root", eval_fn_root);

    // General functions for sequences.
    t.function("empty", 1, Some(1), Label::Function, 90);
    t.set_eval("empty", eval_fn_empty_exists);
    t.function("exists", 1, Some(1), Label::Function, 90);
    t.set_eval("exists", eval_fn_empty_exists);
    t.function("distinct-values", 1, Some(1), Label::Function, 90);
    t.set_eval("distinct-values", eval_fn_distinct_values);
    t.function("reverse", 1, Some(1), Label::Function, 90);
    t.set_eval("reverse", eval_fn_reverse);
    t.function("subsequence", 2, Some(3), Label::Function, 90);
    t.set_eval("subsequence", eval_fn_subsequence);

    // Cardinality functions.
    t.function("zero-or-one", 1, Some(1), Label::Function, 90);
    t.set_eval("zero-or-one", eval_fn_cardinality);
    t.function("one-or-more", 1, Some(1), Label::Function, 90);
    t.set_eval("one-or-more", eval_fn_cardinality);
    t.function("exactly-one", 1, Some(1), Label::Function, 90);
    t.set_eval("exactly-one", eval_fn_cardinality);

    // String functions.
    t.function("upper-case", 1, Some(1), Label::Function, 90);
    t.set_eval("upper-case", eval_fn_case);
    t.function("lower-case", 1, Some(1), Label::Function, 90);
    t.set_eval("lower-case", eval_fn_case);
    t.function("ends-with", 2, Some(2), Label::Function, 90);
    t.set_eval("ends-with", eval_fn_ends_with);
    t.function("string-join", 2, Some(2), Label::Function, 90);
    t.set_eval("string-join", eval_fn_string_join);
    t.function("compare", 2, Some(2), Label::Function, 90);
    t.set_eval("compare", eval_fn_compare);

    // Number functions.
    t.function("abs", 1, Some(1), Label::Function, 90);
    t.set_eval("abs", eval_fn_abs);
    t.function("round-half-to-even", 1, Some(2), Label::Function, 90);
    t.set_eval("round-half-to-even", eval_fn_round_half_to_even);

    // Dynamic context functions.
    t.function("current-dateTime", 0, Some(0), Label::Function, 90);
    t.set_eval("current-dateTime", eval_fn_current_dt);
    t.function("current-date", 0, Some(0), Label::Function, 90);
    t.set_eval("current-date", eval_fn_current_dt);
    t.function("current-time", 0, Some(0), Label::Function, 90);
    t.set_eval("current-time", eval_fn_current_dt);
    t.function("implicit-timezone", 0, Some(0), Label::Function, 90);
    t.set_eval("implicit-timezone", eval_fn_implicit_timezone);

    // Constructor functions for the built-in atomic types.
    for local in CONSTRUCTOR_LOCALS {
        t.function(local, 1, Some(1), Label::ConstructorFunction, 90);
        t.set_eval(local, eval_constructor);
    }

    t
}

//
// Sequence and control expressions.
//

fn eval_comma(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let mut out = token.operands[0].evaluate(ec)?;
    out.extend(token.operands[1].evaluate(ec)?);
    Ok(out)
}

fn nud_if(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.advance_expected(&["("])?;
    token.operands.push(parser.expression(0)?);
    parser.advance_expected(&[")"])?;
    parser.advance_expected(&["then"])?;
    token.operands.push(parser.expression(5)?);
    parser.advance_expected(&["else"])?;
    token.operands.push(parser.expression(5)?);
    Ok(token)
}

fn eval_if(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let condition = token.operands[0].evaluate(ec)?;
    if effective_boolean_value(&condition)? {
        token.operands[1].evaluate(ec)
    } else {
        token.operands[2].evaluate(ec)
    }
}

/// `for`, `some` and `every` share the binding clause grammar.
fn nud_binding_expr(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    loop {
        if !parser.next_is("$") {
            return Err(token.wrong_syntax("a '$' variable binding expected"));
        }
        token.operands.push(parser.expression(5)?);
        parser.advance_expected(&["in"])?;
        token.operands.push(parser.expression(5)?);
        if parser.next_is(",") {
            parser.advance()?;
        } else {
            break;
        }
    }
    let clause = if token.symbol == "for" { "return" } else { "satisfies" };
    parser.advance_expected(&[clause])?;
    token.operands.push(parser.expression(5)?);
    Ok(token)
}

fn binding_name(var_token: &Token) -> String {
    var_token.operands[0]
        .value
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn eval_for(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    ec.dyn_ctx()?;
    let bindings = (token.arity() - 1) / 2;
    let mut out = Vec::new();
    ec.dyn_ctx()?.push_scope();
    let result = for_bind(token, ec, 0, bindings, &mut out);
    ec.dyn_ctx()?.pop_scope();
    result?;
    Ok(out)
}

fn for_bind(
    token: &Token,
    ec: &mut EvalContext<'_>,
    k: usize,
    bindings: usize,
    out: &mut XdmSequence,
) -> Result<(), Error> {
    if k == bindings {
        out.extend(token.operands[token.arity() - 1].evaluate(ec)?);
        return Ok(());
    }
    let name = binding_name(&token.operands[2 * k]);
    let seq = token.operands[2 * k + 1].evaluate(ec)?;
    for item in seq {
        ec.dyn_ctx()?.set_variable(name.clone(), vec![item]);
        for_bind(token, ec, k + 1, bindings, out)?;
    }
    Ok(())
}

fn eval_quantified(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    ec.dyn_ctx()?;
    let some = token.symbol == "some";
    let bindings = (token.arity() - 1) / 2;
    ec.dyn_ctx()?.push_scope();
    let result = quantifier_bind(token, ec, 0, bindings, some);
    ec.dyn_ctx()?.pop_scope();
    Ok(vec![XdmAtomicValue::Boolean(result?).into()])
}

fn quantifier_bind(
    token: &Token,
    ec: &mut EvalContext<'_>,
    k: usize,
    bindings: usize,
    some: bool,
) -> Result<bool, Error> {
    if k == bindings {
        let seq = token.operands[token.arity() - 1].evaluate(ec)?;
        return effective_boolean_value(&seq);
    }
    let name = binding_name(&token.operands[2 * k]);
    let seq = token.operands[2 * k + 1].evaluate(ec)?;
    for item in seq {
        ec.dyn_ctx()?.set_variable(name.clone(), vec![item]);
        let satisfied = quantifier_bind(token, ec, k + 1, bindings, some)?;
        if some && satisfied {
            return Ok(true);
        }
        if !some && !satisfied {
            return Ok(false);
        }
    }
    Ok(!some)
}

fn eval_intersect_except(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let left = token.operands[0].evaluate(ec)?;
    let right = token.operands[1].evaluate(ec)?;
    let right_ids: Vec<_> = right
        .iter()
        .map(|i| {
            i.as_node().ok_or_else(|| {
                token.wrong_context_type("intersect/except operands must be node sequences")
            })
        })
        .collect::<Result<_, _>>()?;
    let keep_if_present = token.symbol == "intersect";
    let mut out = Vec::new();
    for item in left {
        let id = item.as_node().ok_or_else(|| {
            token.wrong_context_type("intersect/except operands must be node sequences")
        })?;
        if right_ids.contains(&id) == keep_if_present {
            out.push(item);
        }
    }
    doc_order_distinct(out, &tree)
}

//
// Comparisons.
//

fn eval_value_comparison(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let op = ComparisonOp::from_value_symbol(&token.symbol)
        .expect("registered for value comparison symbols only");
    let left = token.operands[0].evaluate(ec)?;
    let right = token.operands[1].evaluate(ec)?;
    let tree = ec.tree().ok();
    let Some(a) = atomized_singleton(&left, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    let Some(b) = atomized_singleton(&right, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    if op.needs_ordering()
        && (matches!(a, XdmAtomicValue::QName { .. }) || matches!(b, XdmAtomicValue::QName { .. }))
    {
        return Err(token.wrong_context_type("xs:QName values have no order"));
    }
    let timezone = ec.dyn_ref().ok().and_then(|d| d.timezone);
    let ord = evaluator::compare_atomics(&a, &b, UntypedRule::AsString, timezone)?;
    Ok(vec![XdmAtomicValue::Boolean(op.apply(ord)).into()])
}

fn eval_node_comparison(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree()?;
    let left = token.operands[0].evaluate(ec)?;
    if left.is_empty() {
        return Ok(Vec::new());
    }
    let right = token.operands[1].evaluate(ec)?;
    if right.is_empty() {
        return Ok(Vec::new());
    }
    let single_node = |seq: &XdmSequence, side: &str| -> Result<crate::nodes::NodeId, Error> {
        if seq.len() != 1 {
            return Err(token.wrong_context_type(format!(
                "the {side} operand of '{}' must be a single node",
                token.symbol
            )));
        }
        seq[0].as_node().ok_or_else(|| {
            token.wrong_context_type(format!(
                "the {side} operand of '{}' must be a single node",
                token.symbol
            ))
        })
    };
    let a = single_node(&left, "left")?;
    let b = single_node(&right, "right")?;
    let value = match token.symbol.as_str() {
        "is" => a == b,
        "<<" => tree.compare_order(a, b) == std::cmp::Ordering::Less,
        _ => tree.compare_order(a, b) == std::cmp::Ordering::Greater,
    };
    Ok(vec![XdmAtomicValue::Boolean(value).into()])
}

fn eval_range(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let tree = ec.tree().ok();
    let left = token.operands[0].evaluate(ec)?;
    let right = token.operands[1].evaluate(ec)?;
    let Some(a) = atomized_singleton(&left, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    let Some(b) = atomized_singleton(&right, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    let as_integer = |v: &XdmAtomicValue| -> Result<i64, Error> {
        match v {
            XdmAtomicValue::Integer(i) => Ok(*i),
            XdmAtomicValue::UntypedAtomic(s) => s.trim().parse::<i64>().map_err(|_| {
                token.error(ErrorCode::FORG0001, format!("cannot cast '{s}' to xs:integer"))
            }),
            other => Err(token.wrong_context_type(format!(
                "xs:integer operands required for 'to', got xs:{}",
                other.type_local_name()
            ))),
        }
    };
    let start = as_integer(&a)?;
    let stop = as_integer(&b)?;
    Ok((start..=stop)
        .map(|i| XdmAtomicValue::Integer(i).into())
        .collect())
}

//
// Sequence type operators.
//

fn led_sequence_type_op(
    parser: &mut Parser<'_>,
    mut token: Token,
    left: Token,
) -> Result<Token, Error> {
    let keyword = if token.symbol == "instance" { "of" } else { "as" };
    parser.advance_expected(&[keyword])?;
    if !matches!(
        parser.next_label(),
        Label::KindTest | Label::SequenceType
    ) {
        parser.expected_name(&["(name)"], "a sequence type expected")?;
    }
    let right = parser.expression(token.rbp)?;
    let allow_occurrence = right.symbol != "empty-sequence";
    token.operands.push(left);
    token.operands.push(right);
    if allow_occurrence && matches!(parser.next_token.symbol.as_str(), "?" | "*" | "+") {
        let occurrence = parser.next_token.clone();
        parser.advance()?;
        token.operands.push(occurrence);
    }
    Ok(token)
}

fn led_single_type_op(
    parser: &mut Parser<'_>,
    mut token: Token,
    left: Token,
) -> Result<Token, Error> {
    parser.advance_expected(&["as"])?;
    parser.expected_name(&["(name)"], "an atomic type name expected")?;
    let right = parser.expression(token.rbp)?;
    token.operands.push(left);
    token.operands.push(right);
    if parser.next_is("?") {
        let occurrence = parser.next_token.clone();
        parser.advance()?;
        token.operands.push(occurrence);
    }
    Ok(token)
}

/// Build the structured sequence type of an `instance of`/`treat as` rhs.
fn sequence_type_of(token: &Token, sctx: &StaticContext) -> Result<SequenceType, Error> {
    let ty = &token.operands[1];
    if ty.symbol == "empty-sequence" {
        return Ok(SequenceType::Empty);
    }
    let occurrence = match token.operands.get(2).map(|t| t.symbol.as_str()) {
        Some("?") => Occurrence::ZeroOrOne,
        Some("*") => Occurrence::ZeroOrMore,
        Some("+") => Occurrence::OneOrMore,
        _ => Occurrence::One,
    };
    let item = if ty.symbol == "item" {
        ItemType::AnyItem
    } else if ty.label == Label::KindTest {
        ItemType::Kind(token_to_node_test(ty, sctx)?)
    } else {
        ItemType::Atomic(resolve_name_token(ty, sctx, false)?)
    };
    Ok(SequenceType::Typed { item, occurrence })
}

fn eval_instance(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let st = sequence_type_of(token, ec.sctx)?;
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    let matched = st.matches(&seq, tree.as_deref(), ec.sctx)?;
    Ok(vec![XdmAtomicValue::Boolean(matched).into()])
}

fn eval_treat(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let st = sequence_type_of(token, ec.sctx)?;
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    if !st.matches(&seq, tree.as_deref(), ec.sctx)? {
        return Err(token.wrong_sequence_type(format!(
            "the sequence does not match type {}",
            st.source()
        )));
    }
    Ok(seq)
}

fn eval_cast(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let castable = token.symbol == "castable";
    let optional = token.arity() == 3;
    let target = resolve_name_token(&token.operands[1], ec.sctx, false)?;

    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    if seq.len() > 1 {
        if castable {
            return Ok(vec![XdmAtomicValue::Boolean(false).into()]);
        }
        return Err(token.wrong_context_type("more than one value in a cast expression"));
    }
    if seq.is_empty() {
        if optional {
            return Ok(if castable {
                vec![XdmAtomicValue::Boolean(true).into()]
            } else {
                Vec::new()
            });
        }
        if castable {
            return Ok(vec![XdmAtomicValue::Boolean(false).into()]);
        }
        return Err(token.wrong_context_type("an atomic value is required for cast"));
    }

    let value = atomize_item(&seq[0], tree.as_deref())?;
    let timezone = ec.dyn_ref().ok().and_then(|d| d.timezone);
    match evaluator::cast_atomic(&value, &target, ec.sctx, timezone) {
        Ok(v) => Ok(if castable {
            vec![XdmAtomicValue::Boolean(true).into()]
        } else {
            vec![v.into()]
        }),
        Err(e)
            if castable
                && !matches!(
                    e.code,
                    ErrorCode::XPST0051 | ErrorCode::XPST0080 | ErrorCode::XPST0081
                ) =>
        {
            Ok(vec![XdmAtomicValue::Boolean(false).into()])
        }
        Err(e) => Err(e.or_position(token.position)),
    }
}

//
// 2.0 kind tests.
//

fn nud_document_node(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.advance_expected(&["("])?;
    if !parser.next_is(")") {
        if !parser.next_is("element") && !parser.next_is("schema-element") {
            return Err(token.error(
                ErrorCode::XPST0081,
                "an element() or schema-element() test expected",
            ));
        }
        token.operands.push(parser.expression(5)?);
    }
    parser.advance_expected(&[")"])?;
    Ok(token)
}

fn nud_element_kind_test(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.advance_expected(&["("])?;
    if !parser.next_is(")") {
        parser.expected_name(&["(name)", "*"], "a QName or a wildcard expected")?;
        token.operands.push(parser.expression(5)?);
        if parser.next_is(",") {
            parser.advance()?;
            parser.expected_name(&["(name)"], "a QName expected")?;
            token.operands.push(parser.expression(5)?);
        }
    }
    parser.advance_expected(&[")"])?;
    Ok(token)
}

fn nud_attribute_multirole(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    if parser.next_is("::") {
        parser.advance()?;
        parser.expected_name(NODE_TEST_SYMBOLS, "invalid node test after axis")?;
        token.operands.push(parser.expression(token.rbp)?);
        token.label = Label::Axis;
    } else {
        parser.advance_expected(&["("])?;
        if !parser.next_is(")") {
            parser.expected_name(&["(name)", "*"], "a QName or a wildcard expected")?;
            token.operands.push(parser.expression(5)?);
            if parser.next_is(",") {
                parser.advance()?;
                parser.expected_name(&["(name)"], "a QName expected")?;
                token.operands.push(parser.expression(5)?);
            }
        }
        parser.advance_expected(&[")"])?;
        token.label = Label::KindTest;
    }
    Ok(token)
}

fn eval_attribute_multirole(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    if token.label == Label::Axis {
        return eval_axis_step(token, ec);
    }
    // As a kind test: filter the attribute collection of the context item,
    // or the current item when an axis already positioned the focus.
    let tree = ec.tree()?;
    let test = token_to_node_test(token, ec.sctx)?;
    let members: Vec<XdmItem> = {
        let dctx = ec.dyn_ctx()?;
        if dctx.axis.is_some() {
            dctx.item.iter().cloned().collect()
        } else {
            match &dctx.item {
                Some(XdmItem::Node(id)) => tree
                    .attributes(*id)
                    .iter()
                    .map(|a| XdmItem::Node(*a))
                    .collect(),
                _ => Vec::new(),
            }
        }
    };
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
// Constructor functions.
//

fn constructor_argument(
    token: &Token,
    ec: &mut EvalContext<'_>,
) -> Result<Option<XdmAtomicValue>, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    atomized_singleton(&seq, tree.as_deref())
}

fn eval_constructor(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let Some(value) = constructor_argument(token, ec)? else {
        return Ok(Vec::new());
    };
    let target = crate::xdm::ExpandedName::new(Some(XSD_URI.to_string()), token.symbol.clone());
    let timezone = ec.dyn_ref().ok().and_then(|d| d.timezone);
    Ok(vec![
        evaluator::cast_atomic(&value, &target, ec.sctx, timezone)?.into(),
    ])
}

/// Constructor dispatch for `xs:type(...)`: used by the QName composition
/// when the prefix resolves to the XSD namespace, so that `xs:string(...)`
/// casts even though `string` is registered as fn:string.
pub(crate) fn eval_constructor_for(
    colon_token: &Token,
    callable: &Token,
    ec: &mut EvalContext<'_>,
) -> Result<XdmSequence, Error> {
    let Some(arg) = callable.operands.first() else {
        return Err(colon_token.wrong_nargs("a constructor function requires one argument"));
    };
    let seq = arg.evaluate(ec)?;
    let tree = ec.tree().ok();
    let Some(value) = atomized_singleton(&seq, tree.as_deref())? else {
        return Ok(Vec::new());
    };
    let target =
        crate::xdm::ExpandedName::new(Some(XSD_URI.to_string()), callable.symbol.clone());
    let timezone = ec.dyn_ref().ok().and_then(|d| d.timezone);
    Ok(vec![
        evaluator::cast_atomic(&value, &target, ec.sctx, timezone)?.into(),
    ])
}

/// Constructors seeded from a schema proxy cast through the proxy.
fn eval_schema_constructor(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let Some(value) = constructor_argument(token, ec)? else {
        return Ok(Vec::new());
    };
    let schema = ec
        .sctx
        .schema
        .as_ref()
        .ok_or_else(|| token.error(ErrorCode::XPST0051, "no schema bound to the parser"))?;
    let type_name = schema
        .iter_atomic_types()
        .into_iter()
        .find(|t| crate::xdm::ExpandedName::from_clark(t).local == token.symbol)
        .ok_or_else(|| {
            token.error(
                ErrorCode::XPST0051,
                format!("unknown schema type '{}'", token.symbol),
            )
        })?;
    Ok(vec![schema.cast_as(&value, &type_name)?.into()])
}

//
// Accessors and sequence functions.
//

fn eval_fn_node_name(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let Some(item) = arg_item(token, ec, 0, false, false)? else {
        return Ok(Vec::new());
    };
    let XdmItem::Node(id) = item else {
        return Err(token.wrong_context_type("the argument of node-name() must be a node"));
    };
    let tree = ec.tree()?;
    match tree.kind(id) {
        NodeKind::Element | NodeKind::Attribute => match tree.name(id) {
            Some(name) => Ok(vec![XdmAtomicValue::QName {
                prefix: name.prefix.clone(),
                ns_uri: name.ns_uri.clone(),
                local: name.local.clone(),
            }
            .into()]),
            None => Ok(Vec::new()),
        },
        NodeKind::ProcessingInstruction => match tree.name(id) {
            Some(name) => Ok(vec![XdmAtomicValue::QName {
                prefix: None,
                ns_uri: None,
                local: name.local.clone(),
            }
            .into()]),
            None => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

fn eval_fn_data(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    Ok(atomize(&seq, tree.as_deref())?
        .into_iter()
        .map(XdmItem::Atomic)
        .collect())
}

fn eval_fn_root(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let Some(item) = arg_item(token, ec, 0, false, true)? else {
        return Ok(Vec::new());
    };
    let XdmItem::Node(_) = item else {
        return Err(token.wrong_context_type("the argument of root() must be a node"));
    };
    let tree = ec.tree()?;
    Ok(vec![XdmItem::Node(tree.root())])
}

fn eval_fn_empty_exists(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    let value = if token.symbol == "empty" {
        seq.is_empty()
    } else {
        !seq.is_empty()
    };
    Ok(vec![XdmAtomicValue::Boolean(value).into()])
}

/// Equality used by fn:distinct-values: NaN equals itself, untyped compares
/// as string, numerics compare cross-type.
fn distinct_eq(a: &XdmAtomicValue, b: &XdmAtomicValue) -> bool {
    use XdmAtomicValue as V;
    if a.is_numeric() && b.is_numeric() {
        let (x, y) = (a.as_double().unwrap(), b.as_double().unwrap());
        return x == y || (x.is_nan() && y.is_nan());
    }
    match (a, b) {
        (
            V::String(x) | V::UntypedAtomic(x) | V::AnyUri(x),
            V::String(y) | V::UntypedAtomic(y) | V::AnyUri(y),
        ) => x == y,
        _ => evaluator::compare_atomics(a, b, UntypedRule::AsString, None)
            .map(|ord| ord == Some(std::cmp::Ordering::Equal))
            .unwrap_or(false),
    }
}

fn eval_fn_distinct_values(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    let values = atomize(&seq, tree.as_deref())?;
    let mut kept: Vec<XdmAtomicValue> = Vec::new();
    for value in values {
        if !kept.iter().any(|k| distinct_eq(k, &value)) {
            kept.push(value);
        }
    }
    Ok(kept.into_iter().map(XdmItem::Atomic).collect())
}

fn eval_fn_reverse(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let mut seq = token.operands[0].evaluate(ec)?;
    seq.reverse();
    Ok(seq)
}

fn eval_fn_subsequence(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    let Some(start) = xpath1::arg_number(token, ec, 1)? else {
        return Ok(Vec::new());
    };
    let start = start.round();
    let end = if token.arity() == 3 {
        match xpath1::arg_number(token, ec, 2)? {
            Some(len) => start + len.round(),
            None => return Ok(Vec::new()),
        }
    } else {
        f64::INFINITY
    };
    let mut out = Vec::new();
    for (i, item) in seq.into_iter().enumerate() {
        let pos = (i + 1) as f64;
        if pos >= start && pos < end {
            out.push(item);
        }
    }
    Ok(out)
}

fn eval_fn_cardinality(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    match token.symbol.as_str() {
        "zero-or-one" => {
            if seq.len() > 1 {
                return Err(token.error(
                    ErrorCode::FORG0003,
                    "zero-or-one called with a sequence of more than one item",
                ));
            }
        }
        "one-or-more" => {
            if seq.is_empty() {
                return Err(token.error(
                    ErrorCode::FORG0004,
                    "one-or-more called with an empty sequence",
                ));
            }
        }
        _ => {
            if seq.len() != 1 {
                return Err(token.error(
                    ErrorCode::FORG0005,
                    "exactly-one called with zero or more than one item",
                ));
            }
        }
    }
    Ok(seq)
}

//
// String and number functions.
//

fn eval_fn_case(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let value = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let out = if token.symbol == "upper-case" {
        value.to_uppercase()
    } else {
        value.to_lowercase()
    };
    Ok(vec![XdmAtomicValue::String(out).into()])
}

fn eval_fn_ends_with(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let arg1 = arg_string(token, ec, 0, false)?.unwrap_or_default();
    let arg2 = arg_string(token, ec, 1, false)?.unwrap_or_default();
    Ok(vec![XdmAtomicValue::Boolean(arg1.ends_with(&arg2)).into()])
}

fn eval_fn_string_join(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let seq = token.operands[0].evaluate(ec)?;
    let tree = ec.tree().ok();
    let mut parts = Vec::with_capacity(seq.len());
    for value in atomize(&seq, tree.as_deref())? {
        match value {
            XdmAtomicValue::String(s)
            | XdmAtomicValue::AnyUri(s)
            | XdmAtomicValue::UntypedAtomic(s) => parts.push(s),
            other => {
                return Err(token.wrong_context_type(format!(
                    "string-join() requires strings, got xs:{}",
                    other.type_local_name()
                )));
            }
        }
    }
    let separator = arg_string(token, ec, 1, false)?.unwrap_or_default();
    Ok(vec![XdmAtomicValue::String(parts.join(&separator)).into()])
}

fn eval_fn_compare(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let Some(arg1) = arg_string(token, ec, 0, false)? else {
        return Ok(Vec::new());
    };
    let Some(arg2) = arg_string(token, ec, 1, false)? else {
        return Ok(Vec::new());
    };
    let value = match arg1.cmp(&arg2) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    Ok(vec![XdmAtomicValue::Integer(value).into()])
}

fn eval_fn_abs(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    use XdmAtomicValue as V;
    let Some(item) = arg_item(token, ec, 0, false, false)? else {
        return Ok(Vec::new());
    };
    let tree = ec.tree().ok();
    let value = atomize_item(&item, tree.as_deref())?;
    let out = match value {
        V::Integer(i) => V::Integer(i.abs()),
        V::Decimal(d) => V::Decimal(d.abs()),
        V::Double(d) => V::Double(d.abs()),
        V::UntypedAtomic(s) => V::Double(
            crate::xdm::parse_double(&s)
                .ok_or_else(|| {
                    token.error(ErrorCode::FORG0001, format!("cannot cast '{s}' to xs:double"))
                })?
                .abs(),
        ),
        other => {
            return Err(token.wrong_context_type(format!(
                "a numeric value is required, got xs:{}",
                other.type_local_name()
            )));
        }
    };
    Ok(vec![out.into()])
}

fn eval_fn_round_half_to_even(
    token: &Token,
    ec: &mut EvalContext<'_>,
) -> Result<XdmSequence, Error> {
    use XdmAtomicValue as V;
    let Some(item) = arg_item(token, ec, 0, false, false)? else {
        return Ok(Vec::new());
    };
    let tree = ec.tree().ok();
    let precision = if token.arity() == 2 {
        xpath1::arg_number(token, ec, 1)?.unwrap_or(0.0) as i32
    } else {
        0
    };
    let scale = 10f64.powi(precision);
    let round = |d: f64| -> f64 {
        if d.is_nan() || d.is_infinite() {
            d
        } else {
            (d * scale).round_ties_even() / scale
        }
    };
    let value = atomize_item(&item, tree.as_deref())?;
    let out = match value {
        V::Integer(i) => {
            if precision >= 0 {
                V::Integer(i)
            } else {
                V::Integer(round(i as f64) as i64)
            }
        }
        V::Decimal(d) => V::Decimal(round(d)),
        V::Double(d) => V::Double(round(d)),
        other => {
            return Err(token.wrong_context_type(format!(
                "a numeric value is required, got xs:{}",
                other.type_local_name()
            )));
        }
    };
    Ok(vec![out.into()])
}

//
// Dynamic context functions.
//

fn eval_fn_current_dt(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let dctx = ec.dyn_ctx()?;
    let now = dctx.current_dt;
    let value = match token.symbol.as_str() {
        "current-date" => XdmAtomicValue::Date {
            date: now.date_naive(),
            tz: Some(now.timezone()),
        },
        "current-time" => XdmAtomicValue::Time {
            time: now.time(),
            tz: Some(now.timezone()),
        },
        _ => XdmAtomicValue::DateTime(now),
    };
    Ok(vec![value.into()])
}

fn eval_fn_implicit_timezone(token: &Token, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    let _ = token;
    let dctx = ec.dyn_ctx()?;
    let tz: FixedOffset = dctx.timezone.unwrap_or_else(|| *dctx.current_dt.offset());
    let millis = tz.local_minus_utc() as i64 * 1000;
    Ok(vec![XdmAtomicValue::DayTimeDuration(millis).into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_extends_xpath1() {
        let t = symbol_table();
        assert!(t.contains("for"));
        assert!(t.contains("intersect"));
        assert!(t.contains("count"));
        assert!(t.skip_comments);
        // The 1.0 table is untouched by the extension.
        assert!(!xpath1::symbol_table().contains("for"));
        assert!(!xpath1::symbol_table().skip_comments);
    }
}
