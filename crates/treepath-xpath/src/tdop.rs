//! Pratt (top down operator precedence) parser framework.
//!
//! A grammar is a `SymbolTable`: one `TokenSpec` per symbol carrying the
//! binding powers, the `nud`/`led` parse routines and the `evaluate`
//! routine. The token is both lexical symbol and AST node, so parsing and
//! evaluation share one tree. The tokenizer is composed from the registered
//! symbol patterns and compiled lazily on first parse.
//!
//! References: Pratt's "Top Down Operator Precedence" (1973) and the
//! derived effbot/Crockford formulations.

use std::collections::HashMap;
use std::sync::Arc;

use fancy_regex::Regex;
use once_cell::sync::OnceCell;

use crate::context::{DynamicContext, EvalContext, StaticContext};
use crate::errors::{Error, ErrorCode, Position};
use crate::xdm::XdmSequence;

/// Category of a registered symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Symbol,
    Literal,
    Operator,
    Axis,
    Function,
    ConstructorFunction,
    KindTest,
    SequenceType,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Symbol => "symbol",
            Label::Literal => "literal",
            Label::Operator => "operator",
            Label::Axis => "axis",
            Label::Function => "function",
            Label::ConstructorFunction => "constructor function",
            Label::KindTest => "kind test",
            Label::SequenceType => "sequence type",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Label::Function | Label::ConstructorFunction | Label::KindTest | Label::SequenceType
        )
    }
}

pub type NudFn = fn(&mut Parser<'_>, Token) -> Result<Token, Error>;
pub type LedFn = fn(&mut Parser<'_>, Token, Token) -> Result<Token, Error>;
pub type EvalFn = fn(&Token, &mut EvalContext<'_>) -> Result<XdmSequence, Error>;

/// Registered behavior of one symbol.
#[derive(Clone)]
pub struct TokenSpec {
    pub symbol: String,
    pub label: Label,
    pub lbp: u32,
    pub rbp: u32,
    /// Custom tokenizer pattern; derived from the symbol when absent.
    pub pattern: Option<String>,
    /// (min, max) argument count for callables; `None` max is variadic.
    pub nargs: Option<(usize, Option<usize>)>,
    pub nud: Option<NudFn>,
    pub led: Option<LedFn>,
    pub eval: Option<EvalFn>,
}

impl TokenSpec {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            label: Label::Symbol,
            lbp: 0,
            rbp: 0,
            pattern: None,
            nargs: None,
            nud: None,
            led: None,
            eval: None,
        }
    }
}

/// Literal payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Str(String),
    Integer(i64),
    Decimal(f64),
    Double(f64),
}

impl TokenValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn literal_source(&self) -> String {
        match self {
            TokenValue::None => String::new(),
            TokenValue::Str(s) => s.clone(),
            TokenValue::Integer(i) => i.to_string(),
            TokenValue::Decimal(d) => crate::xdm::format_decimal(*d),
            TokenValue::Double(d) => crate::xdm::format_double(*d),
        }
    }
}

/// A token: lexical symbol and AST node at once. Operand tokens are the
/// AST edges; the subtree is immutable once parsing returns.
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: String,
    pub label: Label,
    pub lbp: u32,
    pub rbp: u32,
    pub value: TokenValue,
    pub operands: Vec<Token>,
    pub position: Position,
    eval: Option<EvalFn>,
}

impl PartialEq for Token {
    /// Structural equality; positions are ignored so that a canonical
    /// re-parse compares equal.
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.label == other.label
            && self.value == other.value
            && self.operands == other.operands
    }
}

impl Token {
    pub fn arity(&self) -> usize {
        self.operands.len()
    }

    pub fn evaluate(&self, ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
        match self.eval {
            Some(f) => f(self, ec).map_err(|e| e.or_position(self.position)),
            None => Ok(Vec::new()),
        }
    }

    /// Mapped error raiser with this token's position attached.
    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> Error {
        Error::from_code(code, message).with_position(self.position)
    }

    pub fn wrong_syntax(&self, message: impl Into<String>) -> Error {
        let code = if self.label == Label::Function {
            ErrorCode::XPST0017
        } else {
            ErrorCode::XPST0003
        };
        self.error(code, message)
    }

    pub fn wrong_value(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::FOCA0002, message)
    }

    pub fn wrong_type(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::FORG0006, message)
    }

    pub fn missing_context(&self) -> Error {
        self.error(ErrorCode::XPDY0002, ErrorCode::XPDY0002.default_message())
    }

    pub fn wrong_context_type(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::XPTY0004, message)
    }

    pub fn missing_name(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::XPST0008, message)
    }

    pub fn wrong_nargs(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::XPST0017, message)
    }

    pub fn wrong_sequence_type(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::XPDY0050, message)
    }

    pub fn unknown_atomic_type(&self, message: impl Into<String>) -> Error {
        self.error(ErrorCode::XPST0051, message)
    }

    /// Canonicalized source form. Re-parsing it yields an equal AST.
    pub fn source(&self) -> String {
        match self.symbol.as_str() {
            "(name)" => self.value.literal_source(),
            "(string)" => format!("'{}'", self.value.literal_source().replace('\'', "''")),
            "(integer)" | "(decimal)" | "(double)" => self.value.literal_source(),
            ":" => format!("{}:{}", self.operands[0].source(), self.operands[1].source()),
            "(" => {
                if self.operands.is_empty() {
                    "()".to_string()
                } else {
                    format!("({})", self.operands[0].source())
                }
            }
            "[" => format!(
                "{}[{}]",
                self.operands[0].source(),
                self.operands[1].source()
            ),
            "," => format!(
                "{}, {}",
                self.operands[0].source(),
                self.operands[1].source()
            ),
            "$" => format!("${}", self.operands[0].source()),
            "@" => format!("@{}", self.operands[0].source()),
            "{" => format!(
                "{{{}}}{}",
                self.operands[0].value.literal_source(),
                self.operands[1].source()
            ),
            "/" | "//" => {
                if self.operands.is_empty() {
                    self.symbol.clone()
                } else if self.operands.len() == 1 {
                    format!("{}{}", self.symbol, self.operands[0].source())
                } else {
                    format!(
                        "{}{}{}",
                        self.operands[0].source(),
                        self.symbol,
                        self.operands[1].source()
                    )
                }
            }
            "if" => format!(
                "if ({}) then {} else {}",
                self.operands[0].source(),
                self.operands[1].source(),
                self.operands[2].source()
            ),
            "for" | "some" | "every" => {
                let clause = if self.symbol == "for" { "return" } else { "satisfies" };
                let bindings: Vec<String> = self.operands[..self.operands.len() - 1]
                    .chunks(2)
                    .map(|pair| format!("{} in {}", pair[0].source(), pair[1].source()))
                    .collect();
                format!(
                    "{} {} {} {}",
                    self.symbol,
                    bindings.join(", "),
                    clause,
                    self.operands[self.operands.len() - 1].source()
                )
            }
            "instance" | "treat" | "castable" | "cast" => {
                let keyword = if self.symbol == "instance" { "of" } else { "as" };
                let occurrence = self
                    .operands
                    .get(2)
                    .map(|t| t.symbol.clone())
                    .unwrap_or_default();
                format!(
                    "{} {} {} {}{}",
                    self.operands[0].source(),
                    self.symbol,
                    keyword,
                    self.operands[1].source(),
                    occurrence
                )
            }
            _ => match self.label {
                Label::Axis => format!("{}::{}", self.symbol, self.operands[0].source()),
                Label::Function
                | Label::ConstructorFunction
                | Label::KindTest
                | Label::SequenceType => {
                    let args: Vec<String> = self.operands.iter().map(|t| t.source()).collect();
                    format!("{}({})", self.symbol, args.join(", "))
                }
                _ => match self.operands.len() {
                    0 => self.symbol.clone(),
                    1 => format!("{} {}", self.symbol, self.operands[0].source()),
                    2 => format!(
                        "{} {} {}",
                        self.operands[0].source(),
                        self.symbol,
                        self.operands[1].source()
                    ),
                    _ => {
                        let parts: Vec<String> = self.operands.iter().map(|t| t.source()).collect();
                        format!("{} {}", self.symbol, parts.join(" "))
                    }
                },
            },
        }
    }

    /// Infix iteration of the token tree.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Token> + '_> {
        let first = self.operands.first().into_iter().flat_map(|t| t.iter());
        let rest = self.operands.iter().skip(1).flat_map(|t| t.iter());
        Box::new(first.chain(std::iter::once(self)).chain(rest))
    }
}

/// `true` for registry-internal symbols like `(name)` or `(end)`.
fn is_special_symbol(symbol: &str) -> bool {
    symbol.len() > 2
        && symbol.starts_with('(')
        && symbol.ends_with(')')
        && symbol[1..symbol.len() - 1]
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
}

fn regex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_name_like(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

const NAME_PATTERN: &str = r"[^\d\W][\w.\-\u{B7}\u{0300}-\u{036F}\u{203F}-\u{2040}]*";

/// A grammar: the symbol registry plus the tokenizer composed from it.
#[derive(Clone, Default)]
pub struct SymbolTable {
    specs: HashMap<String, TokenSpec>,
    /// XPath 2.0 `(: ... :)` comments are skipped when set.
    pub skip_comments: bool,
    tokenizer: OnceCell<Regex>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenSpec> {
        self.specs.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.specs.contains_key(symbol)
    }

    /// Create or update a registration; returns the spec for refinement.
    pub fn register(&mut self, symbol: &str) -> &mut TokenSpec {
        self.tokenizer = OnceCell::new();
        self.specs
            .entry(symbol.to_string())
            .or_insert_with(|| TokenSpec::new(symbol))
    }

    pub fn unregister(&mut self, symbol: &str) {
        self.tokenizer = OnceCell::new();
        self.specs.remove(symbol);
    }

    /// Register `symbol` with the binding powers and behavior of `other`.
    pub fn alias(&mut self, symbol: &str, other: &str) {
        let source = self
            .specs
            .get(other)
            .unwrap_or_else(|| panic!("alias of unregistered symbol {other}"))
            .clone();
        let spec = self.register(symbol);
        spec.label = source.label;
        spec.lbp = source.lbp;
        spec.rbp = source.rbp;
        spec.nargs = source.nargs;
        spec.nud = source.nud;
        spec.led = source.led;
        spec.eval = source.eval;
    }

    pub fn symbol(&mut self, symbol: &str) {
        self.register(symbol);
    }

    pub fn literal(&mut self, symbol: &str) {
        let spec = self.register(symbol);
        spec.label = Label::Literal;
        spec.nud = Some(nud_literal);
        spec.eval = Some(eval_literal);
    }

    pub fn nullary(&mut self, symbol: &str) {
        let spec = self.register(symbol);
        spec.label = Label::Operator;
        spec.nud = Some(nud_literal);
    }

    pub fn prefix(&mut self, symbol: &str, bp: u32) {
        let spec = self.register(symbol);
        spec.label = Label::Operator;
        if spec.rbp < bp {
            spec.rbp = bp;
        }
        spec.nud = Some(nud_prefix);
    }

    pub fn infix(&mut self, symbol: &str, bp: u32) {
        let spec = self.register(symbol);
        spec.label = Label::Operator;
        if spec.lbp < bp {
            spec.lbp = bp;
        }
        if spec.rbp < bp {
            spec.rbp = bp;
        }
        spec.led = Some(led_infix);
    }

    pub fn infixr(&mut self, symbol: &str, bp: u32) {
        let spec = self.register(symbol);
        spec.label = Label::Operator;
        if spec.lbp < bp {
            spec.lbp = bp;
        }
        spec.rbp = bp - 1;
        spec.led = Some(led_infixr);
    }

    pub fn postfix(&mut self, symbol: &str, bp: u32) {
        let spec = self.register(symbol);
        spec.label = Label::Operator;
        if spec.lbp < bp {
            spec.lbp = bp;
        }
        spec.led = Some(led_postfix);
    }

    /// Register an axis symbol: the pattern only matches when `::` follows.
    pub fn axis(&mut self, symbol: &str, bp: u32) {
        let pattern = format!(r"\b{}(?=\s*\:\:)", regex_escape(symbol));
        let spec = self.register(symbol);
        spec.label = Label::Axis;
        spec.lbp = bp;
        spec.rbp = bp;
        spec.pattern = Some(pattern);
        spec.nud = Some(nud_axis);
    }

    /// Register a callable symbol: the pattern only matches when `(`
    /// follows.
    pub fn function(&mut self, symbol: &str, min: usize, max: Option<usize>, label: Label, bp: u32) {
        let pattern = format!(r"\b{}(?=\s*\()", regex_escape(symbol));
        let spec = self.register(symbol);
        spec.label = label;
        spec.lbp = bp;
        spec.rbp = bp;
        spec.nargs = Some((min, max));
        spec.pattern = Some(pattern);
        spec.nud = Some(nud_function);
    }

    pub fn set_nud(&mut self, symbol: &str, f: NudFn) {
        self.register(symbol).nud = Some(f);
    }

    pub fn set_led(&mut self, symbol: &str, f: LedFn) {
        self.register(symbol).led = Some(f);
    }

    pub fn set_eval(&mut self, symbol: &str, f: EvalFn) {
        self.register(symbol).eval = Some(f);
    }

    pub fn set_label(&mut self, symbol: &str, label: Label) {
        self.register(symbol).label = label;
    }

    pub fn set_bp(&mut self, symbol: &str, lbp: u32, rbp: u32) {
        let spec = self.register(symbol);
        spec.lbp = lbp;
        spec.rbp = rbp;
    }

    /// Compose the tokenizer from the registered symbols: literals first,
    /// then symbol patterns longest first, then names.
    fn tokenizer(&self) -> Result<&Regex, Error> {
        self.tokenizer.get_or_try_init(|| {
            let mut patterns: Vec<String> = self
                .specs
                .values()
                .filter(|s| !is_special_symbol(&s.symbol))
                .map(|s| match &s.pattern {
                    Some(p) => p.clone(),
                    None => {
                        if is_name_like(&s.symbol) {
                            format!(r"\b{}\b", regex_escape(&s.symbol))
                        } else {
                            regex_escape(&s.symbol)
                        }
                    }
                })
                .collect();
            patterns.sort_by_key(|p| std::cmp::Reverse(p.len()));

            let pattern = format!(
                "('(?:[^']|'')*'|\"(?:[^\"]|\"\")*\"|(?:\\d+|\\.\\d+)(?:\\.\\d*)?(?:[Ee][+-]?\\d+)?)\
                 |({})\
                 |({})\
                 |(\\S)\
                 |\\s+",
                patterns.join("|"),
                NAME_PATTERN,
            );
            Regex::new(&pattern).map_err(|e| {
                Error::from_code(
                    ErrorCode::FOER0000,
                    format!("cannot build tokenizer: {e}"),
                )
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Literal,
    Symbol,
    Name,
}

#[derive(Debug, Clone)]
struct RawTok {
    kind: RawKind,
    start: usize,
    end: usize,
}

fn position_at(source: &str, offset: usize) -> Position {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(idx) => offset - idx,
        None => offset + 1,
    };
    Position { line, column }
}

/// The parser engine: token stream state over a grammar and a static
/// context. Single-owner during `parse`.
pub struct Parser<'a> {
    pub sctx: &'a StaticContext,
    table: &'a SymbolTable,
    source: &'a str,
    raw: Vec<RawTok>,
    idx: usize,
    pub token: Option<Token>,
    pub next_token: Token,
    cur_span: Option<(usize, usize)>,
    next_span: Option<(usize, usize)>,
}

impl<'a> Parser<'a> {
    pub fn new(sctx: &'a StaticContext, table: &'a SymbolTable) -> Self {
        Self {
            sctx,
            table,
            source: "",
            raw: Vec::new(),
            idx: 0,
            token: None,
            next_token: end_token(),
            cur_span: None,
            next_span: None,
        }
    }

    /// Parse a source string into its root token. The caller runs static
    /// analysis on the result.
    pub fn parse(&mut self, source: &'a str) -> Result<Token, Error> {
        self.source = source;
        self.raw = self.tokenize(source)?;
        self.idx = 0;
        self.token = None;
        self.cur_span = None;
        self.load_next()?;
        let root = self.expression(0)?;
        if self.next_token.symbol != "(end)" {
            return Err(self.unexpected(&self.next_token.clone()));
        }
        Ok(root)
    }

    fn tokenize(&self, source: &str) -> Result<Vec<RawTok>, Error> {
        let regex = self.table.tokenizer()?;
        let mut out = Vec::new();
        for caps in regex.captures_iter(source) {
            let caps = caps.map_err(|e| {
                Error::from_code(ErrorCode::XPST0003, format!("tokenizer error: {e}"))
            })?;
            if let Some(m) = caps.get(1) {
                out.push(RawTok {
                    kind: RawKind::Literal,
                    start: m.start(),
                    end: m.end(),
                });
            } else if let Some(m) = caps.get(2) {
                out.push(RawTok {
                    kind: RawKind::Symbol,
                    start: m.start(),
                    end: m.end(),
                });
            } else if let Some(m) = caps.get(3) {
                out.push(RawTok {
                    kind: RawKind::Name,
                    start: m.start(),
                    end: m.end(),
                });
            } else if let Some(m) = caps.get(4) {
                return Err(Error::from_code(
                    ErrorCode::XPST0003,
                    format!("unexpected character {:?}", &source[m.start()..m.end()]),
                )
                .with_position(position_at(source, m.start())));
            }
        }
        Ok(out)
    }

    fn make_token(&self, raw: &RawTok) -> Result<Token, Error> {
        let text = &self.source[raw.start..raw.end];
        let position = position_at(self.source, raw.start);
        match raw.kind {
            RawKind::Symbol => {
                let spec = self.table.get(text).ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0003, format!("unknown symbol {text:?}"))
                        .with_position(position)
                })?;
                Ok(token_from_spec(spec, TokenValue::None, position))
            }
            RawKind::Name => {
                let spec = self.table.get("(name)").ok_or_else(|| {
                    Error::from_code(ErrorCode::FOER0000, "incomplete parser registration")
                })?;
                Ok(token_from_spec(
                    spec,
                    TokenValue::Str(text.to_string()),
                    position,
                ))
            }
            RawKind::Literal => {
                if text.starts_with('\'') || text.starts_with('"') {
                    let quote = text.chars().next().unwrap();
                    let inner = &text[1..text.len() - 1];
                    let unescaped = if quote == '\'' {
                        inner.replace("''", "'")
                    } else {
                        inner.replace("\"\"", "\"")
                    };
                    let spec = self.table.get("(string)").ok_or_else(|| {
                        Error::from_code(ErrorCode::FOER0000, "incomplete parser registration")
                    })?;
                    Ok(token_from_spec(spec, TokenValue::Str(unescaped), position))
                } else if text.contains('e') || text.contains('E') {
                    let value = text.parse::<f64>().map_err(|_| {
                        Error::from_code(ErrorCode::XPST0003, format!("invalid number {text:?}"))
                            .with_position(position)
                    })?;
                    let spec = self.table.get("(double)").unwrap();
                    Ok(token_from_spec(spec, TokenValue::Double(value), position))
                } else if text.contains('.') {
                    let value = text.parse::<f64>().map_err(|_| {
                        Error::from_code(ErrorCode::XPST0003, format!("invalid number {text:?}"))
                            .with_position(position)
                    })?;
                    let spec = self.table.get("(decimal)").unwrap();
                    Ok(token_from_spec(spec, TokenValue::Decimal(value), position))
                } else {
                    let value = text.parse::<i64>().map_err(|_| {
                        Error::from_code(ErrorCode::XPST0003, format!("invalid number {text:?}"))
                            .with_position(position)
                    })?;
                    let spec = self.table.get("(integer)").unwrap();
                    Ok(token_from_spec(spec, TokenValue::Integer(value), position))
                }
            }
        }
    }

    fn load_next(&mut self) -> Result<(), Error> {
        loop {
            if self.idx >= self.raw.len() {
                self.next_token = end_token();
                self.next_span = None;
                return Ok(());
            }
            let raw = self.raw[self.idx].clone();
            self.idx += 1;
            let token = self.make_token(&raw)?;
            if self.table.skip_comments && token.symbol == "(:" {
                self.skip_comment(token.position)?;
                continue;
            }
            self.next_span = Some((raw.start, raw.end));
            self.next_token = token;
            return Ok(());
        }
    }

    /// Consume a nested `(: ... :)` comment at the raw-token level.
    fn skip_comment(&mut self, start: Position) -> Result<(), Error> {
        let mut depth = 1usize;
        while depth > 0 {
            if self.idx >= self.raw.len() {
                return Err(Error::from_code(ErrorCode::XPST0003, "unclosed comment")
                    .with_position(start));
            }
            let raw = &self.raw[self.idx];
            let text = &self.source[raw.start..raw.end];
            if raw.kind == RawKind::Symbol {
                if text == "(:" {
                    depth += 1;
                } else if text == ":)" {
                    depth -= 1;
                }
            }
            self.idx += 1;
        }
        Ok(())
    }

    /// Advance to the next token, optionally asserting the symbol of the
    /// incoming token first.
    pub fn advance(&mut self) -> Result<(), Error> {
        if self.next_token.symbol == "(end)" {
            return Err(match &self.token {
                None => Error::from_code(ErrorCode::XPST0003, "source is empty"),
                Some(t) => Error::from_code(
                    ErrorCode::XPST0003,
                    format!("unexpected end of source after '{}'", t.symbol),
                )
                .with_position(t.position),
            });
        }
        self.token = Some(std::mem::replace(&mut self.next_token, end_token()));
        self.cur_span = self.next_span;
        self.load_next()
    }

    pub fn advance_expected(&mut self, symbols: &[&str]) -> Result<(), Error> {
        if !symbols.is_empty() && !symbols.contains(&self.next_token.symbol.as_str()) {
            return Err(self.unexpected(&self.next_token.clone()));
        }
        self.advance()
    }

    /// Advance until one of the stop symbols, returning the raw source
    /// chunk before it. Used for braced URI literals.
    pub fn advance_until(&mut self, stop_symbols: &[&str]) -> Result<String, Error> {
        let chunk_start = self.next_span.map(|(s, _)| s).unwrap_or(self.source.len());
        loop {
            if self.next_token.symbol == "(end)" {
                return Err(Error::from_code(
                    ErrorCode::XPST0003,
                    format!("expected one of {stop_symbols:?} before end of source"),
                ));
            }
            if stop_symbols.contains(&self.next_token.symbol.as_str()) {
                let chunk_end = self.next_span.map(|(s, _)| s).unwrap_or(self.source.len());
                return Ok(self.source[chunk_start..chunk_end].trim().to_string());
            }
            self.advance()?;
        }
    }

    /// The standard Pratt loop.
    pub fn expression(&mut self, rbp: u32) -> Result<Token, Error> {
        self.advance()?;
        let t = self.token.clone().expect("advance sets the current token");
        let mut left = self.nud(t)?;
        while rbp < self.next_token.lbp {
            self.advance()?;
            let t = self.token.clone().expect("advance sets the current token");
            left = self.led(t, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self, token: Token) -> Result<Token, Error> {
        match self.table.get(&token.symbol).and_then(|s| s.nud) {
            Some(f) => f(self, token),
            None => Err(self.unexpected(&token)),
        }
    }

    fn led(&mut self, token: Token, left: Token) -> Result<Token, Error> {
        match self.table.get(&token.symbol).and_then(|s| s.led) {
            Some(f) => f(self, token, left),
            None => Err(self.unexpected(&token)),
        }
    }

    /// Check the incoming token against `symbols`, converting a keyword
    /// token whose symbol is lexically a name into a `(name)` token. This
    /// resolves the `div`-as-element-name class of ambiguities.
    pub fn expected_name(&mut self, symbols: &[&str], message: &str) -> Result<(), Error> {
        if symbols.contains(&self.next_token.symbol.as_str()) {
            return Ok(());
        }
        if matches!(self.next_token.label, Label::Operator | Label::Symbol)
            && is_name_like(&self.next_token.symbol)
        {
            let spec = self.table.get("(name)").ok_or_else(|| {
                Error::from_code(ErrorCode::FOER0000, "incomplete parser registration")
            })?;
            let value = TokenValue::Str(self.next_token.symbol.clone());
            self.next_token = token_from_spec(spec, value, self.next_token.position);
            return Ok(());
        }
        Err(self
            .next_token
            .wrong_syntax(format!("{message}: found '{}'", self.next_token.symbol)))
    }

    pub fn next_is(&self, symbol: &str) -> bool {
        self.next_token.symbol == symbol
    }

    /// Manufacture a token of a registered symbol at the current position.
    /// Used by nud routines that synthesize operands.
    pub fn new_token(&self, symbol: &str, value: TokenValue) -> Result<Token, Error> {
        let spec = self.table.get(symbol).ok_or_else(|| {
            Error::from_code(
                ErrorCode::FOER0000,
                format!("symbol {symbol:?} is not registered"),
            )
        })?;
        let position = self
            .token
            .as_ref()
            .map(|t| t.position)
            .unwrap_or(Position { line: 1, column: 1 });
        Ok(token_from_spec(spec, value, position))
    }

    pub fn next_label(&self) -> Label {
        self.next_token.label
    }

    /// `true` when whitespace separates the current token from the next.
    pub fn is_spaced(&self) -> bool {
        match (self.cur_span, self.next_span) {
            (Some((_, end)), Some((start, _))) => end != start,
            _ => false,
        }
    }

    pub fn unexpected(&self, token: &Token) -> Error {
        let shown = match token.value.as_str() {
            Some(v) if token.label == Label::Literal => v.to_string(),
            _ => token.symbol.clone(),
        };
        Error::from_code(ErrorCode::XPST0003, format!("unexpected symbol '{shown}'"))
            .with_position(token.position)
    }
}

fn end_token() -> Token {
    Token {
        symbol: "(end)".to_string(),
        label: Label::Symbol,
        lbp: 0,
        rbp: 0,
        value: TokenValue::None,
        operands: Vec::new(),
        position: Position { line: 1, column: 1 },
        eval: None,
    }
}

fn token_from_spec(spec: &TokenSpec, value: TokenValue, position: Position) -> Token {
    Token {
        symbol: spec.symbol.clone(),
        label: spec.label,
        lbp: spec.lbp,
        rbp: spec.rbp,
        value,
        operands: Vec::new(),
        position,
        eval: spec.eval,
    }
}

//
// Generic nud/led routines bound by the registrars.
//

pub fn nud_literal(_parser: &mut Parser<'_>, token: Token) -> Result<Token, Error> {
    Ok(token)
}

pub fn nud_prefix(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    let operand = parser.expression(token.rbp)?;
    token.operands.push(operand);
    Ok(token)
}

pub fn led_infix(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    let right = parser.expression(token.rbp)?;
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

pub fn led_infixr(parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    let right = parser.expression(token.rbp)?;
    token.operands.push(left);
    token.operands.push(right);
    Ok(token)
}

pub fn led_postfix(_parser: &mut Parser<'_>, mut token: Token, left: Token) -> Result<Token, Error> {
    token.operands.push(left);
    Ok(token)
}

/// Symbols a node test may start with after an axis or `@`.
pub const NODE_TEST_SYMBOLS: &[&str] = &[
    "(name)",
    "*",
    "text",
    "node",
    "document-node",
    "comment",
    "processing-instruction",
    "attribute",
    "schema-attribute",
    "element",
    "schema-element",
];

pub fn nud_axis(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    parser.advance_expected(&["::"])?;
    parser.expected_name(NODE_TEST_SYMBOLS, "invalid node test after axis")?;
    let operand = parser.expression(token.rbp)?;
    token.operands.push(operand);
    Ok(token)
}

/// Argument list parsing shared by functions, kind tests and constructors.
pub fn nud_function(parser: &mut Parser<'_>, mut token: Token) -> Result<Token, Error> {
    let code = if token.label == Label::Function {
        ErrorCode::XPST0017
    } else {
        ErrorCode::XPST0003
    };
    let (min_args, max_args) = parser
        .table
        .get(&token.symbol)
        .and_then(|s| s.nargs)
        .unwrap_or((0, None));

    parser.advance_expected(&["("])?;
    let mut k = 0usize;
    while k < min_args {
        if parser.next_is(")") || parser.next_is("(end)") {
            let msg = format!("too few arguments: expected at least {min_args}");
            return Err(token.error(code, msg));
        }
        token.operands.push(parser.expression(5)?);
        k += 1;
        if k < min_args {
            if parser.next_is(")") {
                let msg = format!("too few arguments: expected at least {min_args}");
                return Err(token.error(code, msg));
            }
            parser.advance_expected(&[","])?;
        }
    }
    loop {
        if max_args.is_some_and(|m| k >= m) {
            break;
        }
        if parser.next_is(",") {
            parser.advance()?;
            token.operands.push(parser.expression(5)?);
        } else if k == 0 && !parser.next_is(")") {
            token.operands.push(parser.expression(5)?);
        } else {
            break;
        }
        k += 1;
    }
    if parser.next_is(",") {
        let msg = match max_args {
            Some(m) => format!("too many arguments: expected at most {m}"),
            None => "unexpected ',' in argument list".to_string(),
        };
        return Err(token.error(code, msg));
    }
    parser.advance_expected(&[")"])?;
    Ok(token)
}

fn eval_literal(token: &Token, _ec: &mut EvalContext<'_>) -> Result<XdmSequence, Error> {
    use crate::xdm::XdmAtomicValue as V;
    let value = match &token.value {
        TokenValue::Str(s) => V::String(s.clone()),
        TokenValue::Integer(i) => V::Integer(*i),
        TokenValue::Decimal(d) => V::Decimal(*d),
        TokenValue::Double(d) => V::Double(*d),
        TokenValue::None => return Ok(Vec::new()),
    };
    Ok(vec![value.into()])
}

/// A parsed expression: the root token with its captured static context.
#[derive(Clone, Debug)]
pub struct CompiledXPath {
    pub root: Token,
    pub static_ctx: Arc<StaticContext>,
    pub source: String,
}

impl CompiledXPath {
    /// Evaluate against a dynamic context.
    pub fn evaluate(&self, dctx: &mut DynamicContext) -> Result<XdmSequence, Error> {
        let mut ec = EvalContext::new(&self.static_ctx, Some(dctx));
        self.root.evaluate(&mut ec)
    }

    /// Static evaluation: no dynamic context; `XPDY0002` is the caller's
    /// signal that data is genuinely required.
    pub fn evaluate_static(&self) -> Result<XdmSequence, Error> {
        let mut ec = EvalContext::new(&self.static_ctx, None);
        self.root.evaluate(&mut ec)
    }

    /// The canonicalized source form of the parsed tree.
    pub fn canonical_source(&self) -> String {
        self.root.source()
    }
}
