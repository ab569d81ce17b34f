//! XPath error codes and the crate error type.
//!
//! Every failure carries one of the W3C xqt-errors codes. Codes are
//! introduced when first emitted by a feature; `FOER0000` is the generic
//! fallback.

use std::fmt;

/// Source position of a token, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// XPath/XQuery 2.0 error codes emitted by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum ErrorCode {
    // Static errors
    XPST0003, // invalid expression syntax
    XPST0005, // expression has the empty static type
    XPST0008, // undeclared variable
    XPST0010, // unsupported axis
    XPST0017, // unknown function or wrong number of arguments
    XPST0051, // unknown atomic type
    XPST0080, // cast target cannot be xs:NOTATION or xs:anyAtomicType
    XPST0081, // unknown namespace prefix
    // Type errors
    XPTY0004, // type is not appropriate for the context
    XPTY0018, // path step result mixes nodes and atomic values
    XPTY0019, // intermediate path step produced an atomic value
    XPTY0020, // context item is not a node
    // Dynamic errors
    XPDY0002, // dynamic context required
    XPDY0050, // value does not match sequence type
    // Arithmetic
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow/underflow
    // Casting and values
    FOCA0002, // invalid lexical value
    FOCA0005, // NaN supplied as float/double value
    FOCH0002, // unsupported collation
    FODT0001, // overflow in date/time arithmetic
    FODT0002, // overflow in duration arithmetic
    FODT0003, // invalid timezone value
    FONS0004, // no namespace found for prefix
    FORG0001, // invalid value for cast/constructor
    FORG0003, // zero-or-one called with more than one item
    FORG0004, // one-or-more called with no items
    FORG0005, // exactly-one called with zero or more than one item
    FORG0006, // invalid argument type
    FOTY0012, // node has no typed value
    FOER0000, // unidentified error
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0005 => "XPST0005",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0010 => "XPST0010",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0051 => "XPST0051",
            ErrorCode::XPST0080 => "XPST0080",
            ErrorCode::XPST0081 => "XPST0081",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOCA0002 => "FOCA0002",
            ErrorCode::FOCA0005 => "FOCA0005",
            ErrorCode::FOCH0002 => "FOCH0002",
            ErrorCode::FODT0001 => "FODT0001",
            ErrorCode::FODT0002 => "FODT0002",
            ErrorCode::FODT0003 => "FODT0003",
            ErrorCode::FONS0004 => "FONS0004",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0003 => "FORG0003",
            ErrorCode::FORG0004 => "FORG0004",
            ErrorCode::FORG0005 => "FORG0005",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FOTY0012 => "FOTY0012",
            ErrorCode::FOER0000 => "FOER0000",
        }
    }

    /// Default human message for the code, used when no custom message is given.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::XPST0003 => "invalid XPath expression",
            ErrorCode::XPST0005 => "a not empty sequence required",
            ErrorCode::XPST0008 => "name not found",
            ErrorCode::XPST0010 => "axis not found",
            ErrorCode::XPST0017 => "wrong number of arguments",
            ErrorCode::XPST0051 => "unknown atomic type",
            ErrorCode::XPST0080 => "target type cannot be xs:NOTATION or xs:anyAtomicType",
            ErrorCode::XPST0081 => "unknown namespace prefix",
            ErrorCode::XPTY0004 => "type is not appropriate for the context",
            ErrorCode::XPTY0018 => "step result contains both nodes and atomic values",
            ErrorCode::XPTY0019 => "intermediate step contains an atomic value",
            ErrorCode::XPTY0020 => "context item is not a node",
            ErrorCode::XPDY0002 => "dynamic context required for evaluation",
            ErrorCode::XPDY0050 => "type does not match sequence type",
            ErrorCode::FOAR0001 => "division by zero",
            ErrorCode::FOAR0002 => "numeric operation overflow/underflow",
            ErrorCode::FOCA0002 => "invalid lexical value",
            ErrorCode::FOCA0005 => "NaN supplied as float/double value",
            ErrorCode::FOCH0002 => "unsupported collation",
            ErrorCode::FODT0001 => "overflow in date/time operation",
            ErrorCode::FODT0002 => "overflow in duration operation",
            ErrorCode::FODT0003 => "invalid timezone value",
            ErrorCode::FONS0004 => "no namespace found for prefix",
            ErrorCode::FORG0001 => "invalid value for cast/constructor",
            ErrorCode::FORG0003 => "zero-or-one called with a sequence of more than one item",
            ErrorCode::FORG0004 => "one-or-more called with an empty sequence",
            ErrorCode::FORG0005 => "exactly-one called with zero or more than one item",
            ErrorCode::FORG0006 => "invalid argument type",
            ErrorCode::FOTY0012 => "argument node does not have a typed value",
            ErrorCode::FOER0000 => "unidentified error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err:{}", self.as_str())
    }
}

fn fmt_location(position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!(" at {pos}"),
        None => String::new(),
    }
}

/// Error type of the whole engine. Carries a W3C error code, a message and,
/// when raised during parsing or from a positioned token, the source position.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} [{code}]{}", fmt_location(.position))]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub position: Option<Position>,
}

impl Error {
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            position: None,
        }
    }

    /// Error with the code's default message.
    pub fn code_only(code: ErrorCode) -> Self {
        Self::from_code(code, code.default_message())
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Attach a position unless one is already present. Used while unwinding
    /// through token evaluation so the innermost location wins.
    pub fn or_position(mut self, position: Position) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }

    /// The prefixed code string, e.g. `err:XPST0003`.
    pub fn code_str(&self) -> String {
        self.code.to_string()
    }

    pub fn missing_context() -> Self {
        Self::code_only(ErrorCode::XPDY0002)
    }

    /// `true` for the error absorbed by static analysis: evaluation only
    /// failed because no dynamic context was supplied yet.
    pub fn is_missing_context(&self) -> bool {
        self.code == ErrorCode::XPDY0002
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_position() {
        let err = Error::from_code(ErrorCode::XPST0003, "unexpected symbol ')'")
            .with_position(Position { line: 1, column: 7 });
        assert_eq!(
            err.to_string(),
            "unexpected symbol ')' [err:XPST0003] at line 1, column 7"
        );
    }

    #[test]
    fn default_messages() {
        let err = Error::code_only(ErrorCode::FOAR0001);
        assert_eq!(err.to_string(), "division by zero [err:FOAR0001]");
    }
}
