//! Sequence types: occurrence-indicator-qualified item types, node kind
//! tests, and the matching rules behind `instance of` / `treat as` and
//! variable type checking.

use crate::context::StaticContext;
use crate::errors::{Error, ErrorCode};
use crate::nodes::{NodeId, NodeKind, NodeTree};
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn indicator(&self) -> &'static str {
        match self {
            Occurrence::One => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }

    pub fn accepts_empty(&self) -> bool {
        matches!(self, Occurrence::ZeroOrOne | Occurrence::ZeroOrMore)
    }

    pub fn accepts_many(&self) -> bool {
        matches!(self, Occurrence::ZeroOrMore | Occurrence::OneOrMore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOrWildcard {
    Name(ExpandedName),
    Any,
}

impl NameOrWildcard {
    fn matches(&self, name: Option<&ExpandedName>) -> bool {
        match self {
            NameOrWildcard::Any => true,
            NameOrWildcard::Name(expected) => name == Some(expected),
        }
    }
}

/// Node kind tests, usable both as step node tests and inside sequence
/// types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `node()`
    AnyKind,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()` with optional target
    ProcessingInstruction(Option<String>),
    /// `document-node()` with optional element test
    Document(Option<Box<NodeTest>>),
    /// `element(name?, type?)`
    Element {
        name: Option<NameOrWildcard>,
        type_name: Option<ExpandedName>,
    },
    /// `attribute(name?, type?)`
    Attribute {
        name: Option<NameOrWildcard>,
        type_name: Option<ExpandedName>,
    },
    /// `schema-element(QName)`
    SchemaElement(ExpandedName),
    /// `schema-attribute(QName)`
    SchemaAttribute(ExpandedName),
}

impl NodeTest {
    /// Whether the node satisfies this kind test.
    pub fn matches(
        &self,
        tree: &NodeTree,
        id: NodeId,
        sctx: &StaticContext,
    ) -> Result<bool, Error> {
        let kind = tree.kind(id);
        match self {
            NodeTest::AnyKind => Ok(true),
            NodeTest::Text => Ok(kind == NodeKind::Text),
            NodeTest::Comment => Ok(kind == NodeKind::Comment),
            NodeTest::ProcessingInstruction(target) => {
                if kind != NodeKind::ProcessingInstruction {
                    return Ok(false);
                }
                match target {
                    None => Ok(true),
                    Some(t) => Ok(tree
                        .name(id)
                        .map(|n| n.local == t.trim())
                        .unwrap_or(false)),
                }
            }
            NodeTest::Document(inner) => {
                if kind != NodeKind::Document {
                    return Ok(false);
                }
                match inner {
                    None => Ok(true),
                    Some(test) => {
                        let mut element_matches = 0usize;
                        for &child in tree.children(id) {
                            if tree.kind(child) == NodeKind::Element
                                && test.matches(tree, child, sctx)?
                            {
                                element_matches += 1;
                            }
                        }
                        Ok(element_matches == 1)
                    }
                }
            }
            NodeTest::Element { name, type_name } => {
                if kind != NodeKind::Element {
                    return Ok(false);
                }
                if let Some(n) = name
                    && !n.matches(tree.expanded_name(id).as_ref())
                {
                    return Ok(false);
                }
                Ok(type_matches(tree, id, type_name))
            }
            NodeTest::Attribute { name, type_name } => {
                if kind != NodeKind::Attribute {
                    return Ok(false);
                }
                if let Some(n) = name
                    && !n.matches(tree.expanded_name(id).as_ref())
                {
                    return Ok(false);
                }
                Ok(type_matches(tree, id, type_name))
            }
            NodeTest::SchemaElement(qname) => {
                let schema = sctx.schema.as_ref().ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0008, "schema-element() requires a schema")
                })?;
                if schema.get_element(&qname.to_string()).is_none() {
                    return Err(Error::from_code(
                        ErrorCode::XPST0008,
                        format!("element {qname} not found in schema"),
                    ));
                }
                Ok(kind == NodeKind::Element
                    && tree.expanded_name(id).as_ref() == Some(qname))
            }
            NodeTest::SchemaAttribute(qname) => {
                let schema = sctx.schema.as_ref().ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0008, "schema-attribute() requires a schema")
                })?;
                if schema.get_attribute(&qname.to_string()).is_none() {
                    return Err(Error::from_code(
                        ErrorCode::XPST0008,
                        format!("attribute {qname} not found in schema"),
                    ));
                }
                Ok(kind == NodeKind::Attribute
                    && tree.expanded_name(id).as_ref() == Some(qname))
            }
        }
    }

    pub fn source(&self) -> String {
        match self {
            NodeTest::AnyKind => "node()".to_string(),
            NodeTest::Text => "text()".to_string(),
            NodeTest::Comment => "comment()".to_string(),
            NodeTest::ProcessingInstruction(None) => "processing-instruction()".to_string(),
            NodeTest::ProcessingInstruction(Some(t)) => {
                format!("processing-instruction('{t}')")
            }
            NodeTest::Document(None) => "document-node()".to_string(),
            NodeTest::Document(Some(inner)) => format!("document-node({})", inner.source()),
            NodeTest::Element { name, type_name } => {
                format_kind_test("element", name, type_name)
            }
            NodeTest::Attribute { name, type_name } => {
                format_kind_test("attribute", name, type_name)
            }
            NodeTest::SchemaElement(q) => format!("schema-element({q})"),
            NodeTest::SchemaAttribute(q) => format!("schema-attribute({q})"),
        }
    }
}

fn format_kind_test(
    keyword: &str,
    name: &Option<NameOrWildcard>,
    type_name: &Option<ExpandedName>,
) -> String {
    let mut parts = Vec::new();
    match name {
        Some(NameOrWildcard::Any) => parts.push("*".to_string()),
        Some(NameOrWildcard::Name(q)) => parts.push(q.to_string()),
        None => {}
    }
    if let Some(t) = type_name {
        parts.push(t.to_string());
    }
    format!("{keyword}({})", parts.join(", "))
}

fn type_matches(tree: &NodeTree, id: NodeId, type_name: &Option<ExpandedName>) -> bool {
    match type_name {
        None => true,
        Some(t) => {
            if t.local == "anyType" {
                return true;
            }
            match tree.type_name(id) {
                Some(annotation) => {
                    ExpandedName::from_clark(annotation) == *t || annotation == t.local
                }
                None => false,
            }
        }
    }
}

/// An occurrence-qualified item type, e.g. `element()*` or `xs:integer?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    AnyItem,
    Atomic(ExpandedName),
    Kind(NodeTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceType {
    Empty,
    Typed {
        item: ItemType,
        occurrence: Occurrence,
    },
}

impl SequenceType {
    pub fn one(item: ItemType) -> Self {
        SequenceType::Typed {
            item,
            occurrence: Occurrence::One,
        }
    }

    /// Parse a sequence type string (`xs:integer?`, `element()*`,
    /// `empty-sequence()`, `node()`, `item()+`), as used for in-scope
    /// variable declarations.
    pub fn parse(text: &str, sctx: &StaticContext) -> Result<Self, Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::from_code(
                ErrorCode::XPST0003,
                "empty sequence type",
            ));
        }
        if text == "empty-sequence()" {
            return Ok(SequenceType::Empty);
        }
        let (body, occurrence) = match text.chars().last() {
            Some('?') => (&text[..text.len() - 1], Occurrence::ZeroOrOne),
            Some('*') => (&text[..text.len() - 1], Occurrence::ZeroOrMore),
            Some('+') => (&text[..text.len() - 1], Occurrence::OneOrMore),
            _ => (text, Occurrence::One),
        };
        let body = body.trim();
        let item = match body {
            "item()" => ItemType::AnyItem,
            "node()" => ItemType::Kind(NodeTest::AnyKind),
            "text()" => ItemType::Kind(NodeTest::Text),
            "comment()" => ItemType::Kind(NodeTest::Comment),
            "processing-instruction()" => ItemType::Kind(NodeTest::ProcessingInstruction(None)),
            "document-node()" => ItemType::Kind(NodeTest::Document(None)),
            "element()" => ItemType::Kind(NodeTest::Element {
                name: None,
                type_name: None,
            }),
            "attribute()" => ItemType::Kind(NodeTest::Attribute {
                name: None,
                type_name: None,
            }),
            _ => {
                let expanded = resolve_type_name(body, sctx)?;
                ItemType::Atomic(expanded)
            }
        };
        Ok(SequenceType::Typed { item, occurrence })
    }

    /// Whether the sequence matches this type.
    pub fn matches(
        &self,
        seq: &XdmSequence,
        tree: Option<&NodeTree>,
        sctx: &StaticContext,
    ) -> Result<bool, Error> {
        match self {
            SequenceType::Empty => Ok(seq.is_empty()),
            SequenceType::Typed { item, occurrence } => {
                if seq.is_empty() {
                    return Ok(occurrence.accepts_empty());
                }
                if seq.len() > 1 && !occurrence.accepts_many() {
                    return Ok(false);
                }
                for it in seq {
                    if !item_matches(item, it, tree, sctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    pub fn source(&self) -> String {
        match self {
            SequenceType::Empty => "empty-sequence()".to_string(),
            SequenceType::Typed { item, occurrence } => {
                let body = match item {
                    ItemType::AnyItem => "item()".to_string(),
                    ItemType::Atomic(q) => q.to_string(),
                    ItemType::Kind(test) => test.source(),
                };
                format!("{body}{}", occurrence.indicator())
            }
        }
    }
}

fn item_matches(
    item_type: &ItemType,
    item: &XdmItem,
    tree: Option<&NodeTree>,
    sctx: &StaticContext,
) -> Result<bool, Error> {
    match item_type {
        ItemType::AnyItem => Ok(true),
        ItemType::Kind(test) => match item {
            XdmItem::Node(id) => {
                let tree = tree.ok_or_else(Error::missing_context)?;
                test.matches(tree, *id, sctx)
            }
            XdmItem::Atomic(_) => Ok(false),
        },
        ItemType::Atomic(type_name) => match item {
            XdmItem::Node(_) => Ok(false),
            XdmItem::Atomic(v) => atomic_is_instance(v, type_name, sctx),
        },
    }
}

/// Resolve a lexical type QName against the static namespaces.
pub fn resolve_type_name(name: &str, sctx: &StaticContext) -> Result<ExpandedName, Error> {
    if let Some(rest) = name.strip_prefix('{')
        && let Some((uri, local)) = rest.split_once('}')
    {
        return Ok(ExpandedName::new(Some(uri.to_string()), local));
    }
    if let Some((prefix, local)) = name.split_once(':') {
        let uri = sctx.namespaces.get(prefix).ok_or_else(|| {
            Error::from_code(
                ErrorCode::XPST0081,
                format!("prefix '{prefix}' is not declared"),
            )
        })?;
        return Ok(ExpandedName::new(Some(uri.clone()), local));
    }
    Ok(ExpandedName::local(name))
}

/// Instance-of check for an atomic value against a named atomic type.
/// XSD-namespace names use the built-in hierarchy; other names go through
/// the schema proxy. Unknown types raise `XPST0051`.
pub fn atomic_is_instance(
    value: &XdmAtomicValue,
    type_name: &ExpandedName,
    sctx: &StaticContext,
) -> Result<bool, Error> {
    let in_xsd = match &type_name.ns_uri {
        Some(uri) => uri == crate::consts::XSD_URI,
        // An unprefixed type name falls back to the xs namespace.
        None => true,
    };
    if !in_xsd {
        if let Some(schema) = &sctx.schema {
            return schema.is_instance(value, &type_name.to_string());
        }
        return Err(Error::from_code(
            ErrorCode::XPST0051,
            format!("unknown atomic type {type_name}"),
        ));
    }

    let matched = match type_name.local.as_str() {
        "anyAtomicType" => true,
        "untypedAtomic" => matches!(value, XdmAtomicValue::UntypedAtomic(_)),
        "string" => matches!(value, XdmAtomicValue::String(_)),
        "boolean" => matches!(value, XdmAtomicValue::Boolean(_)),
        "integer" | "long" | "int" | "short" | "byte" => {
            matches!(value, XdmAtomicValue::Integer(_))
        }
        "decimal" => matches!(
            value,
            XdmAtomicValue::Integer(_) | XdmAtomicValue::Decimal(_)
        ),
        "double" => matches!(value, XdmAtomicValue::Double(_)),
        "float" => matches!(value, XdmAtomicValue::Double(_)),
        "anyURI" => matches!(value, XdmAtomicValue::AnyUri(_)),
        "QName" => matches!(value, XdmAtomicValue::QName { .. }),
        "dateTime" => matches!(value, XdmAtomicValue::DateTime(_)),
        "date" => matches!(value, XdmAtomicValue::Date { .. }),
        "time" => matches!(value, XdmAtomicValue::Time { .. }),
        "duration" => matches!(
            value,
            XdmAtomicValue::YearMonthDuration(_) | XdmAtomicValue::DayTimeDuration(_)
        ),
        "yearMonthDuration" => matches!(value, XdmAtomicValue::YearMonthDuration(_)),
        "dayTimeDuration" => matches!(value, XdmAtomicValue::DayTimeDuration(_)),
        other => {
            return Err(Error::from_code(
                ErrorCode::XPST0051,
                format!("unknown atomic type xs:{other}"),
            ));
        }
    };
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_print() {
        let sctx = StaticContext::xpath2();
        let st = SequenceType::parse("xs:integer?", &sctx).unwrap();
        assert!(matches!(
            st,
            SequenceType::Typed {
                occurrence: Occurrence::ZeroOrOne,
                ..
            }
        ));
        let st = SequenceType::parse("element()*", &sctx).unwrap();
        assert_eq!(st.source(), "element()*");
        assert_eq!(
            SequenceType::parse("empty-sequence()", &sctx).unwrap(),
            SequenceType::Empty
        );
    }

    #[test]
    fn atomic_hierarchy() {
        let sctx = StaticContext::xpath2();
        let int_t = ExpandedName::new(Some(crate::consts::XSD_URI.to_string()), "integer");
        let dec_t = ExpandedName::new(Some(crate::consts::XSD_URI.to_string()), "decimal");
        assert!(atomic_is_instance(&XdmAtomicValue::Integer(1), &int_t, &sctx).unwrap());
        assert!(atomic_is_instance(&XdmAtomicValue::Integer(1), &dec_t, &sctx).unwrap());
        assert!(!atomic_is_instance(&XdmAtomicValue::Double(1.0), &dec_t, &sctx).unwrap());
        let bad = ExpandedName::new(Some(crate::consts::XSD_URI.to_string()), "nosuch");
        assert!(atomic_is_instance(&XdmAtomicValue::Integer(1), &bad, &sctx).is_err());
    }
}
