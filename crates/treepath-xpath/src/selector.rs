//! Selector facade: one-shot `select` / `iter_select` plus the reusable
//! `Selector` that pre-parses its expression.
//!
//! The facade builds the node tree from the host root, constructs the
//! dynamic context, runs the compiled expression and unwraps XDM nodes back
//! to host values (elements to host handles, attribute/text/namespace nodes
//! to their string values) unless the caller asks for XDM nodes.

use std::collections::HashMap;

use tracing::debug;

use crate::context::{DynamicContext, DynamicContextBuilder, StaticContext};
use crate::errors::{Error, ErrorCode};
use crate::host::{DocumentLike, ElementLike, SimpleDocument, SimpleElement};
use crate::nodes::{NodeKind, XdmNodeRef};
use crate::tdop::CompiledXPath;
use crate::tree_builders::{build_lxml_node_tree, build_node_tree, BuiltTree};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};
use crate::xpath1::XPath1Parser;
use crate::xpath2::XPath2Parser;

/// Anything that can serve as the root of a selection: it knows how to
/// build its node tree.
pub trait XmlTreeRoot {
    type Element: ElementLike;

    fn build(&self) -> BuiltTree<Self::Element>;
}

impl XmlTreeRoot for SimpleElement {
    type Element = SimpleElement;

    fn build(&self) -> BuiltTree<SimpleElement> {
        build_node_tree(self)
    }
}

impl XmlTreeRoot for SimpleDocument {
    type Element = SimpleElement;

    fn build(&self) -> BuiltTree<SimpleElement> {
        build_lxml_node_tree(self)
    }
}

/// Generic adapter for any document-like host.
impl<D> XmlTreeRoot for &D
where
    D: DocumentLike,
{
    type Element = D::Element;

    fn build(&self) -> BuiltTree<D::Element> {
        build_lxml_node_tree(*self)
    }
}

/// A parser that compiles expressions; implemented by both grammar
/// generations.
pub trait ExpressionParser {
    fn parse_expression(&self, path: &str) -> Result<CompiledXPath, Error>;
}

impl ExpressionParser for XPath1Parser {
    fn parse_expression(&self, path: &str) -> Result<CompiledXPath, Error> {
        self.parse(path)
    }
}

impl ExpressionParser for XPath2Parser {
    fn parse_expression(&self, path: &str) -> Result<CompiledXPath, Error> {
        self.parse(path)
    }
}

/// One selection result, unwrapped toward host values.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathResult<E> {
    /// An element node mapped back to its host handle.
    Element(E),
    /// An atomic value, or the string value of an attribute, text or
    /// namespace node.
    Atomic(XdmAtomicValue),
    /// Any other node (document, comment, processing instruction).
    Node(XdmNodeRef),
}

impl<E> XPathResult<E> {
    /// The result as a string, for value-like results.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            XPathResult::Atomic(
                XdmAtomicValue::String(s)
                | XdmAtomicValue::UntypedAtomic(s)
                | XdmAtomicValue::AnyUri(s),
            ) => Some(s),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&E> {
        match self {
            XPathResult::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// A selection result in XDM terms, when unwrapping is not wanted.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmResult {
    Node(XdmNodeRef),
    Atomic(XdmAtomicValue),
}

/// A reusable, pre-parsed selector.
#[derive(Clone)]
pub struct Selector {
    compiled: CompiledXPath,
}

impl Selector {
    /// Parse with the default XPath 2.0 parser.
    pub fn new(path: &str) -> Result<Self, Error> {
        Self::with_parser(path, &XPath2Parser::new())
    }

    pub fn with_parser(path: &str, parser: &dyn ExpressionParser) -> Result<Self, Error> {
        Ok(Self {
            compiled: parser.parse_expression(path)?,
        })
    }

    pub fn compiled(&self) -> &CompiledXPath {
        &self.compiled
    }

    pub fn select<R: XmlTreeRoot>(
        &self,
        root: &R,
    ) -> Result<Vec<XPathResult<R::Element>>, Error> {
        self.select_with(root, &HashMap::new())
    }

    pub fn select_with<R: XmlTreeRoot>(
        &self,
        root: &R,
        variables: &HashMap<String, XdmSequence>,
    ) -> Result<Vec<XPathResult<R::Element>>, Error> {
        let built = root.build();
        let mut dctx = dynamic_context(&built, variables);
        check_variables(&self.compiled.static_ctx, &dctx)?;
        let seq = self.compiled.evaluate(&mut dctx)?;
        debug!(results = seq.len(), "selection evaluated");
        Ok(unwrap_results(seq, &built))
    }

    /// Streaming variant of `select`.
    pub fn iter_select<R: XmlTreeRoot>(
        &self,
        root: &R,
    ) -> Result<impl Iterator<Item = XPathResult<R::Element>> + use<R>, Error> {
        Ok(self.select(root)?.into_iter())
    }

    /// Selection keeping XDM nodes instead of unwrapping to host values.
    pub fn select_xdm<R: XmlTreeRoot>(&self, root: &R) -> Result<Vec<XdmResult>, Error> {
        let built = root.build();
        let mut dctx = dynamic_context(&built, &HashMap::new());
        check_variables(&self.compiled.static_ctx, &dctx)?;
        let seq = self.compiled.evaluate(&mut dctx)?;
        Ok(seq
            .into_iter()
            .map(|item| match item {
                XdmItem::Node(id) => XdmResult::Node(XdmNodeRef {
                    tree: built.tree.clone(),
                    id,
                }),
                XdmItem::Atomic(v) => XdmResult::Atomic(v),
            })
            .collect())
    }
}

fn dynamic_context<E>(
    built: &BuiltTree<E>,
    variables: &HashMap<String, XdmSequence>,
) -> DynamicContext {
    let mut builder = DynamicContextBuilder::new().with_tree(built.tree.clone());
    for (name, value) in variables {
        builder = builder.with_variable(name.clone(), value.clone());
    }
    builder.build()
}

/// Variable checking against the static context: when in-scope variables
/// are declared, each must be supplied and each supplied value must match
/// its declared sequence type.
fn check_variables(sctx: &StaticContext, dctx: &DynamicContext) -> Result<(), Error> {
    if sctx.variable_types.is_empty() {
        return Ok(());
    }
    let provided = dctx.visible_variables();
    for name in sctx.variable_types.keys() {
        if !provided.contains_key(name) {
            return Err(Error::from_code(
                ErrorCode::XPST0008,
                format!("missing variable '{name}'"),
            ));
        }
    }
    for (name, value) in &provided {
        let Some(st) = sctx.variable_types.get(name) else {
            return Err(Error::from_code(
                ErrorCode::XPST0008,
                format!("undeclared variable '{name}'"),
            ));
        };
        let tree = dctx.tree.as_deref();
        if !st.matches(value, tree, sctx)? {
            return Err(Error::from_code(
                ErrorCode::XPDY0050,
                format!("unmatched sequence type for variable '{name}'"),
            ));
        }
    }
    Ok(())
}

fn unwrap_results<E: Clone>(seq: XdmSequence, built: &BuiltTree<E>) -> Vec<XPathResult<E>> {
    seq.into_iter()
        .map(|item| match item {
            XdmItem::Atomic(v) => XPathResult::Atomic(v),
            XdmItem::Node(id) => match built.tree.kind(id) {
                NodeKind::Element => match built.host_of(id) {
                    Some(host) => XPathResult::Element(host.clone()),
                    None => XPathResult::Node(XdmNodeRef {
                        tree: built.tree.clone(),
                        id,
                    }),
                },
                NodeKind::Attribute | NodeKind::Text | NodeKind::Namespace => {
                    XPathResult::Atomic(XdmAtomicValue::String(
                        built.tree.value(id).unwrap_or_default().to_string(),
                    ))
                }
                _ => XPathResult::Node(XdmNodeRef {
                    tree: built.tree.clone(),
                    id,
                }),
            },
        })
        .collect()
}

/// Apply `path` on `root` with the default XPath 2.0 parser.
pub fn select<R: XmlTreeRoot>(
    root: &R,
    path: &str,
) -> Result<Vec<XPathResult<R::Element>>, Error> {
    Selector::new(path)?.select(root)
}

/// `select` with an explicit parser and dynamic variables.
pub fn select_with<R: XmlTreeRoot>(
    root: &R,
    path: &str,
    parser: &dyn ExpressionParser,
    variables: &HashMap<String, XdmSequence>,
) -> Result<Vec<XPathResult<R::Element>>, Error> {
    Selector::with_parser(path, parser)?.select_with(root, variables)
}

/// Streaming variant of `select`.
pub fn iter_select<R: XmlTreeRoot>(
    root: &R,
    path: &str,
) -> Result<impl Iterator<Item = XPathResult<R::Element>>, Error> {
    Selector::new(path)?.iter_select(root)
}
