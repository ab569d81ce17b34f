//! Static and dynamic evaluation contexts.
//!
//! The static context is captured by the parser and embedded into the
//! compiled expression; supplying different static settings at evaluation
//! time has no effect, mirroring XPath 2.0's separation of static analysis
//! from evaluation. The dynamic context is the focus cursor driven by the
//! evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::consts::{ERR_NS, FN_URI, XLINK_URI, XML_URI, XSD_URI};
use crate::errors::Error;
use crate::nodes::NodeTree;
use crate::schema::SchemaProxy;
use crate::sequence_types::SequenceType;
use crate::xdm::{XdmItem, XdmSequence};

/// Grammar generation the parser was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XPathVersion {
    V1,
    V2,
}

/// The thirteen axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    FollowingSibling,
    Following,
    Namespace,
    Parent,
    Ancestor,
    PrecedingSibling,
    Preceding,
    AncestorOrSelf,
}

impl Axis {
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::Following => "following",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Preceding => "preceding",
            Axis::AncestorOrSelf => "ancestor-or-self",
        }
    }
}

/// Compile-time configuration: namespaces, defaults, in-scope variables,
/// schema view.
#[derive(Debug, Clone)]
pub struct StaticContext {
    pub version: XPathVersion,
    pub namespaces: HashMap<String, String>,
    /// Default element namespace (2.0+); unprefixed element name tests
    /// resolve against it.
    pub default_namespace: Option<String>,
    /// Default function namespace (2.0+).
    pub function_namespace: Option<String>,
    /// In-scope variables: name (without `$`) to declared sequence type.
    pub variable_types: HashMap<String, SequenceType>,
    pub schema: Option<Arc<dyn SchemaProxy>>,
    /// XPath 1.0 compatibility rules. Always `true` for the 1.0 parser.
    pub compatibility_mode: bool,
    pub base_uri: Option<String>,
    /// When `false`, the ElementTree-style `{uri}name` syntax is accepted.
    pub strict: bool,
}

impl StaticContext {
    pub fn xpath1() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert("xml".to_string(), XML_URI.to_string());
        Self {
            version: XPathVersion::V1,
            namespaces,
            default_namespace: None,
            function_namespace: None,
            variable_types: HashMap::new(),
            schema: None,
            compatibility_mode: true,
            base_uri: None,
            strict: true,
        }
    }

    pub fn xpath2() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert("xml".to_string(), XML_URI.to_string());
        namespaces.insert("xs".to_string(), XSD_URI.to_string());
        namespaces.insert("fn".to_string(), FN_URI.to_string());
        namespaces.insert("err".to_string(), ERR_NS.to_string());
        namespaces.insert("xlink".to_string(), XLINK_URI.to_string());
        Self {
            version: XPathVersion::V2,
            namespaces,
            default_namespace: None,
            function_namespace: Some(FN_URI.to_string()),
            variable_types: HashMap::new(),
            schema: None,
            compatibility_mode: false,
            base_uri: None,
            strict: true,
        }
    }

    /// Resolve a prefix, with `""` meaning the default element namespace.
    /// The reserved `xml` binding is always present.
    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix.is_empty() {
            return self.default_namespace.as_deref();
        }
        self.namespaces.get(prefix).map(|s| s.as_str())
    }

    /// Reverse lookup used by fn:name() for prefixed output.
    pub fn prefix_for_namespace(&self, uri: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, u)| u.as_str() == uri && !p.is_empty())
            .map(|(p, _)| p.as_str())
    }
}

/// Builder for `StaticContext`, preserving the required implicit bindings.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl StaticContextBuilder {
    pub fn xpath1() -> Self {
        Self {
            ctx: StaticContext::xpath1(),
        }
    }

    pub fn xpath2() -> Self {
        Self {
            ctx: StaticContext::xpath2(),
        }
    }

    /// Register a prefix → URI mapping. Attempts to rebind the reserved
    /// `xml` prefix are ignored.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        let uri = uri.into();
        if p.is_empty() {
            self.ctx.default_namespace = Some(uri.clone());
        }
        self.ctx.namespaces.insert(p, uri);
        self
    }

    pub fn with_default_namespace(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        self.ctx.namespaces.insert(String::new(), uri.clone());
        self.ctx.default_namespace = Some(uri);
        self
    }

    pub fn with_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.function_namespace = Some(uri.into());
        self
    }

    /// Declare an in-scope variable with its sequence type.
    pub fn with_variable(mut self, name: impl Into<String>, st: SequenceType) -> Self {
        self.ctx.variable_types.insert(name.into(), st);
        self
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaProxy>) -> Self {
        self.ctx.schema = Some(schema);
        self
    }

    pub fn with_compatibility_mode(mut self, enabled: bool) -> Self {
        self.ctx.compatibility_mode = enabled;
        self
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.ctx.strict = strict;
        self
    }

    pub fn build(mut self) -> StaticContext {
        if let Some(schema) = self.ctx.schema.clone() {
            schema.bind_parser(&mut self.ctx);
        }
        self.ctx
    }
}

/// Saved focus slice of the dynamic context, restored after axis and
/// predicate iteration.
#[derive(Debug, Clone)]
pub struct Focus {
    pub item: Option<XdmItem>,
    pub position: usize,
    pub size: usize,
    pub axis: Option<Axis>,
}

/// The dynamic context: tree, focus, variables, timezone, current dateTime.
#[derive(Debug, Clone)]
pub struct DynamicContext {
    pub tree: Option<Arc<NodeTree>>,
    pub item: Option<XdmItem>,
    pub position: usize,
    pub size: usize,
    /// The active axis while a step's node test runs; `None` selects the
    /// default child axis behavior.
    pub axis: Option<Axis>,
    scopes: Vec<HashMap<String, XdmSequence>>,
    pub uri: Option<String>,
    pub fragment: bool,
    /// Implicit timezone for date/time values without one.
    pub timezone: Option<FixedOffset>,
    /// Stable current dateTime for the whole evaluation.
    pub current_dt: DateTime<FixedOffset>,
}

impl DynamicContext {
    pub fn new(tree: Option<Arc<NodeTree>>) -> Self {
        let item = tree.as_ref().map(|t| XdmItem::Node(t.root()));
        Self {
            tree,
            item,
            position: 1,
            size: 1,
            axis: None,
            scopes: vec![HashMap::new()],
            uri: None,
            fragment: false,
            timezone: None,
            current_dt: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn tree(&self) -> Result<&Arc<NodeTree>, Error> {
        self.tree.as_ref().ok_or_else(Error::missing_context)
    }

    /// Look up a variable through the scope stack, innermost frame first.
    pub fn variable(&self, name: &str) -> Option<&XdmSequence> {
        self.scopes.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Bind a variable in the innermost frame.
    pub fn set_variable(&mut self, name: impl Into<String>, value: XdmSequence) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// All bindings visible from the current scope, outer shadowed by inner.
    pub fn visible_variables(&self) -> HashMap<String, XdmSequence> {
        let mut out = HashMap::new();
        for frame in &self.scopes {
            for (k, v) in frame {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    /// Enter a binder scope (`for`, quantifiers). Must be paired with
    /// `pop_scope` on every exit path.
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "unbalanced scope pop");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn save_focus(&self) -> Focus {
        Focus {
            item: self.item.clone(),
            position: self.position,
            size: self.size,
            axis: self.axis,
        }
    }

    pub fn set_focus(&mut self, item: Option<XdmItem>, position: usize, size: usize) {
        self.item = item;
        self.position = position;
        self.size = size;
    }

    pub fn restore_focus(&mut self, focus: Focus) {
        self.item = focus.item;
        self.position = focus.position;
        self.size = focus.size;
        self.axis = focus.axis;
    }
}

/// Builder for `DynamicContext`.
pub struct DynamicContextBuilder {
    ctx: DynamicContext,
    explicit_item: bool,
}

impl Default for DynamicContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: DynamicContext::new(None),
            explicit_item: false,
        }
    }

    pub fn with_tree(mut self, tree: Arc<NodeTree>) -> Self {
        if !self.explicit_item {
            self.ctx.item = Some(XdmItem::Node(tree.root()));
        }
        self.ctx.tree = Some(tree);
        self
    }

    pub fn with_item(mut self, item: impl Into<XdmItem>) -> Self {
        self.ctx.item = Some(item.into());
        self.explicit_item = true;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: XdmSequence) -> Self {
        self.ctx.set_variable(name, value);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.uri = Some(uri.into());
        self
    }

    pub fn with_fragment(mut self, fragment: bool) -> Self {
        self.ctx.fragment = fragment;
        self
    }

    /// Implicit timezone as an offset in minutes.
    pub fn with_timezone(mut self, offset_minutes: i32) -> Self {
        if let Some(tz) = FixedOffset::east_opt(offset_minutes * 60) {
            self.ctx.timezone = Some(tz);
        }
        self
    }

    /// Fix the current dateTime for deterministic evaluation.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.ctx.current_dt = now;
        self
    }

    pub fn build(self) -> DynamicContext {
        self.ctx
    }
}

/// The holder threaded through token evaluation: the static context always,
/// the dynamic context only when evaluation has data. Static analysis runs
/// with `dctx` absent and absorbs the resulting missing-context errors.
pub struct EvalContext<'a> {
    pub sctx: &'a StaticContext,
    pub dctx: Option<&'a mut DynamicContext>,
}

impl<'a> EvalContext<'a> {
    pub fn new(sctx: &'a StaticContext, dctx: Option<&'a mut DynamicContext>) -> Self {
        Self { sctx, dctx }
    }

    pub fn has_context(&self) -> bool {
        self.dctx.is_some()
    }

    /// The dynamic context, or the `XPDY0002` error absorbed by static
    /// analysis.
    pub fn dyn_ctx(&mut self) -> Result<&mut DynamicContext, Error> {
        self.dctx.as_deref_mut().ok_or_else(Error::missing_context)
    }

    pub fn dyn_ref(&self) -> Result<&DynamicContext, Error> {
        self.dctx.as_deref().ok_or_else(Error::missing_context)
    }

    /// Shared handle to the node tree of the dynamic context.
    pub fn tree(&self) -> Result<Arc<NodeTree>, Error> {
        Ok(self.dyn_ref()?.tree()?.clone())
    }
}
