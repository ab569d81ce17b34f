//! An XPath 1.0/2.0 selector engine for in-memory XML trees.
//!
//! The expression grammar is defined as a TDOP (Pratt) symbol table whose
//! tokens double as AST nodes; evaluation walks the token tree against an
//! XDM node arena built from a host XML tree. XML parsing is out of scope:
//! trees enter through the small host capability traits in [`host`].
//!
//! ```
//! use treepath_xpath::host::elem;
//! use treepath_xpath::{select, XPathResult};
//!
//! // <r><a/><b/><c/></r>
//! let root = elem("r")
//!     .child(elem("a"))
//!     .child(elem("b"))
//!     .child(elem("c"))
//!     .build();
//! let results = select(&root, "/r/*[last()]").unwrap();
//! assert_eq!(results.len(), 1);
//! assert!(matches!(&results[0], XPathResult::Element(_)));
//! ```

pub mod consts;
pub mod context;
pub mod errors;
pub mod evaluator;
pub mod host;
pub mod nodes;
pub mod schema;
pub mod selector;
pub mod sequence_types;
pub mod tdop;
pub mod tree_builders;
pub mod xdm;
pub mod xpath1;
pub mod xpath2;

pub use context::{
    Axis, DynamicContext, DynamicContextBuilder, StaticContext, StaticContextBuilder,
    XPathVersion,
};
pub use errors::{Error, ErrorCode, Position};
pub use nodes::{NodeId, NodeKind, NodeTree, XdmNodeRef};
pub use schema::{SchemaProxy, XsdTypeLike};
pub use selector::{
    iter_select, select, select_with, ExpressionParser, Selector, XPathResult, XdmResult,
    XmlTreeRoot,
};
pub use sequence_types::{ItemType, NodeTest, Occurrence, SequenceType};
pub use tdop::{CompiledXPath, Label, SymbolTable, Token};
pub use tree_builders::{
    build_lxml_node_tree, build_node_tree, build_schema_node_tree, get_node_tree, BuiltTree,
    XmlInput,
};
pub use xdm::{ExpandedName, QName, XdmAtomicValue, XdmItem, XdmSequence};
pub use xpath1::XPath1Parser;
pub use xpath2::XPath2Parser;
