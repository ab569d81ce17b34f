//! Schema collaborator interfaces.
//!
//! The engine performs no XSD parsing. Schema awareness enters through the
//! `SchemaProxy` capability trait; implementations may be backed by any
//! external XSD processor.

use std::fmt;
use std::sync::Arc;

use crate::errors::Error;
use crate::xdm::XdmAtomicValue;

/// An XSD type as seen through the proxy.
pub trait XsdTypeLike: fmt::Debug + Send + Sync {
    /// Expanded type name in Clark notation.
    fn name(&self) -> String;
    fn is_simple(&self) -> bool;
    /// Lexical validity of a value against this type.
    fn is_valid(&self, value: &str) -> bool;
}

/// Abstract accessor over XSD types, attributes and elements.
///
/// `bind_parser` is invoked when a parser adopts the proxy, letting the
/// implementation seed namespaces or constructor types into the static
/// context. All other capabilities are pull-based.
pub trait SchemaProxy: fmt::Debug + Send + Sync {
    /// Seed the static context (namespace bindings, in-scope types).
    fn bind_parser(&self, _ctx: &mut crate::context::StaticContext) {}

    fn get_type(&self, qname: &str) -> Option<Arc<dyn XsdTypeLike>>;
    fn get_attribute(&self, qname: &str) -> Option<Arc<dyn XsdTypeLike>>;
    fn get_element(&self, qname: &str) -> Option<Arc<dyn XsdTypeLike>>;

    /// Whether the value is an instance of the named type.
    fn is_instance(&self, value: &XdmAtomicValue, type_qname: &str) -> Result<bool, Error>;

    /// Cast the value to the named type.
    fn cast_as(&self, value: &XdmAtomicValue, type_qname: &str) -> Result<XdmAtomicValue, Error>;

    /// Atomic type names (Clark notation) for constructor registration.
    fn iter_atomic_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// The primitive ancestor of a derived type, when known.
    fn get_primitive_type(&self, type_qname: &str) -> Option<String> {
        Some(type_qname.to_string())
    }
}

/// Host capability for XSD schema structures fed to the schema tree
/// builder. Traversal follows particle structure; elements declared by
/// reference report `ref_name` instead of their own content.
pub trait SchemaElementLike: Clone {
    /// Element name in Clark notation; `None` for wildcards.
    fn name(&self) -> Option<String>;
    /// XSD type annotation name.
    fn type_name(&self) -> Option<String>;
    /// Name of the referenced global element, for `ref=` declarations.
    fn ref_name(&self) -> Option<String>;
    fn particle_children(&self) -> Vec<Self>;
    fn attributes(&self) -> Vec<(String, String)>;
}
