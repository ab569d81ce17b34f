//! Host XML tree capabilities, plus a simple in-memory implementation.
//!
//! The engine is not an XML parser: it consumes an already-built tree
//! through the small capability traits below. `SimpleElement` /
//! `SimpleDocument` implement them for tests and quick prototypes, with an
//! ergonomic builder:
//!
//! ```
//! use treepath_xpath::host::{elem, text, ElementLike};
//!
//! // <root id="r"><child>Hello</child><child/></root>
//! let root = elem("root")
//!     .attr("id", "r")
//!     .child(elem("child").child(text("Hello")))
//!     .child(elem("child"))
//!     .build();
//! assert_eq!(root.tag(), "root");
//! ```

use std::rc::Rc;

/// A non-element child of a host element or document.
#[derive(Debug, Clone)]
pub enum HostChild<E> {
    Element(E),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

/// Element capability: the tree builders read elements exclusively through
/// this interface. Tag and attribute names may use Clark notation
/// (`{uri}local`); `tail` is only reported by lxml-like hosts.
pub trait ElementLike: Clone {
    fn tag(&self) -> String;
    fn text(&self) -> Option<String>;
    fn tail(&self) -> Option<String> {
        None
    }
    fn attributes(&self) -> Vec<(String, String)>;
    /// Namespace declarations on this element (prefix, uri); empty prefix
    /// for the default namespace.
    fn namespace_declarations(&self) -> Vec<(String, String)> {
        Vec::new()
    }
    fn children(&self) -> Vec<HostChild<Self>>;
    /// Children paired with their trailing text. Hosts without a tail
    /// concept inherit this default and report none.
    fn children_with_tails(&self) -> Vec<(HostChild<Self>, Option<String>)> {
        self.children().into_iter().map(|c| (c, None)).collect()
    }
}

/// Document capability: a root element plus lxml-style top-level comments
/// and processing instructions around it.
pub trait DocumentLike: Clone {
    type Element: ElementLike;

    fn root_element(&self) -> Option<Self::Element>;
    /// Comments/PIs before the root element.
    fn prolog(&self) -> Vec<HostChild<Self::Element>> {
        Vec::new()
    }
    /// Comments/PIs after the root element.
    fn epilog(&self) -> Vec<HostChild<Self::Element>> {
        Vec::new()
    }
}

#[derive(Debug)]
enum SimpleChild {
    Element(SimpleElement),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug)]
struct SimpleInner {
    tag: String,
    attributes: Vec<(String, String)>,
    namespaces: Vec<(String, String)>,
    children: Vec<SimpleChild>,
}

/// A reference-counted in-memory element. Cheap to clone; identity is by
/// reference.
#[derive(Debug, Clone)]
pub struct SimpleElement(Rc<SimpleInner>);

impl PartialEq for SimpleElement {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SimpleElement {}

impl ElementLike for SimpleElement {
    fn tag(&self) -> String {
        self.0.tag.clone()
    }

    fn text(&self) -> Option<String> {
        // Leading text child, ElementTree-style.
        match self.0.children.first() {
            Some(SimpleChild::Text(t)) => Some(t.clone()),
            _ => None,
        }
    }

    fn attributes(&self) -> Vec<(String, String)> {
        self.0.attributes.clone()
    }

    fn namespace_declarations(&self) -> Vec<(String, String)> {
        self.0.namespaces.clone()
    }

    fn children(&self) -> Vec<HostChild<Self>> {
        let mut out = Vec::new();
        for child in &self.0.children {
            match child {
                SimpleChild::Element(e) => out.push(HostChild::Element(e.clone())),
                SimpleChild::Comment(c) => out.push(HostChild::Comment(c.clone())),
                SimpleChild::ProcessingInstruction { target, data } => {
                    out.push(HostChild::ProcessingInstruction {
                        target: target.clone(),
                        data: data.clone(),
                    })
                }
                SimpleChild::Text(_) => {}
            }
        }
        out
    }

    fn children_with_tails(&self) -> Vec<(HostChild<Self>, Option<String>)> {
        self.children()
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, self.tail_of(i)))
            .collect()
    }
}

impl SimpleElement {
    /// Trailing text after the child at `index`, exposed as that child's
    /// tail (lxml model).
    fn tail_of(&self, index: usize) -> Option<String> {
        let mut seen = 0usize;
        let mut found = false;
        for child in &self.0.children {
            match child {
                SimpleChild::Text(t) if found => return Some(t.clone()),
                SimpleChild::Text(_) => {}
                _ => {
                    if found {
                        return None;
                    }
                    if seen == index {
                        found = true;
                    }
                    seen += 1;
                }
            }
        }
        None
    }

}

/// A document wrapper over a `SimpleElement` root.
#[derive(Debug, Clone)]
pub struct SimpleDocument {
    root: Option<SimpleElement>,
    prolog: Vec<HostChild<SimpleElement>>,
    epilog: Vec<HostChild<SimpleElement>>,
}

impl DocumentLike for SimpleDocument {
    type Element = SimpleElement;

    fn root_element(&self) -> Option<SimpleElement> {
        self.root.clone()
    }

    fn prolog(&self) -> Vec<HostChild<SimpleElement>> {
        self.prolog.clone()
    }

    fn epilog(&self) -> Vec<HostChild<SimpleElement>> {
        self.epilog.clone()
    }
}

/// Builder for `SimpleElement` trees.
pub struct SimpleElementBuilder {
    tag: String,
    attributes: Vec<(String, String)>,
    namespaces: Vec<(String, String)>,
    children: Vec<SimpleChild>,
}

impl SimpleElementBuilder {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
        self
    }

    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        match child.into() {
            SimpleNodeOrBuilder::Built(c) => self.children.push(c),
            SimpleNodeOrBuilder::Builder(b) => self.children.push(SimpleChild::Element(b.build())),
        }
        self
    }

    pub fn build(self) -> SimpleElement {
        SimpleElement(Rc::new(SimpleInner {
            tag: self.tag,
            attributes: self.attributes,
            namespaces: self.namespaces,
            children: self.children,
        }))
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleChild),
    Builder(SimpleElementBuilder),
}

impl From<SimpleElementBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleElementBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

impl From<SimpleElement> for SimpleNodeOrBuilder {
    fn from(e: SimpleElement) -> Self {
        SimpleNodeOrBuilder::Built(SimpleChild::Element(e))
    }
}

/// Builder for documents with optional prolog/epilog comments and PIs.
pub struct SimpleDocumentBuilder {
    parts: Vec<SimpleNodeOrBuilder>,
}

impl SimpleDocumentBuilder {
    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.parts.push(child.into());
        self
    }

    pub fn build(self) -> SimpleDocument {
        let mut root = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        for part in self.parts {
            let child = match part {
                SimpleNodeOrBuilder::Built(c) => c,
                SimpleNodeOrBuilder::Builder(b) => SimpleChild::Element(b.build()),
            };
            match child {
                SimpleChild::Element(e) => {
                    root = Some(e);
                }
                SimpleChild::Comment(c) => {
                    let item = HostChild::Comment(c);
                    if root.is_none() {
                        prolog.push(item)
                    } else {
                        epilog.push(item)
                    }
                }
                SimpleChild::ProcessingInstruction { target, data } => {
                    let item = HostChild::ProcessingInstruction { target, data };
                    if root.is_none() {
                        prolog.push(item)
                    } else {
                        epilog.push(item)
                    }
                }
                SimpleChild::Text(_) => {}
            }
        }
        SimpleDocument {
            root,
            prolog,
            epilog,
        }
    }
}

// Concise helpers for test trees.

pub fn elem(tag: &str) -> SimpleElementBuilder {
    SimpleElementBuilder {
        tag: tag.to_string(),
        attributes: Vec::new(),
        namespaces: Vec::new(),
        children: Vec::new(),
    }
}

pub fn text(value: &str) -> SimpleNodeOrBuilder {
    SimpleNodeOrBuilder::Built(SimpleChild::Text(value.to_string()))
}

pub fn comment(value: &str) -> SimpleNodeOrBuilder {
    SimpleNodeOrBuilder::Built(SimpleChild::Comment(value.to_string()))
}

pub fn pi(target: &str, data: &str) -> SimpleNodeOrBuilder {
    SimpleNodeOrBuilder::Built(SimpleChild::ProcessingInstruction {
        target: target.to_string(),
        data: data.to_string(),
    })
}

pub fn doc() -> SimpleDocumentBuilder {
    SimpleDocumentBuilder { parts: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_text_and_tails() {
        // <r>head<a/>mid<b/>tail</r>
        let r = elem("r")
            .child(text("head"))
            .child(elem("a"))
            .child(text("mid"))
            .child(elem("b"))
            .child(text("tail"))
            .build();
        assert_eq!(r.text().as_deref(), Some("head"));
        let with_tails = r.children_with_tails();
        assert_eq!(with_tails.len(), 2);
        assert_eq!(with_tails[0].1.as_deref(), Some("mid"));
        assert_eq!(with_tails[1].1.as_deref(), Some("tail"));
    }
}
