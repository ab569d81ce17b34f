//! Well-known namespace URIs.

/// The reserved `xml` prefix namespace. Cannot be rebound.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// XML Schema datatypes namespace (`xs` prefix).
pub const XSD_URI: &str = "http://www.w3.org/2001/XMLSchema";

/// XPath 2.0 function namespace (`fn` prefix), the default function namespace.
pub const FN_URI: &str = "http://www.w3.org/2005/xpath-functions";

/// Namespace of the W3C XPath/XQuery error codes (`err` prefix).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

/// XLink namespace, pre-bound by the XPath 2.0 parser.
pub const XLINK_URI: &str = "http://www.w3.org/1999/xlink";

/// Expanded name of the `xml:id` attribute.
pub const XML_ID: &str = "{http://www.w3.org/XML/1998/namespace}id";

/// Expanded name of the `xml:lang` attribute.
pub const XML_LANG: &str = "{http://www.w3.org/XML/1998/namespace}lang";
