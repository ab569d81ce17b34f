//! XDM items, sequences and the atomic value universe.
//!
//! The atomic set covers the types the engine itself manipulates: numerics
//! (integer/decimal/double with the 2.0 promotion ladder), strings and
//! string-like types, QNames, and the chrono-backed date/time and duration
//! values used by the dynamic context. Schema-defined subtypes beyond these
//! are reached through the `SchemaProxy` collaborator.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

use crate::nodes::NodeId;

/// A namespace-qualified name in expanded form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self {
            ns_uri,
            local: local.into(),
        }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }

    /// Parse Clark notation (`{uri}local`), falling back to a plain local name.
    pub fn from_clark(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix('{')
            && let Some((uri, local)) = rest.split_once('}')
        {
            return Self::new(Some(uri.to_string()), local);
        }
        Self::local(name)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(uri) => write!(f, "{{{}}}{}", uri, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// A lexical QName with its resolved namespace, as carried by nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: name.into(),
            ns_uri: None,
        }
    }

    pub fn expanded(&self) -> ExpandedName {
        ExpandedName::new(self.ns_uri.clone(), self.local.clone())
    }

    /// The lexical form, `prefix:local` or `local`.
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

/// Atomic values of the XDM subset handled natively.
///
/// Numeric subtypes are stored distinctly so instance-of checks stay precise
/// without lossy coercion. Durations are kept in their two 2.0 subtypes
/// (months / milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Decimal(f64),
    Double(f64),
    AnyUri(String),
    UntypedAtomic(String),
    QName {
        prefix: Option<String>,
        ns_uri: Option<String>,
        local: String,
    },
    DateTime(DateTime<FixedOffset>),
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    Time {
        time: NaiveTime,
        tz: Option<FixedOffset>,
    },
    /// xs:yearMonthDuration, in months.
    YearMonthDuration(i32),
    /// xs:dayTimeDuration, in milliseconds.
    DayTimeDuration(i64),
}

impl XdmAtomicValue {
    pub fn untyped(value: impl Into<String>) -> Self {
        XdmAtomicValue::UntypedAtomic(value.into())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            XdmAtomicValue::Integer(_) | XdmAtomicValue::Decimal(_) | XdmAtomicValue::Double(_)
        )
    }

    /// Numeric payload as a double, for promotion and comparisons.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            XdmAtomicValue::Integer(i) => Some(*i as f64),
            XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// The string value, as computed by fn:string() on an atomic item.
    pub fn string_value(&self) -> String {
        match self {
            XdmAtomicValue::Boolean(b) => {
                if *b {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            XdmAtomicValue::String(s)
            | XdmAtomicValue::AnyUri(s)
            | XdmAtomicValue::UntypedAtomic(s) => s.clone(),
            XdmAtomicValue::Integer(i) => i.to_string(),
            XdmAtomicValue::Decimal(d) => format_decimal(*d),
            XdmAtomicValue::Double(d) => format_double(*d),
            XdmAtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) => format!("{p}:{local}"),
                None => local.clone(),
            },
            XdmAtomicValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            XdmAtomicValue::Date { date, tz } => match tz {
                Some(tz) => format!("{}{}", date.format("%Y-%m-%d"), format_tz(*tz)),
                None => date.format("%Y-%m-%d").to_string(),
            },
            XdmAtomicValue::Time { time, tz } => match tz {
                Some(tz) => format!("{}{}", time.format("%H:%M:%S"), format_tz(*tz)),
                None => time.format("%H:%M:%S").to_string(),
            },
            XdmAtomicValue::YearMonthDuration(months) => format_year_month_duration(*months),
            XdmAtomicValue::DayTimeDuration(millis) => format_day_time_duration(*millis),
        }
    }

    /// The numeric value, as computed by fn:number(): NaN on failure.
    pub fn number_value(&self) -> f64 {
        match self {
            XdmAtomicValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XdmAtomicValue::Integer(i) => *i as f64,
            XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => *d,
            XdmAtomicValue::String(s)
            | XdmAtomicValue::AnyUri(s)
            | XdmAtomicValue::UntypedAtomic(s) => parse_double(s).unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Local name of the value's type in the `xs` namespace.
    pub fn type_local_name(&self) -> &'static str {
        match self {
            XdmAtomicValue::Boolean(_) => "boolean",
            XdmAtomicValue::String(_) => "string",
            XdmAtomicValue::Integer(_) => "integer",
            XdmAtomicValue::Decimal(_) => "decimal",
            XdmAtomicValue::Double(_) => "double",
            XdmAtomicValue::AnyUri(_) => "anyURI",
            XdmAtomicValue::UntypedAtomic(_) => "untypedAtomic",
            XdmAtomicValue::QName { .. } => "QName",
            XdmAtomicValue::DateTime(_) => "dateTime",
            XdmAtomicValue::Date { .. } => "date",
            XdmAtomicValue::Time { .. } => "time",
            XdmAtomicValue::YearMonthDuration(_) => "yearMonthDuration",
            XdmAtomicValue::DayTimeDuration(_) => "dayTimeDuration",
        }
    }
}

/// One item of a sequence: a node of the arena or an atomic value.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem {
    Node(NodeId),
    Atomic(XdmAtomicValue),
}

impl XdmItem {
    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            XdmItem::Node(id) => Some(*id),
            XdmItem::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&XdmAtomicValue> {
        match self {
            XdmItem::Atomic(v) => Some(v),
            XdmItem::Node(_) => None,
        }
    }
}

impl From<XdmAtomicValue> for XdmItem {
    fn from(v: XdmAtomicValue) -> Self {
        XdmItem::Atomic(v)
    }
}

impl From<NodeId> for XdmItem {
    fn from(id: NodeId) -> Self {
        XdmItem::Node(id)
    }
}

pub type XdmSequence = Vec<XdmItem>;

/// xs:double lexical parsing: leading/trailing whitespace allowed, `INF`
/// spellings of the XSD lexical space.
pub fn parse_double(s: &str) -> Option<f64> {
    let t = s.trim();
    match t {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => {
            // Rust accepts forms like "inf" and "nan" that XSD does not.
            if t.is_empty() || t.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) {
                return None;
            }
            t.parse::<f64>().ok()
        }
    }
}

/// Canonical-ish xs:double string form: `NaN`, `INF`, integers without a
/// fractional part, exponent in upper case.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if value == value.trunc() && value.abs() < 1e18 {
        return format!("{}", value as i64);
    }
    let mut out = format!("{value}");
    if let Some(idx) = out.find('e') {
        out.replace_range(idx..idx + 1, "E");
    }
    out
}

/// xs:decimal string form: trailing zeros trimmed, no exponent.
pub fn format_decimal(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e18 {
        return format!("{}", value as i64);
    }
    let s = format!("{value:.12}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn format_tz(tz: FixedOffset) -> String {
    let secs = tz.local_minus_utc();
    if secs == 0 {
        return "Z".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

fn format_year_month_duration(months: i32) -> String {
    if months == 0 {
        return "P0M".to_string();
    }
    let sign = if months < 0 { "-" } else { "" };
    let abs = months.unsigned_abs();
    let years = abs / 12;
    let rem = abs % 12;
    let mut out = format!("{sign}P");
    if years > 0 {
        out.push_str(&format!("{years}Y"));
    }
    if rem > 0 || years == 0 {
        out.push_str(&format!("{rem}M"));
    }
    out
}

fn format_day_time_duration(millis: i64) -> String {
    if millis == 0 {
        return "PT0S".to_string();
    }
    let sign = if millis < 0 { "-" } else { "" };
    let mut abs = millis.unsigned_abs();
    let days = abs / 86_400_000;
    abs %= 86_400_000;
    let hours = abs / 3_600_000;
    abs %= 3_600_000;
    let minutes = abs / 60_000;
    abs %= 60_000;
    let seconds = abs / 1000;
    let frac = abs % 1000;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || frac > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || frac > 0 {
            if frac > 0 {
                let f = format!("{frac:03}");
                out.push_str(&format!("{seconds}.{}S", f.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{seconds}S"));
            }
        }
    }
    out
}

/// Parse a duration literal into one of the two 2.0 subtypes.
pub fn parse_day_time_duration(text: &str) -> Option<i64> {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(r) => (-1i64, r),
        None => (1i64, text),
    };
    let rest = rest.strip_prefix('P')?;
    let (day_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };
    let mut millis: i64 = 0;
    if !day_part.is_empty() {
        let days = day_part.strip_suffix('D')?.parse::<i64>().ok()?;
        millis += days.checked_mul(86_400_000)?;
    }
    if let Some(tp) = time_part {
        if tp.is_empty() {
            return None;
        }
        let mut rest = tp;
        if let Some(idx) = rest.find('H') {
            let h = rest[..idx].parse::<i64>().ok()?;
            millis += h.checked_mul(3_600_000)?;
            rest = &rest[idx + 1..];
        }
        if let Some(idx) = rest.find('M') {
            let m = rest[..idx].parse::<i64>().ok()?;
            millis += m.checked_mul(60_000)?;
            rest = &rest[idx + 1..];
        }
        if let Some(idx) = rest.find('S') {
            let s = rest[..idx].parse::<f64>().ok()?;
            millis += (s * 1000.0).round() as i64;
            rest = &rest[idx + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    } else if day_part.is_empty() {
        return None;
    }
    Some(sign * millis)
}

pub fn parse_year_month_duration(text: &str) -> Option<i32> {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(r) => (-1i32, r),
        None => (1i32, text),
    };
    let rest = rest.strip_prefix('P')?;
    if rest.is_empty() || rest.contains('T') {
        return None;
    }
    let mut months: i32 = 0;
    let mut rest = rest;
    if let Some(idx) = rest.find('Y') {
        let y = rest[..idx].parse::<i32>().ok()?;
        months = months.checked_add(y.checked_mul(12)?)?;
        rest = &rest[idx + 1..];
    }
    if let Some(idx) = rest.find('M') {
        let m = rest[..idx].parse::<i32>().ok()?;
        months = months.checked_add(m)?;
        rest = &rest[idx + 1..];
    }
    if !rest.is_empty() {
        return None;
    }
    Some(sign * months)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_formatting() {
        assert_eq!(format_double(3.0), "3");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::INFINITY), "INF");
        assert_eq!(format_double(-0.5), "-0.5");
    }

    #[test]
    fn double_parsing_rejects_rust_only_forms() {
        assert_eq!(parse_double("INF"), Some(f64::INFINITY));
        assert!(parse_double("inf").is_none());
        assert!(parse_double("nan").is_none());
        assert_eq!(parse_double(" 1e3 "), Some(1000.0));
    }

    #[test]
    fn duration_round_trip() {
        let millis = parse_day_time_duration("P1DT2H30M").unwrap();
        assert_eq!(millis, 95_400_000);
        assert_eq!(format_day_time_duration(millis), "P1DT2H30M");
        assert_eq!(parse_year_month_duration("-P1Y2M"), Some(-14));
    }
}
