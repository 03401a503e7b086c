//! Typed search values extracted from resources.
//!
//! Each variant wraps a dedicated struct so that a [`SearchValueVisitor`] gets a
//! strongly typed argument per variant.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A typed, immutable search value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SearchValue {
    /// Ordered components, each holding one or more non-composite values.
    Composite(CompositeSearchValue),
    /// A date/time range.
    DateTime(DateTimeSearchValue),
    /// A number or number range.
    Number(NumberSearchValue),
    /// A quantity with optional unit system and code.
    Quantity(QuantitySearchValue),
    /// A reference to another resource.
    Reference(ReferenceSearchValue),
    /// A plain string.
    String(StringSearchValue),
    /// A coded value.
    Token(TokenSearchValue),
    /// A URI.
    Uri(UriSearchValue),
}

/// Visitor over [`SearchValue`] variants.
///
/// [`SearchValue::accept`] calls exactly one method per value.
pub trait SearchValueVisitor {
    /// Visits a composite value.
    fn visit_composite(&mut self, value: &CompositeSearchValue);
    /// Visits a date/time value.
    fn visit_date_time(&mut self, value: &DateTimeSearchValue);
    /// Visits a number value.
    fn visit_number(&mut self, value: &NumberSearchValue);
    /// Visits a quantity value.
    fn visit_quantity(&mut self, value: &QuantitySearchValue);
    /// Visits a reference value.
    fn visit_reference(&mut self, value: &ReferenceSearchValue);
    /// Visits a string value.
    fn visit_string(&mut self, value: &StringSearchValue);
    /// Visits a token value.
    fn visit_token(&mut self, value: &TokenSearchValue);
    /// Visits a URI value.
    fn visit_uri(&mut self, value: &UriSearchValue);
}

impl SearchValue {
    /// Dispatches to the visitor method matching this variant.
    pub fn accept<V: SearchValueVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            SearchValue::Composite(v) => visitor.visit_composite(v),
            SearchValue::DateTime(v) => visitor.visit_date_time(v),
            SearchValue::Number(v) => visitor.visit_number(v),
            SearchValue::Quantity(v) => visitor.visit_quantity(v),
            SearchValue::Reference(v) => visitor.visit_reference(v),
            SearchValue::String(v) => visitor.visit_string(v),
            SearchValue::Token(v) => visitor.visit_token(v),
            SearchValue::Uri(v) => visitor.visit_uri(v),
        }
    }

    /// Creates a string value.
    pub fn string(text: impl Into<String>) -> Self {
        SearchValue::String(StringSearchValue { text: text.into() })
    }

    /// Creates a token value.
    pub fn token(system: Option<&str>, code: Option<&str>, text: Option<&str>) -> Self {
        SearchValue::Token(TokenSearchValue {
            system: system.map(String::from),
            code: code.map(String::from),
            text: text.map(String::from),
        })
    }

    /// Creates a URI value.
    pub fn uri(value: impl Into<String>) -> Self {
        SearchValue::Uri(UriSearchValue {
            value: value.into(),
        })
    }

    /// Creates a single-point number value.
    pub fn number(value: Decimal) -> Self {
        SearchValue::Number(NumberSearchValue {
            low: Some(value),
            high: Some(value),
        })
    }

    /// Creates a number range; either bound may be open.
    pub fn number_range(low: Option<Decimal>, high: Option<Decimal>) -> Self {
        SearchValue::Number(NumberSearchValue { low, high })
    }

    /// Creates a single-point quantity.
    pub fn quantity(system: Option<&str>, code: Option<&str>, value: Decimal) -> Self {
        SearchValue::Quantity(QuantitySearchValue {
            system: system.map(String::from),
            code: code.map(String::from),
            low: Some(value),
            high: Some(value),
        })
    }

    /// Creates a date/time range.
    pub fn date_time(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        SearchValue::DateTime(DateTimeSearchValue { start, end })
    }

    /// Creates an internal reference with a known resource type.
    pub fn reference(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        SearchValue::Reference(ReferenceSearchValue {
            kind: ReferenceKind::Internal,
            base_uri: None,
            resource_type: Some(resource_type.into()),
            resource_id: resource_id.into(),
        })
    }

    /// Creates a composite value from its components.
    pub fn composite(components: Vec<Vec<SearchValue>>) -> Self {
        SearchValue::Composite(CompositeSearchValue { components })
    }

    /// Returns the reference payload if this is a reference.
    pub fn as_reference(&self) -> Option<&ReferenceSearchValue> {
        match self {
            SearchValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Returns a short name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            SearchValue::Composite(_) => "composite",
            SearchValue::DateTime(_) => "dateTime",
            SearchValue::Number(_) => "number",
            SearchValue::Quantity(_) => "quantity",
            SearchValue::Reference(_) => "reference",
            SearchValue::String(_) => "string",
            SearchValue::Token(_) => "token",
            SearchValue::Uri(_) => "uri",
        }
    }
}

/// A composite value; component `i` holds the values of the `i`-th component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSearchValue {
    /// Ordered components.
    pub components: Vec<Vec<SearchValue>>,
}

/// A date/time range, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeSearchValue {
    /// Start of the range.
    pub start: DateTime<Utc>,
    /// End of the range.
    pub end: DateTime<Utc>,
}

/// A number, or a range when the bounds differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberSearchValue {
    /// Lower bound.
    pub low: Option<Decimal>,
    /// Upper bound.
    pub high: Option<Decimal>,
}

/// A quantity, or a quantity range when the bounds differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySearchValue {
    /// Unit system URI.
    pub system: Option<String>,
    /// Unit code.
    pub code: Option<String>,
    /// Lower bound.
    pub low: Option<Decimal>,
    /// Upper bound.
    pub high: Option<Decimal>,
}

/// How a reference was written in the source resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKind {
    /// Relative reference to a resource on this server.
    Internal,
    /// Absolute reference to another server.
    External,
    /// Could be either; the base URI was not conclusive.
    InternalOrExternal,
}

/// A reference to another resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSearchValue {
    /// Reference kind.
    pub kind: ReferenceKind,
    /// Base URI for absolute references.
    pub base_uri: Option<String>,
    /// Target type, `None` when it could not be determined.
    pub resource_type: Option<String>,
    /// Target id.
    pub resource_id: String,
}

/// A string value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringSearchValue {
    /// The text.
    pub text: String,
}

/// A coded value. Any part may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSearchValue {
    /// Code system URI.
    pub system: Option<String>,
    /// Code.
    pub code: Option<String>,
    /// Display text.
    pub text: Option<String>,
}

/// A URI value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UriSearchValue {
    /// The URI.
    pub value: String,
}

impl fmt::Display for SearchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchValue::Composite(c) => {
                let parts: Vec<String> = c
                    .components
                    .iter()
                    .map(|values| {
                        values
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .collect();
                write!(f, "{}", parts.join("$"))
            }
            SearchValue::DateTime(d) => {
                write!(f, "{}..{}", d.start.to_rfc3339(), d.end.to_rfc3339())
            }
            SearchValue::Number(n) => write_range(f, n.low, n.high),
            SearchValue::Quantity(q) => {
                write_range(f, q.low, q.high)?;
                write!(
                    f,
                    "|{}|{}",
                    q.system.as_deref().unwrap_or(""),
                    q.code.as_deref().unwrap_or("")
                )
            }
            SearchValue::Reference(r) => match &r.resource_type {
                Some(t) => write!(f, "{}/{}", t, r.resource_id),
                None => write!(f, "{}", r.resource_id),
            },
            SearchValue::String(s) => write!(f, "{}", s.text),
            SearchValue::Token(t) => write!(
                f,
                "{}|{}",
                t.system.as_deref().unwrap_or(""),
                t.code.as_deref().unwrap_or("")
            ),
            SearchValue::Uri(u) => write!(f, "{}", u.value),
        }
    }
}

fn write_range(
    f: &mut fmt::Formatter<'_>,
    low: Option<Decimal>,
    high: Option<Decimal>,
) -> fmt::Result {
    match (low, high) {
        (Some(l), Some(h)) if l == h => write!(f, "{}", l),
        (l, h) => write!(
            f,
            "{}..{}",
            l.map(|v| v.to_string()).unwrap_or_default(),
            h.map(|v| v.to_string()).unwrap_or_default()
        ),
    }
}
