//! SQL text with its bound parameters.
//!
//! Placeholders are anonymous `?`s, so parameters are bound positionally in the
//! order they were pushed. Fragments are only ever combined by appending their
//! text in the same order as their parameters.

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values, in placeholder order.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }

    /// Creates a float parameter.
    pub fn float(f: f64) -> Self {
        SqlParam::Float(f)
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlParam::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlParam::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlParam::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl SqlFragment {
    /// Creates a fragment without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A predicate that always holds.
    pub fn always() -> Self {
        Self::new("1")
    }

    /// A predicate that never holds.
    pub fn never() -> Self {
        Self::new("0")
    }

    /// Appends raw SQL.
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends a placeholder bound to `param`.
    pub fn push_param(&mut self, param: SqlParam) -> &mut Self {
        self.sql.push('?');
        self.params.push(param);
        self
    }

    /// Appends `(?, ?, ...)` bound to `params`.
    pub fn push_list(&mut self, params: impl IntoIterator<Item = SqlParam>) -> &mut Self {
        self.sql.push('(');
        for (i, param) in params.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_param(param);
        }
        self.sql.push(')');
        self
    }

    /// Appends another fragment's text and parameters.
    pub fn push_fragment(&mut self, other: SqlFragment) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
        self
    }

    /// Joins predicates with `AND`. No predicates gives [`always`](Self::always).
    pub fn all(parts: Vec<SqlFragment>) -> Self {
        Self::join(parts, " AND ").unwrap_or_else(Self::always)
    }

    /// Joins predicates with `OR`. No predicates gives [`never`](Self::never).
    pub fn any(parts: Vec<SqlFragment>) -> Self {
        Self::join(parts, " OR ").unwrap_or_else(Self::never)
    }

    fn join(parts: Vec<SqlFragment>, separator: &str) -> Option<Self> {
        if parts.len() == 1 {
            return parts.into_iter().next();
        }
        if parts.is_empty() {
            return None;
        }
        let mut joined = SqlFragment::new("");
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                joined.push_sql(separator);
            }
            joined.push_sql("(");
            joined.push_fragment(part);
            joined.push_sql(")");
        }
        Some(joined)
    }

    /// `NOT (self)`.
    pub fn negate(self) -> Self {
        let mut negated = SqlFragment::new("NOT (");
        negated.push_fragment(self);
        negated.push_sql(")");
        negated
    }

    /// Combines with another fragment using AND.
    pub fn and(self, other: SqlFragment) -> Self {
        Self::all(vec![self, other])
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}
