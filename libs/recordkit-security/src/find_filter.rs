use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known filter keys.
///
/// Shared between the route compiler (seeding), the security models
/// (narrowing) and the persistence engine (execution).
pub mod filter_keys {
    /// Record identity key.
    pub const RECORD_ID: &str = "id";

    /// Default owner key used by the ownership model.
    pub const OWNER_ID: &str = "user_id";

    /// Key under which a record stores the id of its ancestor `layer`.
    #[must_use]
    pub fn layer_key(layer: &str) -> String {
        format!("{layer}_id")
    }
}

/// Comparison operator of a single filter predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `path = value` (for array fields: any element equals).
    Eq,
    /// `path > value`
    Gt,
    /// `path >= value`
    Gte,
    /// `path < value`
    Lt,
    /// `path <= value`
    Lte,
    /// `path IN (values)`
    In,
    /// `path NOT IN (values)`
    Nin,
    /// Case-insensitive substring match.
    Search,
}

impl CompareOp {
    /// Operator name as used in advanced queries (`$gt`, `$in`, ...).
    #[must_use]
    pub fn as_operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Search => "$search",
        }
    }

    /// Parse an advanced-query operator name.
    #[must_use]
    pub fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "$eq" => Self::Eq,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$search" => Self::Search,
            _ => return None,
        })
    }

    /// Whether the operand is a list of values.
    #[must_use]
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_operator())
    }
}

/// A typed predicate on a dotted record path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    path: String,
    op: CompareOp,
    value: Value,
}

impl Comparison {
    #[must_use]
    pub fn new(path: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(path, CompareOp::Eq, value)
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    #[must_use]
    pub fn op(&self) -> CompareOp {
        self.op
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Boolean composition of comparisons.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    Compare(Comparison),
    /// All sub-expressions must match. An empty `And` matches everything.
    And(Vec<FilterExpr>),
    /// Any sub-expression must match. An empty `Or` matches nothing.
    Or(Vec<FilterExpr>),
}

impl From<Comparison> for FilterExpr {
    fn from(c: Comparison) -> Self {
        Self::Compare(c)
    }
}

/// The accumulating set of constraints applied to a persistence query.
///
/// Clauses are AND-ed. Seeded from ancestor layer ids, narrowed by the
/// winning security model, extended by request filters.
///
/// # Examples
///
/// ```
/// use recordkit_security::{FindFilter, filter_keys};
/// use serde_json::json;
///
/// let mut filter = FindFilter::new();
/// filter.set_eq(filter_keys::layer_key("institution"), json!("i-1"));
/// filter.set_eq("user_id", json!("u-1"));
/// filter.set_eq("user_id", json!("u-2"));
///
/// assert_eq!(filter.eq_value("user_id"), Some(&json!("u-2")));
/// assert_eq!(filter.clauses().len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FindFilter {
    clauses: Vec<FilterExpr>,
}

impl FindFilter {
    /// Empty filter (matches every record).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a filter with `{"<layer>_id": id}` for each ancestor layer.
    #[must_use]
    pub fn for_layers<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = Self::new();
        for (layer, id) in layers {
            filter.set_eq(filter_keys::layer_key(layer), Value::String(id.to_owned()));
        }
        filter
    }

    /// Set `path = value`, replacing any top-level equality on the same path.
    pub fn set_eq(&mut self, path: impl Into<String>, value: Value) {
        let path = path.into();
        self.clauses.retain(|clause| {
            !matches!(clause, FilterExpr::Compare(c) if c.op == CompareOp::Eq && c.path == path)
        });
        self.clauses
            .push(FilterExpr::Compare(Comparison::eq(path, value)));
    }

    /// Append a clause (AND).
    pub fn push(&mut self, expr: impl Into<FilterExpr>) {
        self.clauses.push(expr.into());
    }

    /// Value of the top-level equality on `path`, if any.
    #[must_use]
    pub fn eq_value(&self, path: &str) -> Option<&Value> {
        self.clauses.iter().find_map(|clause| match clause {
            FilterExpr::Compare(c) if c.op == CompareOp::Eq && c.path == path => Some(&c.value),
            _ => None,
        })
    }

    /// Returns `true` if any top-level clause references `path`.
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.clauses
            .iter()
            .any(|clause| matches!(clause, FilterExpr::Compare(c) if c.path == path))
    }

    /// The AND-ed clauses.
    #[inline]
    #[must_use]
    pub fn clauses(&self) -> &[FilterExpr] {
        &self.clauses
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Extend<FilterExpr> for FindFilter {
    fn extend<T: IntoIterator<Item = FilterExpr>>(&mut self, iter: T) {
        self.clauses.extend(iter);
    }
}
