//! Simple (per-field) query grammar.
//!
//! Every filterable leaf at path `p` accepts `p` (equality) and, depending on
//! its kind, `p_gt`, `p_lt`, `p_gte`, `p_lte`, `p_in` and `p_search`. Control
//! fields select paging and ordering. The validator is strict: unknown keys
//! are rejected.

use std::collections::HashMap;

use recordkit_security::{CompareOp, Comparison, FilterExpr};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce;
use crate::descriptor::{LeafKind, TypeNode};
use crate::error::{Issue, SchemaError, ValidationError};
use crate::loops::LoopGroups;
use crate::naming::validate_field_names;
use crate::query::QueryOptions;
use crate::query::advanced::AdvancedQueryValidator;
use crate::query::fields::{QueryField, query_fields};

const LIMIT: &str = "limit";
const CURSOR: &str = "cursor";
const SORT: &str = "sort";
const SORT_ORDER: &str = "sort_order";
const ADVANCED_QUERY: &str = "advanced_query";

/// Where query values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Query-string text; values are coerced, `_in` lists are comma-split.
    Server,
    /// Typed JSON values and arrays.
    Client,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "ascending" => Some(Self::Ascending),
            "descending" => Some(Self::Descending),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

/// A validated list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Input keys with coerced values, e.g. `{"name": "x", "age_gt": 5}`.
    pub normalized: Map<String, Value>,
    /// One clause per filter key.
    pub filters: Vec<FilterExpr>,
    pub limit: Option<u64>,
    pub cursor: Option<String>,
    pub sort: Option<String>,
    pub sort_order: SortOrder,
    pub advanced: Option<FilterExpr>,
}

impl ListQuery {
    /// Filter clauses plus the advanced expression, if any.
    pub fn clauses(&self) -> impl Iterator<Item = &FilterExpr> {
        self.filters.iter().chain(self.advanced.as_ref())
    }
}

#[derive(Debug, Clone)]
struct Param {
    field: QueryField,
    op: CompareOp,
}

/// Validator for flat query maps.
#[derive(Debug, Clone)]
pub struct SimpleQueryValidator {
    mode: QueryMode,
    params: HashMap<String, Param>,
    sortable: Vec<String>,
    advanced: AdvancedQueryValidator,
}

impl SimpleQueryValidator {
    /// # Errors
    /// Any naming or reference problem in `root`.
    pub fn compile(
        root: &TypeNode,
        mode: QueryMode,
        options: &QueryOptions,
    ) -> Result<Self, SchemaError> {
        validate_field_names(root)?;
        let groups = LoopGroups::detect(root)?;
        let fields = query_fields(root, &groups)?;
        Ok(Self::from_fields(&fields, mode, options))
    }

    pub(crate) fn from_fields(fields: &[QueryField], mode: QueryMode, options: &QueryOptions) -> Self {
        let mut params = HashMap::new();
        for field in fields {
            for op in operators(&field.kind) {
                params.insert(
                    param_name(&field.path, *op),
                    Param {
                        field: field.clone(),
                        op: *op,
                    },
                );
            }
        }
        let sortable = fields.iter().map(|f| f.path.clone()).collect();
        Self {
            mode,
            params,
            sortable,
            advanced: AdvancedQueryValidator::from_fields(fields, options),
        }
    }

    #[must_use]
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Accepted filter keys, sorted.
    #[must_use]
    pub fn parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.params.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Paths accepted by `sort`.
    #[must_use]
    pub fn sortable(&self) -> &[String] {
        &self.sortable
    }

    /// Validate a query map.
    ///
    /// # Errors
    /// Every problem found; unknown keys, bad values and `sort` combined
    /// with `cursor` are all reported together.
    pub fn validate(&self, input: &Map<String, Value>) -> Result<ListQuery, ValidationError> {
        let mut query = ListQuery::default();
        let mut issues = Vec::new();

        for (key, raw) in input {
            let normalized = match key.as_str() {
                LIMIT => self.limit(raw).map(|limit| {
                    query.limit = Some(limit);
                    Value::from(limit)
                }),
                CURSOR => cursor(raw).map(|cursor| {
                    query.cursor = Some(cursor.clone());
                    Value::String(cursor)
                }),
                SORT => match raw.as_str() {
                    Some(path) if self.sortable.iter().any(|s| s == path) => {
                        query.sort = Some(path.to_owned());
                        Ok(raw.clone())
                    }
                    _ => Err(format!("expected one of: {}", self.sortable.join(", "))),
                },
                SORT_ORDER => match raw.as_str().and_then(SortOrder::parse) {
                    Some(order) => {
                        query.sort_order = order;
                        Ok(raw.clone())
                    }
                    None => Err("expected `ascending` or `descending`".to_owned()),
                },
                ADVANCED_QUERY => self.advanced_query(raw).map(|parsed| {
                    query.advanced =
                        self.advanced.validate_at(&parsed, ADVANCED_QUERY, &mut issues);
                    parsed
                }),
                _ => match self.params.get(key) {
                    Some(param) => self.filter(param, raw).map(|value| {
                        query.filters.push(FilterExpr::Compare(Comparison::new(
                            param.field.path.clone(),
                            param.op,
                            value.clone(),
                        )));
                        value
                    }),
                    None => Err("unknown query parameter".to_owned()),
                },
            };
            match normalized {
                Ok(value) => {
                    query.normalized.insert(key.clone(), value);
                }
                Err(message) => issues.push(Issue::new(key.clone(), message)),
            }
        }

        if query.sort.is_some() && query.cursor.is_some() {
            issues.push(Issue::new(
                SORT,
                "`sort` cannot be combined with `cursor`",
            ));
        }
        ValidationError::check(issues)?;
        Ok(query)
    }

    fn limit(&self, raw: &Value) -> Result<u64, String> {
        let limit = match (self.mode, raw) {
            (_, Value::Number(n)) => n.as_u64(),
            (QueryMode::Server, Value::String(text)) => text.parse::<u64>().ok(),
            _ => None,
        };
        limit
            .filter(|limit| *limit >= 1)
            .ok_or_else(|| "expected an integer >= 1".to_owned())
    }

    fn advanced_query(&self, raw: &Value) -> Result<Value, String> {
        match (self.mode, raw) {
            (_, Value::Object(_)) => Ok(raw.clone()),
            (QueryMode::Server, Value::String(text)) => {
                serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))
            }
            _ => Err("expected an object".to_owned()),
        }
    }

    fn filter(&self, param: &Param, raw: &Value) -> Result<Value, String> {
        let kind = &param.field.kind;
        match param.op {
            CompareOp::In | CompareOp::Nin => {
                let items: Vec<Value> = match (self.mode, raw) {
                    (_, Value::Array(items)) => items.clone(),
                    (QueryMode::Server, Value::String(text)) => text
                        .split(',')
                        .map(|part| Value::String(part.to_owned()))
                        .collect(),
                    _ => return Err("expected an array".to_owned()),
                };
                if items.is_empty() {
                    return Err("expected at least one value".to_owned());
                }
                items
                    .iter()
                    .map(|item| self.scalar(kind, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            CompareOp::Search => match raw {
                Value::String(text) => Ok(Value::String(text.clone())),
                _ => Err("expected a string".to_owned()),
            },
            CompareOp::Eq
                if raw.is_null() && param.field.nullable && self.mode == QueryMode::Client =>
            {
                Ok(Value::Null)
            }
            CompareOp::Eq
            | CompareOp::Gt
            | CompareOp::Gte
            | CompareOp::Lt
            | CompareOp::Lte => self.scalar(kind, raw),
        }
    }

    fn scalar(&self, kind: &LeafKind, raw: &Value) -> Result<Value, String> {
        match self.mode {
            QueryMode::Server => coerce::lenient(kind, raw),
            QueryMode::Client => coerce::typed(kind, raw),
        }
    }
}

fn cursor(raw: &Value) -> Result<String, String> {
    match coerce::typed(&LeafKind::Identifier, raw) {
        Ok(Value::String(id)) => Ok(id),
        _ => Err(format!("expected {}", LeafKind::Identifier.describe())),
    }
}

/// Filter operators of a leaf kind in the simple grammar.
fn operators(kind: &LeafKind) -> &'static [CompareOp] {
    match kind {
        LeafKind::String => &[
            CompareOp::Eq,
            CompareOp::Gt,
            CompareOp::Lt,
            CompareOp::In,
            CompareOp::Search,
        ],
        LeafKind::Number | LeafKind::Date | LeafKind::Identifier => &[
            CompareOp::Eq,
            CompareOp::Gt,
            CompareOp::Lt,
            CompareOp::Gte,
            CompareOp::Lte,
            CompareOp::In,
        ],
        LeafKind::Enum(_) => &[CompareOp::Eq, CompareOp::In],
        LeafKind::Boolean | LeafKind::Any => &[CompareOp::Eq],
    }
}

fn param_name(path: &str, op: CompareOp) -> String {
    let suffix = match op {
        CompareOp::Eq => return path.to_owned(),
        CompareOp::Gt => "gt",
        CompareOp::Gte => "gte",
        CompareOp::Lt => "lt",
        CompareOp::Lte => "lte",
        CompareOp::In => "in",
        CompareOp::Nin => "nin",
        CompareOp::Search => "search",
    };
    format!("{path}_{suffix}")
}
