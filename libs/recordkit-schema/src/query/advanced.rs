//! Advanced (boolean tree) query grammar.
//!
//! ```text
//! Root   := { "$and": [Node, ..] } | { "$or": [Node, ..] }
//! Node   := { "$and": [Node, ..] } | { "$or": [Node, ..] } | Fields
//! Fields := { <path>: { <op>: <value> }, .. }
//! ```
//!
//! The grammar is stored as a rule table. Clause rules name the rule of their
//! items by id and the id is looked up when a query is validated, so the
//! recursive `Node` rule is never materialized as a recursive structure.

use std::collections::HashMap;

use recordkit_security::{CompareOp, Comparison, FilterExpr};
use serde_json::{Map, Value};

use crate::coerce;
use crate::descriptor::{LeafKind, TypeNode};
use crate::error::{Issue, SchemaError, ValidationError, join_path};
use crate::loops::LoopGroups;
use crate::naming::validate_field_names;
use crate::query::QueryOptions;
use crate::query::fields::{QueryField, query_fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RuleId {
    Root,
    Node,
    And,
    Or,
    Fields,
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    All,
    Any,
}

#[derive(Debug, Clone, Copy)]
struct ClauseRule {
    key: &'static str,
    item: RuleId,
    combine: Combine,
}

#[derive(Debug, Clone)]
enum Rule {
    /// The first alternative whose shape matches.
    OneOf(Vec<RuleId>),
    /// `{ key: [item, ..] }`, non-empty.
    Clause(ClauseRule),
    /// Implicit conjunction of field conditions.
    Fields,
}

fn grammar() -> HashMap<RuleId, Rule> {
    HashMap::from([
        (RuleId::Root, Rule::OneOf(vec![RuleId::And, RuleId::Or])),
        (
            RuleId::Node,
            Rule::OneOf(vec![RuleId::And, RuleId::Or, RuleId::Fields]),
        ),
        (
            RuleId::And,
            Rule::Clause(ClauseRule {
                key: "$and",
                item: RuleId::Node,
                combine: Combine::All,
            }),
        ),
        (
            RuleId::Or,
            Rule::Clause(ClauseRule {
                key: "$or",
                item: RuleId::Node,
                combine: Combine::Any,
            }),
        ),
        (RuleId::Fields, Rule::Fields),
    ])
}

/// Validator for `$and`/`$or` filter trees.
#[derive(Debug, Clone)]
pub struct AdvancedQueryValidator {
    rules: HashMap<RuleId, Rule>,
    fields: HashMap<String, QueryField>,
    max_depth: usize,
}

impl AdvancedQueryValidator {
    /// # Errors
    /// Any naming or reference problem in `root`.
    pub fn compile(root: &TypeNode, options: &QueryOptions) -> Result<Self, SchemaError> {
        validate_field_names(root)?;
        let groups = LoopGroups::detect(root)?;
        let fields = query_fields(root, &groups)?;
        Ok(Self::from_fields(&fields, options))
    }

    pub(crate) fn from_fields(fields: &[QueryField], options: &QueryOptions) -> Self {
        Self {
            rules: grammar(),
            fields: fields
                .iter()
                .map(|f| (f.path.clone(), f.clone()))
                .collect(),
            max_depth: options.max_query_depth,
        }
    }

    /// Validate a parsed advanced query into a filter expression.
    ///
    /// # Errors
    /// Every problem found, with paths relative to the query root.
    pub fn validate(&self, query: &Value) -> Result<FilterExpr, ValidationError> {
        let mut issues = Vec::new();
        let expr = self.validate_at(query, "", &mut issues);
        ValidationError::check(issues)?;
        expr.ok_or_else(|| ValidationError::single("", "invalid advanced query"))
    }

    pub(crate) fn validate_at(
        &self,
        query: &Value,
        path: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<FilterExpr> {
        self.apply(RuleId::Root, query, path, 0, issues)
    }

    fn apply(
        &self,
        id: RuleId,
        value: &Value,
        path: &str,
        depth: usize,
        issues: &mut Vec<Issue>,
    ) -> Option<FilterExpr> {
        let Some(rule) = self.rules.get(&id) else {
            issues.push(Issue::new(path, "unresolved grammar rule"));
            return None;
        };
        let Value::Object(map) = value else {
            issues.push(Issue::new(path, "expected an object"));
            return None;
        };

        match rule {
            Rule::OneOf(alternatives) => {
                if let Some(next) = alternatives.iter().find(|alt| self.matches(**alt, map)) {
                    return self.apply(*next, value, path, depth, issues);
                }
                let expected: Vec<String> =
                    alternatives.iter().map(|alt| self.describe(*alt)).collect();
                issues.push(Issue::new(
                    path,
                    format!("expected {}", expected.join(" or ")),
                ));
                None
            }
            Rule::Clause(clause) => self.clause(*clause, map, path, depth + 1, issues),
            Rule::Fields => self.conditions(map, path, issues),
        }
    }

    fn clause(
        &self,
        rule: ClauseRule,
        map: &Map<String, Value>,
        path: &str,
        depth: usize,
        issues: &mut Vec<Issue>,
    ) -> Option<FilterExpr> {
        let clause_path = join_path(path, rule.key);
        if depth > self.max_depth {
            issues.push(Issue::new(
                clause_path,
                format!("exceeds maximum nesting depth of {}", self.max_depth),
            ));
            return None;
        }
        let items = match map.get(rule.key) {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => {
                issues.push(Issue::new(clause_path, "expected a non-empty array"));
                return None;
            }
        };

        let mut children = Vec::with_capacity(items.len());
        let mut failed = false;
        for (i, child) in items.iter().enumerate() {
            let child_path = join_path(&clause_path, &i.to_string());
            match self.apply(rule.item, child, &child_path, depth, issues) {
                Some(expr) => children.push(expr),
                None => failed = true,
            }
        }
        if failed {
            return None;
        }
        Some(match rule.combine {
            Combine::All => FilterExpr::And(children),
            Combine::Any => FilterExpr::Or(children),
        })
    }

    fn conditions(
        &self,
        map: &Map<String, Value>,
        path: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<FilterExpr> {
        let before = issues.len();
        let mut comparisons = Vec::with_capacity(map.len());
        for (name, condition) in map {
            let field_path = join_path(path, name);
            let Some(field) = self.fields.get(name) else {
                issues.push(Issue::new(field_path, "unknown field"));
                continue;
            };
            if let Some(c) = condition_for(field, condition, &field_path, issues) {
                comparisons.push(FilterExpr::Compare(c));
            }
        }
        if issues.len() > before {
            return None;
        }
        Some(if comparisons.len() == 1 {
            comparisons.remove(0)
        } else {
            FilterExpr::And(comparisons)
        })
    }

    fn matches(&self, id: RuleId, map: &Map<String, Value>) -> bool {
        match self.rules.get(&id) {
            Some(Rule::OneOf(alternatives)) => alternatives.iter().any(|alt| self.matches(*alt, map)),
            Some(Rule::Clause(clause)) => map.len() == 1 && map.contains_key(clause.key),
            Some(Rule::Fields) => !map.is_empty() && !map.keys().any(|k| k.starts_with('$')),
            None => false,
        }
    }

    fn describe(&self, id: RuleId) -> String {
        match self.rules.get(&id) {
            Some(Rule::Clause(clause)) => format!("`{}`", clause.key),
            Some(Rule::Fields) => "field conditions".to_owned(),
            Some(Rule::OneOf(_)) | None => "a query node".to_owned(),
        }
    }
}

/// Operators a field accepts in an advanced query.
fn supports(field: &QueryField, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => true,
        CompareOp::Gt | CompareOp::Lt | CompareOp::Gte | CompareOp::Lte => field.is_ordered(),
        CompareOp::In | CompareOp::Nin => {
            field.is_array || matches!(field.kind, LeafKind::Enum(_) | LeafKind::Identifier)
        }
        CompareOp::Search => false,
    }
}

fn condition_for(
    field: &QueryField,
    condition: &Value,
    path: &str,
    issues: &mut Vec<Issue>,
) -> Option<Comparison> {
    let operator = match condition {
        Value::Object(ops) if ops.len() == 1 => ops.iter().next(),
        _ => None,
    };
    let Some((name, operand)) = operator else {
        issues.push(Issue::new(path, "expected an object with exactly one operator"));
        return None;
    };
    let op_path = join_path(path, name);
    let Some(op) = CompareOp::from_operator(name).filter(|op| supports(field, *op)) else {
        issues.push(Issue::new(
            op_path,
            "operator is not supported for this field",
        ));
        return None;
    };

    let value = if op.takes_list() {
        let Some(items) = operand.as_array().filter(|items| !items.is_empty()) else {
            issues.push(Issue::new(op_path, "expected a non-empty array"));
            return None;
        };
        let mut values = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match coerce::typed(&field.kind, item) {
                Ok(v) => values.push(v),
                Err(message) => issues.push(Issue::new(join_path(&op_path, &i.to_string()), message)),
            }
        }
        if values.len() != items.len() {
            return None;
        }
        Value::Array(values)
    } else if operand.is_null() && op == CompareOp::Eq && field.nullable {
        Value::Null
    } else {
        match coerce::typed(&field.kind, operand) {
            Ok(v) => v,
            Err(message) => {
                issues.push(Issue::new(op_path, message));
                return None;
            }
        }
    };
    Some(Comparison::new(field.path.clone(), op, value))
}
