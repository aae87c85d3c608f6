//! Record-body validation for create and update.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::coerce;
use crate::descriptor::{LeafKind, ObjectType, TypeNode};
use crate::error::{Issue, SchemaError, ValidationError, join_path};

/// Validates and normalizes record bodies against a type descriptor.
///
/// Unknown keys are rejected at every level. The top-level id field is
/// dropped from input: ids are assigned by the store.
#[derive(Debug, Clone)]
pub struct BodyValidator {
    root: Arc<ObjectType>,
    id_field: String,
}

impl BodyValidator {
    /// # Errors
    /// [`SchemaError::RootNotObject`] or a dangling root reference.
    pub fn new(root: &TypeNode, id_field: impl Into<String>) -> Result<Self, SchemaError> {
        let root = root
            .resolve_object()
            .map_err(|_| SchemaError::DanglingReference {
                path: String::new(),
            })?
            .ok_or(SchemaError::RootNotObject)?;
        Ok(Self {
            root,
            id_field: id_field.into(),
        })
    }

    /// Validate a complete record, applying defaults.
    ///
    /// # Errors
    /// Every problem found, as one [`ValidationError`].
    pub fn validate(&self, body: &Value) -> Result<Map<String, Value>, ValidationError> {
        self.run(body, false)
    }

    /// Validate the fields present in a partial update. Missing fields are
    /// left untouched; nested objects are still validated whole.
    ///
    /// # Errors
    /// Every problem found, as one [`ValidationError`].
    pub fn validate_partial(&self, body: &Value) -> Result<Map<String, Value>, ValidationError> {
        self.run(body, true)
    }

    fn run(&self, body: &Value, partial: bool) -> Result<Map<String, Value>, ValidationError> {
        let Value::Object(map) = body else {
            return Err(ValidationError::single("", "expected a JSON object"));
        };
        let mut issues = Vec::new();
        let walker = Walker {
            id_field: &self.id_field,
        };
        let out = walker.object(&self.root, map, "", partial, &mut issues);
        ValidationError::check(issues)?;
        Ok(out)
    }
}

struct Walker<'a> {
    id_field: &'a str,
}

impl Walker<'_> {
    fn object(
        &self,
        object: &ObjectType,
        map: &Map<String, Value>,
        path: &str,
        partial: bool,
        issues: &mut Vec<Issue>,
    ) -> Map<String, Value> {
        let top_level = path.is_empty();
        for key in map.keys() {
            if object.field(key).is_none() && !(top_level && key == self.id_field) {
                issues.push(Issue::new(join_path(path, key), "unknown field"));
            }
        }

        let mut out = Map::new();
        for field in object.fields() {
            if top_level && field.name() == self.id_field {
                continue;
            }
            let value = map.get(field.name());
            if partial && value.is_none() {
                continue;
            }
            let field_path = join_path(path, field.name());
            if let Some(v) = self.field(field.node(), value, &field_path, issues) {
                out.insert(field.name().to_owned(), v);
            }
        }
        out
    }

    /// Validate one slot. `None` means "leave absent".
    fn field(
        &self,
        node: &TypeNode,
        value: Option<&Value>,
        path: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<Value> {
        let (core, modifiers) = node.peel();
        match value {
            None => {
                if let Some(default) = modifiers.default {
                    Some(default.clone())
                } else {
                    if !modifiers.optional && !accepts_missing(core) {
                        issues.push(Issue::new(path, "is required"));
                    }
                    None
                }
            }
            Some(Value::Null) if modifiers.nullable || accepts_null(core) => Some(Value::Null),
            Some(Value::Null) => {
                issues.push(Issue::new(path, "must not be null"));
                None
            }
            Some(v) => self.value(core, v, path, issues),
        }
    }

    fn value(
        &self,
        core: &TypeNode,
        value: &Value,
        path: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<Value> {
        match core {
            TypeNode::Leaf(kind) => match coerce::typed(kind, value) {
                Ok(v) => Some(v),
                Err(message) => {
                    issues.push(Issue::new(path, message));
                    None
                }
            },
            TypeNode::Object(_) | TypeNode::Lazy(_) => {
                let Ok(Some(object)) = core.resolve_object() else {
                    issues.push(Issue::new(path, "unresolvable type reference"));
                    return None;
                };
                let Value::Object(map) = value else {
                    issues.push(Issue::new(path, "expected an object"));
                    return None;
                };
                let before = issues.len();
                let out = self.object(&object, map, path, false, issues);
                (issues.len() == before).then_some(Value::Object(out))
            }
            TypeNode::Array(element) => {
                let Value::Array(items) = value else {
                    issues.push(Issue::new(path, "expected an array"));
                    return None;
                };
                let before = issues.len();
                let out: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        self.field(element, Some(item), &join_path(path, &i.to_string()), issues)
                    })
                    .collect();
                (issues.len() == before).then_some(Value::Array(out))
            }
            TypeNode::Map { key, value: inner } => {
                let Value::Object(entries) = value else {
                    issues.push(Issue::new(path, "expected an object"));
                    return None;
                };
                let before = issues.len();
                let mut out = Map::new();
                for (k, v) in entries {
                    let entry_path = join_path(path, k);
                    if let (TypeNode::Leaf(kind), _) = key.peel()
                        && let Err(message) = coerce::typed(kind, &Value::String(k.clone()))
                    {
                        issues.push(Issue::new(&entry_path, format!("key {message}")));
                        continue;
                    }
                    if let Some(v) = self.field(inner, Some(v), &entry_path, issues) {
                        out.insert(k.clone(), v);
                    }
                }
                (issues.len() == before).then_some(Value::Object(out))
            }
            TypeNode::Union(options) => {
                for option in options {
                    let mut scratch = Vec::new();
                    if let Some(v) = self.field(option, Some(value), path, &mut scratch)
                        && scratch.is_empty()
                    {
                        return Some(v);
                    }
                }
                issues.push(Issue::new(path, "does not match any allowed type"));
                None
            }
            TypeNode::Optional(_) | TypeNode::Nullable(_) | TypeNode::Default { .. } => {
                self.field(core, Some(value), path, issues)
            }
        }
    }
}

/// Whether a missing value parses for this (peeled) node.
fn accepts_missing(core: &TypeNode) -> bool {
    match core {
        TypeNode::Leaf(LeafKind::Any) => true,
        TypeNode::Union(options) => options.iter().any(|option| {
            let (inner, modifiers) = option.peel();
            modifiers.optional || modifiers.default.is_some() || accepts_missing(inner)
        }),
        _ => false,
    }
}

/// Whether `null` parses for this (peeled) node.
fn accepts_null(core: &TypeNode) -> bool {
    match core {
        TypeNode::Leaf(LeafKind::Any) => true,
        TypeNode::Union(options) => options.iter().any(|option| {
            let (inner, modifiers) = option.peel();
            modifiers.nullable || accepts_null(inner)
        }),
        _ => false,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> BodyValidator {
        let address = ObjectType::builder()
            .field("city", TypeNode::string())
            .field("zip", TypeNode::string().optional())
            .build();
        let root = ObjectType::builder()
            .field("id", TypeNode::identifier())
            .field("name", TypeNode::string())
            .field("age", TypeNode::number().nullable())
            .field("role", TypeNode::enumeration(["admin", "member"]).with_default("member"))
            .field("born", TypeNode::date().optional())
            .field("address", TypeNode::object(&address).optional())
            .field("tags", TypeNode::array(TypeNode::string()).optional())
            .field(
                "scores",
                TypeNode::map(TypeNode::string(), TypeNode::number()).optional(),
            )
            .build_node();
        BodyValidator::new(&root, "id").unwrap()
    }

    #[test]
    fn full_body_applies_defaults_and_normalizes() {
        let out = person()
            .validate(&json!({
                "name": "Ada",
                "age": null,
                "born": "1815-12-10",
                "address": {"city": "London"},
                "tags": ["math"],
            }))
            .unwrap();

        assert_eq!(
            Value::Object(out),
            json!({
                "name": "Ada",
                "age": null,
                "role": "member",
                "born": "1815-12-10T00:00:00.000Z",
                "address": {"city": "London"},
                "tags": ["math"],
            })
        );
    }

    #[test]
    fn issues_are_collected_with_paths() {
        let err = person()
            .validate(&json!({
                "age": "old",
                "address": {"town": "x"},
                "tags": ["ok", 3],
                "scores": {"a": "high"},
                "bogus": true,
            }))
            .unwrap_err();

        let paths: Vec<_> = err.issues().iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "bogus",
                "name",
                "age",
                "address.town",
                "address.city",
                "tags.1",
                "scores.a"
            ]
        );
    }

    #[test]
    fn id_in_body_is_ignored() {
        let out = person()
            .validate(&json!({"id": "whatever", "name": "Ada", "age": 3}))
            .unwrap();
        assert!(!out.contains_key("id"));
    }

    #[test]
    fn partial_body_validates_only_present_fields() {
        let validator = person();
        let out = validator.validate_partial(&json!({"age": 37})).unwrap();
        assert_eq!(Value::Object(out), json!({"age": 37}));

        let err = validator
            .validate_partial(&json!({"address": {}}))
            .unwrap_err();
        assert_eq!(err.issues()[0].path, "address.city");
    }

    #[test]
    fn unions_take_first_matching_option() {
        let root = ObjectType::builder()
            .field(
                "value",
                TypeNode::union(vec![TypeNode::number(), TypeNode::date()]),
            )
            .build_node();
        let validator = BodyValidator::new(&root, "id").unwrap();

        assert_eq!(
            validator.validate(&json!({"value": "2024-01-01"})).unwrap()["value"],
            json!("2024-01-01T00:00:00.000Z")
        );
        assert!(validator.validate(&json!({"value": true})).is_err());
    }

    #[test]
    fn union_with_a_nullable_option_accepts_null() {
        let root = ObjectType::builder()
            .field(
                "value",
                TypeNode::union(vec![TypeNode::number(), TypeNode::string().nullable()]),
            )
            .field(
                "strict",
                TypeNode::union(vec![TypeNode::number(), TypeNode::string()]).optional(),
            )
            .build_node();
        let validator = BodyValidator::new(&root, "id").unwrap();

        let body = validator.validate(&json!({"value": null})).unwrap();
        assert_eq!(body["value"], Value::Null);

        let err = validator
            .validate(&json!({"value": 1, "strict": null}))
            .unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].path, "strict");
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(person().validate(&json!([1, 2])).is_err());
    }
}
