//! Field-name rules keeping record fields clear of the query vocabulary.

use std::collections::HashSet;
use std::sync::Arc;

use crate::descriptor::{ObjectId, ObjectType, TypeNode};
use crate::error::{SchemaError, join_path};

/// Suffixes the simple query grammar appends to field paths.
pub const RESERVED_SUFFIXES: [&str; 6] = ["_gt", "_lt", "_gte", "_lte", "_in", "_search"];

/// Query-string control words. Only top-level names can collide with them.
pub const RESERVED_WORDS: [&str; 5] = ["limit", "cursor", "sort", "sort_order", "advanced_query"];

/// Check every field name reachable from `root`.
///
/// Each object is checked once, at its first appearance.
///
/// # Errors
/// The first offending name, as a [`SchemaError`] naming its dotted path.
pub fn validate_field_names(root: &TypeNode) -> Result<(), SchemaError> {
    let mut visited = HashSet::new();
    let root_object = root
        .resolve_object()
        .map_err(|_| SchemaError::DanglingReference {
            path: String::new(),
        })?
        .ok_or(SchemaError::RootNotObject)?;

    for field in root_object.fields() {
        if RESERVED_WORDS.contains(&field.name()) {
            return Err(SchemaError::ReservedWord {
                path: field.name().to_owned(),
            });
        }
    }
    check_object(&root_object, "", &mut visited)
}

fn check_object(
    object: &Arc<ObjectType>,
    prefix: &str,
    visited: &mut HashSet<ObjectId>,
) -> Result<(), SchemaError> {
    if !visited.insert(ObjectId::of(object)) {
        return Ok(());
    }

    let mut names = HashSet::new();
    for field in object.fields() {
        let path = join_path(prefix, field.name());
        if !names.insert(field.name()) {
            return Err(SchemaError::DuplicateField { path });
        }
        if field.name().starts_with('$') {
            return Err(SchemaError::DollarPrefix { path });
        }
        if let Some(suffix) = RESERVED_SUFFIXES
            .into_iter()
            .find(|suffix| field.name().ends_with(*suffix))
        {
            return Err(SchemaError::ReservedSuffix { path, suffix });
        }
        check_node(field.node(), &path, visited)?;
    }
    Ok(())
}

fn check_node(
    node: &TypeNode,
    path: &str,
    visited: &mut HashSet<ObjectId>,
) -> Result<(), SchemaError> {
    match node {
        TypeNode::Leaf(_) => Ok(()),
        TypeNode::Object(object) => check_object(object, path, visited),
        TypeNode::Lazy(target) => {
            let object = target.upgrade().ok_or_else(|| SchemaError::DanglingReference {
                path: path.to_owned(),
            })?;
            check_object(&object, path, visited)
        }
        TypeNode::Array(element) => check_node(element, path, visited),
        TypeNode::Map { value, .. } => check_node(value, &join_path(path, "*"), visited),
        TypeNode::Union(options) => options
            .iter()
            .try_for_each(|option| check_node(option, path, visited)),
        TypeNode::Optional(inner) | TypeNode::Nullable(inner) | TypeNode::Default { inner, .. } => {
            check_node(inner, path, visited)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn with_meta(meta: TypeNode) -> TypeNode {
        ObjectType::builder()
            .field("name", TypeNode::string())
            .field("meta", meta)
            .build_node()
    }

    #[test]
    fn nested_dollar_name_is_rejected_with_dotted_path() {
        let meta = ObjectType::builder().field("$set", TypeNode::any()).build();
        let err = validate_field_names(&with_meta(TypeNode::object(&meta))).unwrap_err();

        assert_eq!(
            err,
            SchemaError::DollarPrefix {
                path: "meta.$set".to_owned()
            }
        );
    }

    #[test]
    fn reserved_suffix_is_rejected_at_any_depth() {
        let meta = ObjectType::builder()
            .field("price_gte", TypeNode::number())
            .build();
        let err = validate_field_names(&with_meta(
            TypeNode::array(TypeNode::object(&meta)).optional(),
        ))
        .unwrap_err();

        assert_eq!(
            err,
            SchemaError::ReservedSuffix {
                path: "meta.price_gte".to_owned(),
                suffix: "_gte"
            }
        );
    }

    #[test]
    fn map_values_report_star_segment() {
        let entry = ObjectType::builder()
            .field("tags_in", TypeNode::string())
            .build();
        let err = validate_field_names(&with_meta(TypeNode::map(
            TypeNode::string(),
            TypeNode::object(&entry),
        )))
        .unwrap_err();

        assert_eq!(
            err,
            SchemaError::ReservedSuffix {
                path: "meta.*.tags_in".to_owned(),
                suffix: "_in"
            }
        );
    }

    #[test]
    fn reserved_words_apply_only_at_top_level() {
        let top = ObjectType::builder()
            .field("sort", TypeNode::string())
            .build_node();
        assert_eq!(
            validate_field_names(&top).unwrap_err(),
            SchemaError::ReservedWord {
                path: "sort".to_owned()
            }
        );

        let nested = ObjectType::builder()
            .field("limit", TypeNode::number())
            .field("cursor", TypeNode::string())
            .build();
        assert!(validate_field_names(&with_meta(TypeNode::object(&nested))).is_ok());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let root = ObjectType::builder()
            .field("name", TypeNode::string())
            .field("name", TypeNode::number())
            .build_node();

        assert_eq!(
            validate_field_names(&root).unwrap_err(),
            SchemaError::DuplicateField {
                path: "name".to_owned()
            }
        );
    }

    #[test]
    fn recursive_schema_is_checked_once() {
        let node = ObjectType::new_cyclic(|this| {
            ObjectType::builder()
                .field("label", TypeNode::string())
                .field("parent", TypeNode::lazy(this).nullable())
        });

        assert!(validate_field_names(&TypeNode::object(&node)).is_ok());
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert_eq!(
            validate_field_names(&TypeNode::string()).unwrap_err(),
            SchemaError::RootNotObject
        );
    }
}
