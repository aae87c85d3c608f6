//! Leaf path derivation shared by both query grammars.

use std::sync::Arc;

use crate::descriptor::{LeafKind, ObjectId, ObjectType, TypeNode};
use crate::error::{SchemaError, join_path};
use crate::loops::LoopGroups;

/// A filterable leaf at a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryField {
    pub path: String,
    pub kind: LeafKind,
    /// The path holds an array of `kind`; equality means "contains".
    pub is_array: bool,
    pub nullable: bool,
}

impl QueryField {
    /// Ordered kinds accept range comparisons.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        matches!(
            self.kind,
            LeafKind::String | LeafKind::Number | LeafKind::Date | LeafKind::Identifier
        )
    }
}

/// Collect the filterable leaves of `root`.
///
/// Arrays of composites, maps, unions and loop objects contribute nothing.
///
/// # Errors
/// [`SchemaError::RootNotObject`] or a dangling reference.
pub fn query_fields(root: &TypeNode, groups: &LoopGroups) -> Result<Vec<QueryField>, SchemaError> {
    let root_object = root
        .resolve_object()
        .map_err(|_| SchemaError::DanglingReference {
            path: String::new(),
        })?
        .ok_or(SchemaError::RootNotObject)?;
    let collector = Collector {
        groups,
        root: ObjectId::of(&root_object),
    };
    let mut out = Vec::new();
    collector.object(&root_object, "", &mut out)?;
    Ok(out)
}

struct Collector<'a> {
    groups: &'a LoopGroups,
    root: ObjectId,
}

impl Collector<'_> {
    fn object(
        &self,
        object: &Arc<ObjectType>,
        prefix: &str,
        out: &mut Vec<QueryField>,
    ) -> Result<(), SchemaError> {
        for field in object.fields() {
            let path = join_path(prefix, field.name());
            let (core, modifiers) = field.node().peel();
            match core {
                TypeNode::Leaf(kind) => out.push(QueryField {
                    path,
                    kind: kind.clone(),
                    is_array: false,
                    nullable: modifiers.nullable,
                }),
                TypeNode::Array(element) => {
                    if let (TypeNode::Leaf(kind), _) = element.peel() {
                        out.push(QueryField {
                            path,
                            kind: kind.clone(),
                            is_array: true,
                            nullable: modifiers.nullable,
                        });
                    }
                }
                TypeNode::Object(_) | TypeNode::Lazy(_) => {
                    let nested = core
                        .resolve_object()
                        .map_err(|_| SchemaError::DanglingReference { path: path.clone() })?;
                    if let Some(nested) = nested
                        && ObjectId::of(&nested) != self.root
                        && !self.groups.contains(&nested)
                    {
                        self.object(&nested, &path, out)?;
                    }
                }
                TypeNode::Map { .. }
                | TypeNode::Union(_)
                | TypeNode::Optional(_)
                | TypeNode::Nullable(_)
                | TypeNode::Default { .. } => {}
            }
        }
        Ok(())
    }
}
