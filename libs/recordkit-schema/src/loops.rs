//! Loop detection over shared and recursive object types.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::descriptor::{ObjectId, ObjectType, TypeNode};
use crate::error::{SchemaError, join_path};

/// An object type reached more than once while walking a schema.
#[derive(Debug, Clone)]
pub struct LoopGroup {
    object: Arc<ObjectType>,
    appearances: usize,
    name: String,
}

impl LoopGroup {
    #[must_use]
    pub fn object(&self) -> &Arc<ObjectType> {
        &self.object
    }

    #[must_use]
    pub fn appearances(&self) -> usize {
        self.appearances
    }

    /// Declared object name, else the dotted path of its first appearance.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Identity-keyed loop groups of one schema.
#[derive(Debug, Clone, Default)]
pub struct LoopGroups {
    groups: HashMap<ObjectId, LoopGroup>,
}

impl LoopGroups {
    /// Walk `root` and keep every object reached more than once.
    ///
    /// Wrappers and lazy references are followed transparently; an object
    /// already seen is counted again but not re-entered.
    ///
    /// # Errors
    /// [`SchemaError::DanglingReference`] when a lazy reference cannot be
    /// resolved.
    pub fn detect(root: &TypeNode) -> Result<Self, SchemaError> {
        let mut seen = HashMap::new();
        visit(root, "", &mut seen)?;
        seen.retain(|_, group| group.appearances > 1);
        Ok(Self { groups: seen })
    }

    #[must_use]
    pub fn contains(&self, object: &Arc<ObjectType>) -> bool {
        self.groups.contains_key(&ObjectId::of(object))
    }

    #[must_use]
    pub fn get(&self, object: &Arc<ObjectType>) -> Option<&LoopGroup> {
        self.groups.get(&ObjectId::of(object))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoopGroup> {
        self.groups.values()
    }
}

fn visit(
    node: &TypeNode,
    path: &str,
    seen: &mut HashMap<ObjectId, LoopGroup>,
) -> Result<(), SchemaError> {
    match node {
        TypeNode::Leaf(_) => Ok(()),
        TypeNode::Object(object) => visit_object(object, path, seen),
        TypeNode::Lazy(target) => {
            let object = target.upgrade().ok_or_else(|| SchemaError::DanglingReference {
                path: path.to_owned(),
            })?;
            visit_object(&object, path, seen)
        }
        TypeNode::Array(element) => visit(element, path, seen),
        TypeNode::Map { key, value } => {
            visit(key, path, seen)?;
            visit(value, &join_path(path, "*"), seen)
        }
        TypeNode::Union(options) => options.iter().try_for_each(|o| visit(o, path, seen)),
        TypeNode::Optional(inner) | TypeNode::Nullable(inner) | TypeNode::Default { inner, .. } => {
            visit(inner, path, seen)
        }
    }
}

fn visit_object(
    object: &Arc<ObjectType>,
    path: &str,
    seen: &mut HashMap<ObjectId, LoopGroup>,
) -> Result<(), SchemaError> {
    match seen.entry(ObjectId::of(object)) {
        Entry::Occupied(mut group) => {
            group.get_mut().appearances += 1;
            Ok(())
        }
        Entry::Vacant(slot) => {
            let name = object.name().map_or_else(
                || {
                    if path.is_empty() {
                        "root".to_owned()
                    } else {
                        path.to_owned()
                    }
                },
                str::to_owned,
            );
            slot.insert(LoopGroup {
                object: Arc::clone(object),
                appearances: 1,
                name,
            });
            for field in object.fields() {
                visit(field.node(), &join_path(path, field.name()), seen)?;
            }
            Ok(())
        }
    }
}
