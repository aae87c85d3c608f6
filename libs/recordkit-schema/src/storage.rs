//! Storage schema compiler.
//!
//! Projects a type descriptor into the field list a persistence engine
//! declares. Optionality follows parse semantics: a field is required when
//! parsing a missing value would fail.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::descriptor::{LeafKind, ObjectId, ObjectType, TypeNode};
use crate::error::{SchemaError, join_path};
use crate::loops::LoopGroups;
use crate::naming::validate_field_names;

/// Storage-engine field kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageKind {
    String,
    Number,
    Boolean,
    Date,
    Identifier,
    Enum { values: Vec<String> },
    /// Untyped value: `any`, unions and recursive objects.
    Mixed,
    Array { items: Box<StorageKind> },
    Map { values: Box<StorageKind> },
    Object { schema: StorageSchema },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageField {
    pub name: String,
    pub kind: StorageKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Ordered storage fields of one object level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageSchema {
    pub fields: Vec<StorageField>,
}

impl StorageSchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&StorageField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of top-level required fields.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Top-level identity field; always reported as not required.
    pub id_field: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            id_field: recordkit_security::filter_keys::RECORD_ID.to_owned(),
        }
    }
}

/// Compile `root` into a storage schema.
///
/// Field names are validated first; recursive or shared objects compile to
/// [`StorageKind::Mixed`] below the root.
///
/// # Errors
/// Any naming or reference problem as a [`SchemaError`].
pub fn compile_storage_schema(
    root: &TypeNode,
    options: &StorageOptions,
) -> Result<StorageSchema, SchemaError> {
    validate_field_names(root)?;
    let groups = LoopGroups::detect(root)?;
    compile_with_groups(root, &groups, options)
}

pub(crate) fn compile_with_groups(
    root: &TypeNode,
    groups: &LoopGroups,
    options: &StorageOptions,
) -> Result<StorageSchema, SchemaError> {
    let root_object = resolve(root, "")?.ok_or(SchemaError::RootNotObject)?;
    let compiler = Compiler {
        groups,
        root: ObjectId::of(&root_object),
    };
    let mut schema = compiler.object(&root_object, "")?;
    if let Some(id) = schema
        .fields
        .iter_mut()
        .find(|f| f.name == options.id_field)
    {
        id.required = false;
    }
    Ok(schema)
}

struct Compiler<'a> {
    groups: &'a LoopGroups,
    root: ObjectId,
}

struct Compiled {
    kind: StorageKind,
    required: bool,
    default: Option<Value>,
}

impl Compiled {
    fn required(kind: StorageKind) -> Self {
        Self {
            kind,
            required: true,
            default: None,
        }
    }
}

impl Compiler<'_> {
    fn object(&self, object: &Arc<ObjectType>, prefix: &str) -> Result<StorageSchema, SchemaError> {
        let mut fields = Vec::with_capacity(object.fields().len());
        for field in object.fields() {
            let path = join_path(prefix, field.name());
            let compiled = self.node(field.node(), &path)?;
            fields.push(StorageField {
                name: field.name().to_owned(),
                kind: compiled.kind,
                required: compiled.required,
                default: compiled.default,
            });
        }
        Ok(StorageSchema { fields })
    }

    fn node(&self, node: &TypeNode, path: &str) -> Result<Compiled, SchemaError> {
        Ok(match node {
            TypeNode::Leaf(kind) => leaf(kind),
            TypeNode::Object(_) | TypeNode::Lazy(_) => match resolve(node, path)? {
                Some(object)
                    if ObjectId::of(&object) != self.root && !self.groups.contains(&object) =>
                {
                    Compiled::required(StorageKind::Object {
                        schema: self.object(&object, path)?,
                    })
                }
                _ => Compiled::required(StorageKind::Mixed),
            },
            TypeNode::Array(element) => Compiled::required(StorageKind::Array {
                items: Box::new(self.node(element, path)?.kind),
            }),
            TypeNode::Map { value, .. } => Compiled::required(StorageKind::Map {
                values: Box::new(self.node(value, &join_path(path, "*"))?.kind),
            }),
            TypeNode::Union(options) => {
                let mut required = true;
                for option in options {
                    required &= self.node(option, path)?.required;
                }
                Compiled {
                    kind: StorageKind::Mixed,
                    required,
                    default: None,
                }
            }
            TypeNode::Optional(inner) => Compiled {
                required: false,
                ..self.node(inner, path)?
            },
            TypeNode::Nullable(inner) => self.node(inner, path)?,
            TypeNode::Default { inner, value } => Compiled {
                required: true,
                default: Some(value.clone()),
                ..self.node(inner, path)?
            },
        })
    }
}

fn leaf(kind: &LeafKind) -> Compiled {
    let kind = match kind {
        LeafKind::String => StorageKind::String,
        LeafKind::Number => StorageKind::Number,
        LeafKind::Boolean => StorageKind::Boolean,
        LeafKind::Date => StorageKind::Date,
        LeafKind::Identifier => StorageKind::Identifier,
        LeafKind::Enum(values) => StorageKind::Enum {
            values: values.clone(),
        },
        LeafKind::Any => {
            return Compiled {
                kind: StorageKind::Mixed,
                required: false,
                default: None,
            };
        }
    };
    Compiled::required(kind)
}

fn resolve(node: &TypeNode, path: &str) -> Result<Option<Arc<ObjectType>>, SchemaError> {
    node.resolve_object()
        .map_err(|_| SchemaError::DanglingReference {
            path: path.to_owned(),
        })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(root: &TypeNode) -> StorageSchema {
        compile_storage_schema(root, &StorageOptions::default()).unwrap()
    }

    #[test]
    fn optionality_follows_parse_semantics() {
        let root = ObjectType::builder()
            .field("id", TypeNode::identifier())
            .field("name", TypeNode::string())
            .field("nickname", TypeNode::string().optional())
            .field("age", TypeNode::number().nullable())
            .field("score", TypeNode::number().with_default(0))
            .field("extra", TypeNode::any())
            .build_node();

        let schema = compile(&root);
        let required: Vec<_> = schema.required_fields().collect();

        assert_eq!(required, ["name", "age", "score"]);
        assert_eq!(schema.field("score").unwrap().default, Some(json!(0)));
        assert_eq!(schema.field("extra").unwrap().kind, StorageKind::Mixed);
        assert!(!schema.field("id").unwrap().required);
    }

    #[test]
    fn unions_are_mixed_and_required_only_when_all_options_are() {
        let root = ObjectType::builder()
            .field(
                "strict",
                TypeNode::union(vec![TypeNode::string(), TypeNode::number()]),
            )
            .field(
                "loose",
                TypeNode::union(vec![TypeNode::string(), TypeNode::any()]),
            )
            .build_node();

        let schema = compile(&root);
        let strict = schema.field("strict").unwrap();
        let loose = schema.field("loose").unwrap();

        assert_eq!(strict.kind, StorageKind::Mixed);
        assert!(strict.required);
        assert!(!loose.required);
    }

    #[test]
    fn recursive_objects_become_mixed_below_the_root() {
        let comment = ObjectType::new_cyclic(|this| {
            ObjectType::builder()
                .named("Comment")
                .field("body", TypeNode::string())
                .field("replies", TypeNode::array(TypeNode::lazy(this)))
        });

        let schema = compile(&TypeNode::object(&comment));

        assert_eq!(schema.fields.len(), 2);
        assert_eq!(
            schema.field("replies").unwrap().kind,
            StorageKind::Array {
                items: Box::new(StorageKind::Mixed)
            }
        );
    }

    #[test]
    fn shared_objects_become_mixed() {
        let money = ObjectType::builder()
            .field("amount", TypeNode::number())
            .field("currency", TypeNode::enumeration(["EUR", "USD"]))
            .build();
        let root = ObjectType::builder()
            .field("price", TypeNode::object(&money))
            .field("cost", TypeNode::object(&money))
            .field(
                "tags",
                TypeNode::map(TypeNode::string(), TypeNode::boolean()),
            )
            .build_node();

        let schema = compile(&root);

        assert_eq!(schema.field("price").unwrap().kind, StorageKind::Mixed);
        assert_eq!(
            schema.field("tags").unwrap().kind,
            StorageKind::Map {
                values: Box::new(StorageKind::Boolean)
            }
        );
    }

    #[test]
    fn nested_objects_compile_recursively() {
        let address = ObjectType::builder()
            .field("city", TypeNode::string())
            .field("zip", TypeNode::string().optional())
            .build();
        let root = ObjectType::builder()
            .field("address", TypeNode::object(&address).optional())
            .build_node();

        let schema = compile(&root);
        let field = schema.field("address").unwrap();
        assert!(!field.required);
        let StorageKind::Object { schema: nested } = &field.kind else {
            panic!("expected nested object, got {:?}", field.kind);
        };
        assert!(nested.field("city").unwrap().required);
        assert!(!nested.field("zip").unwrap().required);
    }

    #[test]
    fn naming_errors_surface_from_compilation() {
        let meta = ObjectType::builder().field("$set", TypeNode::any()).build();
        let root = ObjectType::builder()
            .field("meta", TypeNode::object(&meta))
            .build_node();

        let err = compile_storage_schema(&root, &StorageOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "field `meta.$set` must not start with `$`");
    }

    #[test]
    fn custom_id_field_is_not_required() {
        let root = ObjectType::builder()
            .field("key", TypeNode::string())
            .field("id", TypeNode::string())
            .build_node();
        let options = StorageOptions {
            id_field: "key".to_owned(),
        };

        let schema = compile_storage_schema(&root, &options).unwrap();
        assert!(!schema.field("key").unwrap().required);
        assert!(schema.field("id").unwrap().required);
    }
}
