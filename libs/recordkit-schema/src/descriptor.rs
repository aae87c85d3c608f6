//! Type descriptor tree.
//!
//! A record type is described by a [`TypeNode`] whose object nodes are shared
//! [`ObjectType`] allocations. Object identity is the allocation address, so
//! the same `Arc<ObjectType>` reused under two fields is one object, while two
//! structurally equal objects built separately are two.
//!
//! Self and mutual references are expressed with [`TypeNode::Lazy`], a weak
//! pointer to an object built with [`ObjectType::new_cyclic`].
//!
//! ```
//! use recordkit_schema::{ObjectType, TypeNode};
//!
//! let category = ObjectType::new_cyclic(|this| {
//!     ObjectType::builder()
//!         .named("Category")
//!         .field("title", TypeNode::string())
//!         .field("children", TypeNode::array(TypeNode::lazy(this)))
//! });
//!
//! assert_eq!(category.fields().len(), 2);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;

/// Scalar kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 timestamp.
    Date,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// UUID string.
    Identifier,
    /// Unchecked value.
    Any,
}

impl LeafKind {
    /// Short name used in validation messages.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Date => "an RFC 3339 date",
            Self::Enum(_) => "one of the allowed values",
            Self::Identifier => "a UUID",
            Self::Any => "any value",
        }
    }
}

/// One node of a type descriptor tree.
#[derive(Clone)]
pub enum TypeNode {
    Leaf(LeafKind),
    Object(Arc<ObjectType>),
    Array(Box<TypeNode>),
    Map {
        key: Box<TypeNode>,
        value: Box<TypeNode>,
    },
    Union(Vec<TypeNode>),
    Optional(Box<TypeNode>),
    Nullable(Box<TypeNode>),
    Default {
        inner: Box<TypeNode>,
        value: Value,
    },
    /// Deferred reference to an object, for recursive types.
    Lazy(Weak<ObjectType>),
}

impl TypeNode {
    #[must_use]
    pub fn string() -> Self {
        Self::Leaf(LeafKind::String)
    }

    #[must_use]
    pub fn number() -> Self {
        Self::Leaf(LeafKind::Number)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::Leaf(LeafKind::Boolean)
    }

    #[must_use]
    pub fn date() -> Self {
        Self::Leaf(LeafKind::Date)
    }

    #[must_use]
    pub fn identifier() -> Self {
        Self::Leaf(LeafKind::Identifier)
    }

    #[must_use]
    pub fn any() -> Self {
        Self::Leaf(LeafKind::Any)
    }

    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Leaf(LeafKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn object(object: &Arc<ObjectType>) -> Self {
        Self::Object(Arc::clone(object))
    }

    #[must_use]
    pub fn array(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn union(options: Vec<Self>) -> Self {
        Self::Union(options)
    }

    #[must_use]
    pub fn lazy(target: &Weak<ObjectType>) -> Self {
        Self::Lazy(Weak::clone(target))
    }

    #[must_use]
    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    #[must_use]
    pub fn nullable(self) -> Self {
        Self::Nullable(Box::new(self))
    }

    #[must_use]
    pub fn with_default(self, value: impl Into<Value>) -> Self {
        Self::Default {
            inner: Box::new(self),
            value: value.into(),
        }
    }

    /// Strip `Optional`, `Nullable` and `Default` wrappers.
    #[must_use]
    pub fn peel(&self) -> (&Self, Modifiers<'_>) {
        let mut node = self;
        let mut modifiers = Modifiers::default();
        loop {
            match node {
                Self::Optional(inner) => {
                    modifiers.optional = true;
                    node = inner;
                }
                Self::Nullable(inner) => {
                    modifiers.nullable = true;
                    node = inner;
                }
                Self::Default { inner, value } => {
                    if modifiers.default.is_none() {
                        modifiers.default = Some(value);
                    }
                    node = inner;
                }
                _ => return (node, modifiers),
            }
        }
    }

    /// The object this node denotes after peeling wrappers.
    ///
    /// `Ok(None)` for non-object nodes.
    pub(crate) fn resolve_object(&self) -> Result<Option<Arc<ObjectType>>, DanglingLazy> {
        match self.peel().0 {
            Self::Object(object) => Ok(Some(Arc::clone(object))),
            Self::Lazy(target) => target.upgrade().map(Some).ok_or(DanglingLazy),
            _ => Ok(None),
        }
    }
}

/// Marker for a lazy reference whose target was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DanglingLazy;

impl fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(kind) => f.debug_tuple("Leaf").field(kind).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Self::Array(element) => f.debug_tuple("Array").field(element).finish(),
            Self::Map { key, value } => f
                .debug_struct("Map")
                .field("key", key)
                .field("value", value)
                .finish(),
            Self::Union(options) => f.debug_tuple("Union").field(options).finish(),
            Self::Optional(inner) => f.debug_tuple("Optional").field(inner).finish(),
            Self::Nullable(inner) => f.debug_tuple("Nullable").field(inner).finish(),
            Self::Default { inner, value } => f
                .debug_struct("Default")
                .field("inner", inner)
                .field("value", value)
                .finish(),
            // Never follow lazy edges: the graph may be cyclic.
            Self::Lazy(target) => {
                let name = target.upgrade().and_then(|o| o.name.clone());
                f.debug_tuple("Lazy").field(&name).finish()
            }
        }
    }
}

/// Wrappers collected by [`TypeNode::peel`]. Outermost default wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers<'a> {
    pub optional: bool,
    pub nullable: bool,
    pub default: Option<&'a Value>,
}

/// Named field of an object.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    node: TypeNode,
}

impl Field {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn node(&self) -> &TypeNode {
        &self.node
    }
}

/// An object type with ordered fields.
#[derive(Debug)]
pub struct ObjectType {
    name: Option<String>,
    fields: Vec<Field>,
}

impl ObjectType {
    #[must_use]
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
    }

    /// Build an object that can refer to itself through [`TypeNode::lazy`].
    ///
    /// The weak handle passed to `build` upgrades once construction returns.
    #[must_use]
    pub fn new_cyclic<F>(build: F) -> Arc<Self>
    where
        F: FnOnce(&Weak<Self>) -> ObjectBuilder,
    {
        Arc::new_cyclic(|this| build(this).into_object())
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Identity of a shared object allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    #[must_use]
    pub fn of(object: &Arc<ObjectType>) -> Self {
        Self(Arc::as_ptr(object).addr())
    }
}

#[derive(Debug, Default)]
pub struct ObjectBuilder {
    name: Option<String>,
    fields: Vec<Field>,
}

impl ObjectBuilder {
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a field. Duplicates are kept and reported at compile time.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, node: TypeNode) -> Self {
        self.fields.push(Field {
            name: name.into(),
            node,
        });
        self
    }

    #[must_use]
    pub fn into_object(self) -> ObjectType {
        ObjectType {
            name: self.name,
            fields: self.fields,
        }
    }

    #[must_use]
    pub fn build(self) -> Arc<ObjectType> {
        Arc::new(self.into_object())
    }

    /// Build and wrap as a root node.
    #[must_use]
    pub fn build_node(self) -> TypeNode {
        TypeNode::Object(self.build())
    }
}
