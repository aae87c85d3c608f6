#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Schema introspection for record types.
//!
//! One [`TypeNode`] tree per record type is projected into:
//! - a storage schema ([`storage::compile_storage_schema`]),
//! - a record-body validator ([`body::BodyValidator`]),
//! - a per-field query-string grammar ([`query::SimpleQueryValidator`]),
//! - a boolean-composition query grammar ([`query::AdvancedQueryValidator`]).
//!
//! Shared and self-referencing object types are detected by identity
//! ([`loops::LoopGroups`]) so every walk terminates.

pub mod body;
mod coerce;
pub mod descriptor;
pub mod error;
pub mod loops;
pub mod naming;
pub mod query;
pub mod record;
pub mod storage;

pub use body::BodyValidator;
pub use descriptor::{Field, LeafKind, Modifiers, ObjectBuilder, ObjectId, ObjectType, TypeNode};
pub use error::{Issue, SchemaError, ValidationError};
pub use loops::{LoopGroup, LoopGroups};
pub use query::{
    AdvancedQueryValidator, ListQuery, QueryMode, QueryOptions, SimpleQueryValidator, SortOrder,
};
pub use record::{RecordSchema, SchemaOptions};
pub use storage::{StorageField, StorageKind, StorageOptions, StorageSchema};
