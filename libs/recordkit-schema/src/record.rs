use std::sync::Arc;

use crate::body::BodyValidator;
use crate::descriptor::{ObjectType, TypeNode};
use crate::error::SchemaError;
use crate::loops::LoopGroups;
use crate::naming::validate_field_names;
use crate::query::{
    AdvancedQueryValidator, QueryField, QueryMode, QueryOptions, SimpleQueryValidator,
    query_fields,
};
use crate::storage::{StorageOptions, StorageSchema, compile_with_groups};

/// Options for compiling one record type.
#[derive(Debug, Clone, Default)]
pub struct SchemaOptions {
    pub storage: StorageOptions,
    pub query: QueryOptions,
}

/// Every projection of one record type, compiled once at startup.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    name: String,
    root: Arc<ObjectType>,
    storage: StorageSchema,
    body: BodyValidator,
    server_query: SimpleQueryValidator,
    client_query: SimpleQueryValidator,
    advanced_query: AdvancedQueryValidator,
    fields: Vec<QueryField>,
}

impl RecordSchema {
    /// Compile `root` as record type `name`.
    ///
    /// Names are validated and loop groups detected once for all targets.
    ///
    /// # Errors
    /// Any [`SchemaError`] found in `root`.
    pub fn compile(
        name: impl Into<String>,
        root: &TypeNode,
        options: &SchemaOptions,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        validate_field_names(root)?;
        let groups = LoopGroups::detect(root)?;
        let root_object = root
            .resolve_object()
            .map_err(|_| SchemaError::DanglingReference {
                path: String::new(),
            })?
            .ok_or(SchemaError::RootNotObject)?;

        let storage = compile_with_groups(root, &groups, &options.storage)?;
        let fields = query_fields(root, &groups)?;
        tracing::debug!(
            record_type = %name,
            storage_fields = storage.fields.len(),
            query_fields = fields.len(),
            loop_groups = groups.len(),
            "compiled record schema"
        );

        Ok(Self {
            body: BodyValidator::new(root, options.storage.id_field.clone())?,
            server_query: SimpleQueryValidator::from_fields(
                &fields,
                QueryMode::Server,
                &options.query,
            ),
            client_query: SimpleQueryValidator::from_fields(
                &fields,
                QueryMode::Client,
                &options.query,
            ),
            advanced_query: AdvancedQueryValidator::from_fields(&fields, &options.query),
            name,
            root: root_object,
            storage,
            fields,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn root(&self) -> &Arc<ObjectType> {
        &self.root
    }

    /// Whether the record type declares a top-level field `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.root.field(name).is_some()
    }

    #[must_use]
    pub fn storage(&self) -> &StorageSchema {
        &self.storage
    }

    #[must_use]
    pub fn body(&self) -> &BodyValidator {
        &self.body
    }

    #[must_use]
    pub fn query(&self, mode: QueryMode) -> &SimpleQueryValidator {
        match mode {
            QueryMode::Server => &self.server_query,
            QueryMode::Client => &self.client_query,
        }
    }

    #[must_use]
    pub fn advanced_query(&self) -> &AdvancedQueryValidator {
        &self.advanced_query
    }

    #[must_use]
    pub fn query_fields(&self) -> &[QueryField] {
        &self.fields
    }
}
