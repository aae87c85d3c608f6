//! Record endpoints: filter seeding, validation, authorization, persistence
//! and empty-result disambiguation for one mount.

use std::sync::Arc;

use recordkit_schema::QueryMode;
use recordkit_security::FindFilter;
use serde_json::{Map, Value};

use crate::config::RecordAccessConfig;
use crate::domain::chain::AuthorizationChain;
use crate::domain::error::AccessError;
use crate::domain::models::{EmptyResultPolicy, SecurityModel};
use crate::domain::mount::Mount;
use crate::domain::operation::Operation;
use crate::domain::ports::{Authenticator, Credentials, FindOptions, Record, RecordStore};

/// Collaborators shared by every mount.
pub struct Backend {
    pub store: Arc<dyn RecordStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub config: RecordAccessConfig,
}

/// The single-record (`get_one`, `update_one`, `delete_one`) and
/// multi-record (`list`, `create`) endpoints of one mount.
#[derive(Clone)]
pub struct Endpoints {
    backend: Arc<Backend>,
    mount: Arc<Mount>,
}

impl Endpoints {
    #[must_use]
    pub fn new(backend: Arc<Backend>, mount: Arc<Mount>) -> Self {
        Self { backend, mount }
    }

    #[must_use]
    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    /// # Errors
    /// [`AccessError::NotFound`] for a missing record, [`AccessError::Forbidden`]
    /// when no model grants the read or the record exists but is hidden.
    #[tracing::instrument(
        name = "record.get_one",
        skip_all,
        fields(record_type = %self.mount.record_type(), id = %id)
    )]
    pub async fn get_one(
        &self,
        credentials: &Credentials,
        layer_ids: &[String],
        id: &str,
    ) -> Result<Record, AccessError> {
        let seeded = self.mount.seed_filter(layer_ids, Some(id))?;
        let mut chain = self.chain(credentials);
        let grant = chain
            .evaluate(self.mount.models(), seeded.clone(), Operation::Get, None)
            .await?;

        let found = self
            .backend
            .store
            .find_one(self.mount.record_type(), &grant.filter)
            .await
            .map_err(|e| self.store_error(Operation::Get, e))?;
        match found {
            Some(record) => Ok(record),
            None => Err(self.empty_result(grant.model, Operation::Get, &seeded).await),
        }
    }

    /// Records matching the query inside the mount's layers.
    ///
    /// An empty page is never re-checked for hidden records.
    ///
    /// # Errors
    /// [`AccessError::Validation`] for a bad query, [`AccessError::Forbidden`]
    /// when no model grants the read.
    #[tracing::instrument(
        name = "record.list",
        skip_all,
        fields(record_type = %self.mount.record_type())
    )]
    pub async fn list(
        &self,
        credentials: &Credentials,
        layer_ids: &[String],
        query: &Map<String, Value>,
        mode: QueryMode,
    ) -> Result<Vec<Record>, AccessError> {
        let seeded = self.mount.seed_filter(layer_ids, None)?;
        let parsed = self.mount.schema().query(mode).validate(query)?;
        let mut chain = self.chain(credentials);
        let grant = chain
            .evaluate(self.mount.models(), seeded, Operation::Get, None)
            .await?;

        let mut filter = grant.filter;
        filter.extend(parsed.clauses().cloned());
        let options = FindOptions {
            limit: self.backend.config.page_size(parsed.limit),
            sort: parsed.sort,
            sort_order: parsed.sort_order,
            cursor: parsed.cursor,
        };
        self.backend
            .store
            .find_many(self.mount.record_type(), &filter, &options)
            .await
            .map_err(|e| self.store_error(Operation::Get, e))
    }

    /// Validate `body` with the path's layer ids injected and store it.
    ///
    /// # Errors
    /// [`AccessError::Validation`] for a bad body, [`AccessError::Forbidden`]
    /// when no model grants the create.
    #[tracing::instrument(
        name = "record.create",
        skip_all,
        fields(record_type = %self.mount.record_type())
    )]
    pub async fn create(
        &self,
        credentials: &Credentials,
        layer_ids: &[String],
        body: &Value,
    ) -> Result<Record, AccessError> {
        let seeded = self.mount.seed_filter(layer_ids, None)?;
        let body = self.with_layer_ids(body, layer_ids)?;
        let record = self.mount.schema().body().validate(&body)?;
        let mut chain = self.chain(credentials);
        chain
            .evaluate(self.mount.models(), seeded, Operation::Create, Some(&record))
            .await?;

        let created = self
            .backend
            .store
            .insert(self.mount.record_type(), record)
            .await
            .map_err(|e| self.store_error(Operation::Create, e))?;
        tracing::info!(id = ?created.get(self.mount.id_field()), "record created");
        Ok(created)
    }

    /// Apply the fields present in `body` to one record.
    ///
    /// # Errors
    /// As [`Endpoints::get_one`], plus [`AccessError::Validation`] for a bad body.
    #[tracing::instrument(
        name = "record.update_one",
        skip_all,
        fields(record_type = %self.mount.record_type(), id = %id)
    )]
    pub async fn update_one(
        &self,
        credentials: &Credentials,
        layer_ids: &[String],
        id: &str,
        body: &Value,
    ) -> Result<Record, AccessError> {
        let seeded = self.mount.seed_filter(layer_ids, Some(id))?;
        let body = self.with_layer_ids(body, layer_ids)?;
        let changes = self.mount.schema().body().validate_partial(&body)?;
        let mut chain = self.chain(credentials);
        let grant = chain
            .evaluate(
                self.mount.models(),
                seeded.clone(),
                Operation::Update,
                Some(&changes),
            )
            .await?;

        let updated = self
            .backend
            .store
            .update_one(self.mount.record_type(), &grant.filter, changes)
            .await
            .map_err(|e| self.store_error(Operation::Update, e))?;
        match updated {
            Some(record) => Ok(record),
            None => Err(self.empty_result(grant.model, Operation::Update, &seeded).await),
        }
    }

    /// # Errors
    /// As [`Endpoints::get_one`].
    #[tracing::instrument(
        name = "record.delete_one",
        skip_all,
        fields(record_type = %self.mount.record_type(), id = %id)
    )]
    pub async fn delete_one(
        &self,
        credentials: &Credentials,
        layer_ids: &[String],
        id: &str,
    ) -> Result<Record, AccessError> {
        let seeded = self.mount.seed_filter(layer_ids, Some(id))?;
        let mut chain = self.chain(credentials);
        let grant = chain
            .evaluate(self.mount.models(), seeded.clone(), Operation::Delete, None)
            .await?;

        let deleted = self
            .backend
            .store
            .delete_one(self.mount.record_type(), &grant.filter)
            .await
            .map_err(|e| self.store_error(Operation::Delete, e))?;
        match deleted {
            Some(record) => Ok(record),
            None => Err(self.empty_result(grant.model, Operation::Delete, &seeded).await),
        }
    }

    fn chain<'a>(&'a self, credentials: &'a Credentials) -> AuthorizationChain<'a> {
        AuthorizationChain::new(self.backend.authenticator.as_ref(), credentials)
    }

    /// Path layer ids override whatever the body says.
    fn with_layer_ids(&self, body: &Value, layer_ids: &[String]) -> Result<Value, AccessError> {
        let mut body = body.clone();
        if let Value::Object(fields) = &mut body {
            for (field, id) in self.mount.layer_values(layer_ids)? {
                fields.insert(field, Value::String(id));
            }
        }
        Ok(body)
    }

    /// The error for a store call that matched nothing.
    async fn empty_result(
        &self,
        winner: &SecurityModel,
        operation: Operation,
        seeded: &FindFilter,
    ) -> AccessError {
        match winner.handle_empty_query_results(operation) {
            EmptyResultPolicy::NotFound => AccessError::NotFound,
            EmptyResultPolicy::CheckExistence => {
                match self
                    .backend
                    .store
                    .find_one(self.mount.record_type(), seeded)
                    .await
                {
                    Ok(Some(_)) => {
                        tracing::debug!(model = winner.kind(), "record exists but is not visible");
                        AccessError::Forbidden
                    }
                    Ok(None) => AccessError::NotFound,
                    Err(e) => self.store_error(operation, e),
                }
            }
        }
    }

    fn store_error(&self, operation: Operation, err: anyhow::Error) -> AccessError {
        tracing::error!(
            record_type = %self.mount.record_type(),
            operation = %operation,
            error = ?err,
            "store call failed"
        );
        AccessError::Store(err)
    }
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoints")
            .field("record_type", &self.mount.record_type())
            .field("layers", &self.mount.layers())
            .finish_non_exhaustive()
    }
}
