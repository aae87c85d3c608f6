use std::sync::Arc;

use parking_lot::Mutex;
use recordkit_schema::{RecordSchema, TypeNode};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RecordAccessConfig;
use crate::domain::error::ConfigError;
use crate::domain::models::{RoleCache, SecurityModel};
use crate::domain::mount::Mount;
use crate::domain::ports::{Authenticator, RecordStore};
use crate::domain::service::{Backend, Endpoints};

/// Registers record types and mounts them under access layer paths.
///
/// Every schema is compiled on registration and every mount is checked when
/// added, so wiring mistakes surface before the first request.
///
/// ```ignore
/// let api = RecordApiBuilder::new(store, authenticator, RecordAccessConfig::default())
///     .register("institution", &institution)?
///     .register("client", &client)?
///     .mount("client", &["institution"], vec![
///         SecurityModel::role_membership("client", "institution", &roles),
///     ])?
///     .build()
///     .await?;
/// ```
pub struct RecordApiBuilder {
    store: Arc<dyn RecordStore>,
    authenticator: Arc<dyn Authenticator>,
    config: RecordAccessConfig,
    schemas: Vec<Arc<RecordSchema>>,
    mounts: Vec<Mount>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RecordApiBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordApiBuilder")
            .field(
                "schemas",
                &self.schemas.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("mounts", &self.mounts.len())
            .finish_non_exhaustive()
    }
}

impl RecordApiBuilder {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        authenticator: Arc<dyn Authenticator>,
        config: RecordAccessConfig,
    ) -> Self {
        Self {
            store,
            authenticator,
            config,
            schemas: Vec::new(),
            mounts: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the cache sweepers when `cancel` fires instead of on
    /// [`RecordApi::shutdown`] only.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Compile and register record type `name`.
    ///
    /// # Errors
    /// [`ConfigError::Schema`] for an invalid tree,
    /// [`ConfigError::DuplicateRecordType`] when `name` is taken.
    pub fn register(mut self, name: &str, root: &TypeNode) -> Result<Self, ConfigError> {
        if self.schema(name).is_some() {
            return Err(ConfigError::DuplicateRecordType(name.to_owned()));
        }
        let schema = RecordSchema::compile(name, root, &self.config.schema_options()).map_err(
            |source| ConfigError::Schema {
                record_type: name.to_owned(),
                source,
            },
        )?;
        self.schemas.push(Arc::new(schema));
        Ok(self)
    }

    /// A registered schema, e.g. to back a role directory.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&Arc<RecordSchema>> {
        self.schemas.iter().find(|s| s.name() == name)
    }

    /// Expose `record_type` under `layers`, guarded by `models` in order.
    ///
    /// # Errors
    /// [`ConfigError::UnknownRecordType`], [`ConfigError::DuplicateMount`]
    /// or any check of [`Mount::new`].
    pub fn mount(
        mut self,
        record_type: &str,
        layers: &[&str],
        models: Vec<SecurityModel>,
    ) -> Result<Self, ConfigError> {
        let schema = self
            .schema(record_type)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownRecordType(record_type.to_owned()))?;
        let layers: Vec<String> = layers.iter().map(|l| (*l).to_owned()).collect();
        let mount = Mount::new(schema, layers, models, self.config.id_field.clone())?;
        if self
            .mounts
            .iter()
            .any(|m| m.collection_path() == mount.collection_path())
        {
            return Err(ConfigError::DuplicateMount {
                record_type: record_type.to_owned(),
                path: mount.collection_path(),
            });
        }
        self.mounts.push(mount);
        Ok(self)
    }

    /// Prepare storage for every registered type and start the sweepers of
    /// every role cache used by a mount.
    ///
    /// # Errors
    /// [`ConfigError::Store`] when the store rejects a schema.
    pub async fn build(self) -> Result<RecordApi, ConfigError> {
        for schema in &self.schemas {
            self.store
                .ensure_schema(schema.name(), schema.storage())
                .await
                .map_err(|e| ConfigError::Store {
                    record_type: schema.name().to_owned(),
                    message: format!("{e:#}"),
                })?;
        }
        let sweepers: Vec<JoinHandle<()>> = role_caches(&self.mounts)
            .iter()
            .flat_map(|cache| cache.spawn_sweepers(&self.cancel))
            .collect();
        tracing::info!(
            record_types = self.schemas.len(),
            mounts = self.mounts.len(),
            sweepers = sweepers.len(),
            "record api ready"
        );

        let backend = Arc::new(Backend {
            store: self.store,
            authenticator: self.authenticator,
            config: self.config,
        });
        let endpoints = self
            .mounts
            .into_iter()
            .map(|mount| Endpoints::new(Arc::clone(&backend), Arc::new(mount)))
            .collect();
        Ok(RecordApi {
            schemas: self.schemas,
            endpoints,
            cancel: self.cancel,
            sweepers: Arc::new(Mutex::new(sweepers)),
        })
    }
}

/// Distinct role caches across all mounts.
fn role_caches(mounts: &[Mount]) -> Vec<Arc<RoleCache>> {
    let mut caches: Vec<Arc<RoleCache>> = Vec::new();
    for model in mounts.iter().flat_map(Mount::models) {
        if let SecurityModel::RoleMembership(m) = model
            && !caches.iter().any(|c| Arc::ptr_eq(c, m.roles()))
        {
            caches.push(Arc::clone(m.roles()));
        }
    }
    caches
}

/// Compiled record types and their mounted endpoints.
#[derive(Debug, Clone)]
pub struct RecordApi {
    schemas: Vec<Arc<RecordSchema>>,
    endpoints: Vec<Endpoints>,
    cancel: CancellationToken,
    sweepers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RecordApi {
    /// Stop the cache sweepers and wait for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.sweepers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "cache sweeper task failed");
            }
        }
    }

    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&Arc<RecordSchema>> {
        self.schemas.iter().find(|s| s.name() == name)
    }

    /// Endpoints of `record_type` mounted exactly at `layers`.
    #[must_use]
    pub fn endpoints(&self, record_type: &str, layers: &[&str]) -> Option<&Endpoints> {
        self.endpoints.iter().find(|e| {
            let mount = e.mount();
            mount.record_type() == record_type
                && mount.layers().len() == layers.len()
                && mount.layers().iter().zip(layers).all(|(a, b)| a == b)
        })
    }

    /// Every mount, in the order they were added.
    #[must_use]
    pub fn all_endpoints(&self) -> &[Endpoints] {
        &self.endpoints
    }
}
