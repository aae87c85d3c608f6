use std::sync::Arc;
use std::time::Duration;

use recordkit_cache::{FetchError, TtlCache};
use recordkit_security::{FindFilter, SecurityContext, filter_keys};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RecordAccessConfig;
use crate::domain::error::AccessError;
use crate::domain::operation::Operation;
use crate::domain::ports::{Membership, Role, RoleDirectory};

/// Cached membership and role lookups shared by every role-based model.
///
/// Memberships are served stale-while-revalidate; roles are fetched once
/// per key and then kept until they expire.
pub struct RoleCache {
    directory: Arc<dyn RoleDirectory>,
    memberships: TtlCache<Option<Membership>>,
    roles: TtlCache<Option<Arc<Role>>>,
    membership_sweep: Option<Duration>,
    role_sweep: Option<Duration>,
}

impl RoleCache {
    #[must_use]
    pub fn new(directory: Arc<dyn RoleDirectory>, config: &RecordAccessConfig) -> Self {
        Self {
            directory,
            memberships: TtlCache::new(config.membership_cache.ttl()),
            roles: TtlCache::new(config.role_cache.ttl()),
            membership_sweep: config.membership_cache.sweep_interval(),
            role_sweep: config.role_cache.sweep_interval(),
        }
    }

    /// Membership of `user_id` in the layer instance `layer_id`.
    ///
    /// # Errors
    /// The directory's failure when nothing is cached.
    pub async fn membership(
        &self,
        user_id: &str,
        layer: &str,
        layer_id: &str,
    ) -> Result<Option<Membership>, FetchError> {
        let key = format!("{user_id}-{layer_id}");
        let directory = Arc::clone(&self.directory);
        let (user_id, layer, layer_id) =
            (user_id.to_owned(), layer.to_owned(), layer_id.to_owned());
        self.memberships
            .first_fetch_then_refresh(&key, move || async move {
                directory.find_membership(&user_id, &layer, &layer_id).await
            })
            .await
    }

    /// Role document by id.
    ///
    /// # Errors
    /// The directory's failure for this fetch.
    pub async fn role(&self, role_id: &str) -> Result<Option<Arc<Role>>, FetchError> {
        let directory = Arc::clone(&self.directory);
        let id = role_id.to_owned();
        self.roles
            .first_get_then_fetch(role_id, move || async move {
                Ok(directory.find_role(&id).await?.map(Arc::new))
            })
            .await
    }

    /// Membership entries held, expired ones included until swept.
    #[must_use]
    pub fn cached_memberships(&self) -> usize {
        self.memberships.len()
    }

    /// Start the configured sweepers. Both stop when `cancel` fires.
    #[must_use]
    pub fn spawn_sweepers(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(interval) = self.membership_sweep {
            handles.push(self.memberships.spawn_sweeper(interval, cancel.clone()));
        }
        if let Some(interval) = self.role_sweep {
            handles.push(self.roles.spawn_sweeper(interval, cancel.clone()));
        }
        handles
    }
}

impl std::fmt::Debug for RoleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleCache")
            .field("memberships", &self.memberships)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Grants an operation when the caller's role in one ancestor layer allows it.
#[derive(Debug, Clone)]
pub struct RoleMembership {
    record_type: String,
    layer: String,
    roles: Arc<RoleCache>,
}

impl RoleMembership {
    #[must_use]
    pub fn new(
        record_type: impl Into<String>,
        layer: impl Into<String>,
        roles: Arc<RoleCache>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            layer: layer.into(),
            roles,
        }
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    #[must_use]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    #[must_use]
    pub fn roles(&self) -> &Arc<RoleCache> {
        &self.roles
    }

    /// Fail-closed: every gap in the membership data is a logged denial.
    ///
    /// # Errors
    /// [`AccessError::Store`] when the directory lookup fails.
    pub async fn has_permission(
        &self,
        user: &SecurityContext,
        filter: &FindFilter,
        operation: Operation,
    ) -> Result<bool, AccessError> {
        let layer_key = filter_keys::layer_key(&self.layer);
        let Some(layer_id) = filter.eq_value(&layer_key).and_then(Value::as_str) else {
            tracing::warn!(
                record_type = %self.record_type,
                layer = %self.layer,
                "layer id missing from filter; denying"
            );
            return Ok(false);
        };

        let user_id = user.subject_key();
        let membership = self
            .roles
            .membership(&user_id, &self.layer, layer_id)
            .await
            .map_err(|e| AccessError::Store(e.into()))?;
        let Some(membership) = membership else {
            tracing::warn!(
                record_type = %self.record_type,
                layer = %self.layer,
                layer_id,
                user_id = %user_id,
                "no membership for user in layer; denying"
            );
            return Ok(false);
        };

        let role = self
            .roles
            .role(&membership.role_id)
            .await
            .map_err(|e| AccessError::Store(e.into()))?;
        let Some(role) = role else {
            tracing::warn!(
                record_type = %self.record_type,
                role_id = %membership.role_id,
                "membership references a missing role; denying"
            );
            return Ok(false);
        };

        match role.grant(&self.record_type, operation.action()) {
            Some(granted) => Ok(granted),
            None => {
                tracing::warn!(
                    record_type = %self.record_type,
                    role_id = %membership.role_id,
                    action = operation.action(),
                    "role has no permission entry; denying"
                );
                Ok(false)
            }
        }
    }
}
