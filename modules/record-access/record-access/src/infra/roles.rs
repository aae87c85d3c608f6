//! Role directory over the record store.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use recordkit_schema::RecordSchema;
use recordkit_security::{FindFilter, filter_keys};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::error::ConfigError;
use crate::domain::ports::{Membership, Record, RecordStore, Role, RoleDirectory};

const PERMISSIONS: &str = "permissions";
const ROLE_ID: &str = "role_id";

/// Reads memberships (`user_id`, `<layer>_id`, `role_id`) and roles
/// (`permissions`) stored as ordinary records.
pub struct StoreRoleDirectory {
    store: Arc<dyn RecordStore>,
    membership_type: String,
    role_type: String,
}

impl StoreRoleDirectory {
    /// # Errors
    /// [`ConfigError::MissingRoleMetadata`] when the membership type lacks
    /// `user_id` or `role_id`, or the role type lacks `permissions`.
    pub fn new(
        store: Arc<dyn RecordStore>,
        memberships: &RecordSchema,
        roles: &RecordSchema,
    ) -> Result<Self, ConfigError> {
        for (schema, field) in [
            (memberships, filter_keys::OWNER_ID),
            (memberships, ROLE_ID),
            (roles, PERMISSIONS),
        ] {
            if !schema.has_field(field) {
                return Err(ConfigError::MissingRoleMetadata {
                    record_type: schema.name().to_owned(),
                    field: field.to_owned(),
                });
            }
        }
        Ok(Self {
            store,
            membership_type: memberships.name().to_owned(),
            role_type: roles.name().to_owned(),
        })
    }
}

#[async_trait]
impl RoleDirectory for StoreRoleDirectory {
    async fn find_membership(
        &self,
        user_id: &str,
        layer: &str,
        layer_id: &str,
    ) -> anyhow::Result<Option<Membership>> {
        let mut filter = FindFilter::new();
        filter.set_eq(filter_keys::OWNER_ID, Value::String(user_id.to_owned()));
        filter.set_eq(filter_keys::layer_key(layer), Value::String(layer_id.to_owned()));
        let found = self.store.find_one(&self.membership_type, &filter).await?;
        found.map(decode).transpose()
    }

    async fn find_role(&self, role_id: &str) -> anyhow::Result<Option<Role>> {
        let mut filter = FindFilter::new();
        filter.set_eq(filter_keys::RECORD_ID, Value::String(role_id.to_owned()));
        let found = self.store.find_one(&self.role_type, &filter).await?;
        found.map(decode).transpose()
    }
}

fn decode<T: DeserializeOwned>(record: Record) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(record)).context("malformed role metadata record")
}

impl std::fmt::Debug for StoreRoleDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRoleDirectory")
            .field("membership_type", &self.membership_type)
            .field("role_type", &self.role_type)
            .finish_non_exhaustive()
    }
}
