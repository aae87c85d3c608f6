//! Outbound ports: authentication, persistence and role lookups.

use std::collections::HashMap;

use async_trait::async_trait;
use recordkit_schema::{SortOrder, StorageSchema};
use recordkit_security::{FindFilter, SecurityContext};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::error::AuthnError;

/// A stored record.
pub type Record = Map<String, Value>;

/// Raw credentials presented with one request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    bearer_token: Option<SecretString>,
}

impl Credentials {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bearer(token: impl Into<SecretString>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&SecretString> {
        self.bearer_token.as_ref()
    }
}

/// Resolves the authenticated user of a request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// # Errors
    /// [`AuthnError::Unauthorized`] for missing or unknown credentials.
    async fn authenticate(&self, credentials: &Credentials) -> Result<SecurityContext, AuthnError>;
}

/// Directives for a multi-record read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<String>,
    pub sort_order: SortOrder,
    pub limit: u64,
    /// Id of the last record of the previous page.
    pub cursor: Option<String>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            sort: None,
            sort_order: SortOrder::Ascending,
            limit: 20,
            cursor: None,
        }
    }
}

/// Persistence engine.
///
/// Filters are the AND of their clauses. Implementations assign ids on
/// insert and must never change them on update.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Prepare storage for `record_type`. Called once per registered type.
    async fn ensure_schema(&self, record_type: &str, schema: &StorageSchema) -> anyhow::Result<()>;

    async fn find_one(&self, record_type: &str, filter: &FindFilter)
    -> anyhow::Result<Option<Record>>;

    /// # Errors
    /// Also fails when both `sort` and `cursor` are set.
    async fn find_many(
        &self,
        record_type: &str,
        filter: &FindFilter,
        options: &FindOptions,
    ) -> anyhow::Result<Vec<Record>>;

    /// Store a new record and return it with its assigned id.
    async fn insert(&self, record_type: &str, record: Record) -> anyhow::Result<Record>;

    /// Merge `changes` into the first match and return the updated record.
    async fn update_one(
        &self,
        record_type: &str,
        filter: &FindFilter,
        changes: Record,
    ) -> anyhow::Result<Option<Record>>;

    /// Remove the first match and return it.
    async fn delete_one(&self, record_type: &str, filter: &FindFilter)
    -> anyhow::Result<Option<Record>>;
}

/// A user's membership in one layer instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub role_id: String,
}

/// Permission matrix: record type, then action, then grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub permissions: HashMap<String, HashMap<String, bool>>,
}

impl Role {
    /// The matrix entry for (`record_type`, `action`), if present.
    #[must_use]
    pub fn grant(&self, record_type: &str, action: &str) -> Option<bool> {
        self.permissions.get(record_type)?.get(action).copied()
    }
}

/// Source of memberships and roles for role-based models.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn find_membership(
        &self,
        user_id: &str,
        layer: &str,
        layer_id: &str,
    ) -> anyhow::Result<Option<Membership>>;

    async fn find_role(&self, role_id: &str) -> anyhow::Result<Option<Role>>;
}
